//! The single background worker.
//!
//! Every mutation of registration state and every outbox send cycle runs
//! here, in submission order, which is the crate's whole concurrency
//! story: no locks, at most one in-flight attempt, and a `save_event`
//! followed by a cycle always observes the saved row.

use crate::backend::client::BackendClient;
use crate::outbox;
use crate::outbox::event::EventDraft;
use crate::provider::PushTokenProvider;
use crate::registration::engine::{self, RegistrationInfo};
use crate::registration::params::{DeviceInfo, RegistrationParams};
use crate::scheduler::CycleTimer;
use crate::service::RegistrationStatus;
use crate::store::DeviceStore;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// The closed set of operations the worker executes.
pub(crate) enum Command {
    Register {
        params: RegistrationParams,
        reply: oneshot::Sender<Result<RegistrationInfo>>,
    },
    Unregister {
        reply: oneshot::Sender<Result<()>>,
    },
    SaveEvent {
        draft: EventDraft,
        reply: oneshot::Sender<Result<Option<i64>>>,
    },
    RunSendCycle,
    Status {
        reply: oneshot::Sender<Result<RegistrationStatus>>,
    },
}

pub(crate) struct Worker {
    pub(crate) store: Box<dyn DeviceStore>,
    pub(crate) client: Box<dyn BackendClient>,
    pub(crate) provider: Box<dyn PushTokenProvider>,
    pub(crate) device: DeviceInfo,
    pub(crate) sender_ids: Vec<String>,
    pub(crate) timer: Arc<CycleTimer>,
    pub(crate) send_interval: Duration,
}

impl Worker {
    pub(crate) fn spawn(self, commands: mpsc::UnboundedReceiver<Command>) -> JoinHandle<()> {
        tokio::spawn(self.run(commands))
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Register { params, reply } => {
                    let result = engine::register(
                        self.store.as_ref(),
                        self.client.as_ref(),
                        self.provider.as_ref(),
                        &self.device,
                        &self.sender_ids,
                        params,
                    )
                    .await;
                    let succeeded = result.is_ok();
                    if succeeded {
                        self.timer.arm_if_disarmed(self.send_interval);
                    }
                    let _ = reply.send(result);

                    if succeeded {
                        // Opportunistic drain now that a device id exists;
                        // failure here is ordinary cycle bookkeeping.
                        let _ =
                            outbox::run_send_cycle(self.store.as_ref(), self.client.as_ref())
                                .await;
                    }
                }
                Command::Unregister { reply } => {
                    // Stop scheduled sends before touching remote state;
                    // this is the only place the timer is disarmed.
                    self.timer.disarm();
                    let result = engine::unregister(
                        self.store.as_ref(),
                        self.client.as_ref(),
                        self.provider.as_ref(),
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Command::SaveEvent { draft, reply } => {
                    let _ = reply.send(self.handle_save_event(draft));
                }
                Command::RunSendCycle => {
                    // Never fatal: a failed batch is reverted and retried
                    // on the next tick.
                    let _ = outbox::run_send_cycle(self.store.as_ref(), self.client.as_ref())
                        .await;
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.status());
                }
            }
        }
        debug!("worker queue closed, shutting down");
    }

    fn handle_save_event(&self, draft: EventDraft) -> Result<Option<i64>> {
        let state = self.store.load_registration_state()?;
        if !state.params.analytics_enabled {
            debug!(event_type = %draft.event_type, "analytics disabled, dropping event");
            return Ok(None);
        }

        let was_empty = self.store.event_count()? == 0;
        let id = outbox::save_event(self.store.as_ref(), &draft)?;
        if was_empty {
            self.timer.arm_if_disarmed(self.send_interval);
        }
        Ok(Some(id))
    }

    fn status(&self) -> Result<RegistrationStatus> {
        let state = self.store.load_registration_state()?;
        Ok(RegistrationStatus {
            registered: state.backend_device_id.is_some(),
            backend_device_id: state.backend_device_id,
            has_push_token: state.push_token.is_some(),
            pending_events: self.store.event_count()?,
        })
    }
}
