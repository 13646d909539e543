//! Public facade: an explicitly constructed context object owning the
//! worker, its command queue, and the send-cycle timer.

use crate::backend::client::BackendClient;
use crate::outbox::event::EventDraft;
use crate::provider::PushTokenProvider;
use crate::registration::engine::RegistrationInfo;
use crate::registration::params::{DeviceInfo, RegistrationParams};
use crate::scheduler::CycleTimer;
use crate::store::DeviceStore;
use crate::worker::{Command, Worker};
use crate::{PushError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default pause between scheduled send cycles (before jitter).
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(600);

/// Construction-time configuration for [`PushService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub device: DeviceInfo,
    /// Sender ids handed to the token provider on registration.
    pub sender_ids: Vec<String>,
    /// Base interval for the recurring send cycle.
    pub send_interval: Duration,
}

impl ServiceConfig {
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            device,
            sender_ids: Vec::new(),
            send_interval: DEFAULT_SEND_INTERVAL,
        }
    }
}

/// Point-in-time summary of the local registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub registered: bool,
    pub backend_device_id: Option<String>,
    pub has_push_token: bool,
    pub pending_events: u64,
}

/// The SDK entry point. Calls are enqueued onto a single background
/// worker and complete in submission order; results come back as values,
/// never via callback threading.
pub struct PushService {
    commands: mpsc::UnboundedSender<Command>,
    timer: Arc<CycleTimer>,
    worker: JoinHandle<()>,
}

impl PushService {
    /// Spawn the worker over the given collaborators.
    pub fn new(
        store: Box<dyn DeviceStore>,
        client: Box<dyn BackendClient>,
        provider: Box<dyn PushTokenProvider>,
        config: ServiceConfig,
    ) -> Self {
        let (commands, queue) = mpsc::unbounded_channel();
        let timer = Arc::new(CycleTimer::new(commands.downgrade()));

        let worker = Worker {
            store,
            client,
            provider,
            device: config.device,
            sender_ids: config.sender_ids,
            timer: Arc::clone(&timer),
            send_interval: config.send_interval,
        }
        .spawn(queue);

        Self {
            commands,
            timer,
            worker,
        }
    }

    /// Reconcile the device registration with `params`.
    ///
    /// Validation failures are reported synchronously, before the command
    /// is enqueued and before any I/O.
    pub async fn register(&self, params: RegistrationParams) -> Result<RegistrationInfo> {
        params.validate()?;
        self.request(|reply| Command::Register { params, reply })
            .await
    }

    /// Tear down the device registration.
    pub async fn unregister(&self) -> Result<()> {
        self.request(|reply| Command::Unregister { reply }).await
    }

    /// Queue an analytics event for delivery.
    ///
    /// Returns `Ok(None)` without touching the store when analytics are
    /// disabled; this is a documented no-op, not an error.
    pub async fn log_event(
        &self,
        event_type: impl Into<String>,
        payload: Option<BTreeMap<String, String>>,
    ) -> Result<Option<i64>> {
        let draft = EventDraft::now(event_type, payload);
        self.request(|reply| Command::SaveEvent { draft, reply })
            .await
    }

    /// Request one send cycle ahead of schedule. Cycle failures are
    /// internal bookkeeping and are not reported here.
    pub fn request_send_cycle(&self) -> Result<()> {
        self.commands
            .send(Command::RunSendCycle)
            .map_err(|_| PushError::Interrupted)
    }

    /// Snapshot the registration status as the worker sees it.
    pub async fn status(&self) -> Result<RegistrationStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Whether the recurring send cycle is currently armed.
    pub fn is_send_cycle_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Drain queued commands, stop the timer, and wait for the worker to
    /// exit.
    pub async fn shutdown(self) {
        self.timer.disarm();
        drop(self.commands);
        let _ = self.worker.await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| PushError::Interrupted)?;
        response.await.unwrap_or(Err(PushError::Interrupted))
    }
}
