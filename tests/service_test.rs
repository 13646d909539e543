//! End-to-end tests of the [`PushService`] facade with scripted
//! collaborators: registration reconciliation, the durable outbox, the
//! analytics gate, and send-cycle timer coupling.

use async_trait::async_trait;
use pushkit::outbox::event::types;
use pushkit::{
    BackendClient, DeviceInfo, DeviceStore, EventsRequest, PushError, PushService,
    PushTokenProvider, RegistrationParams, RegistrationState, Result, ServiceConfig, SqliteStore,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared script and call log, kept outside the service so tests can
/// inspect and reconfigure it after construction.
#[derive(Default)]
struct Script {
    obtain_calls: AtomicUsize,
    release_calls: AtomicUsize,
    register_calls: AtomicUsize,
    update_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    fail_register: AtomicBool,
    fail_send: AtomicBool,
    batches: Mutex<Vec<EventsRequest>>,
}

struct ScriptedBackend(Arc<Script>);

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn register_device(
        &self,
        _params: &RegistrationParams,
        _device: &DeviceInfo,
        _token: &str,
    ) -> Result<String> {
        self.0.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_register.load(Ordering::SeqCst) {
            return Err(PushError::Network("timeout".to_string()));
        }
        Ok("dev-1".to_string())
    }

    async fn update_device(
        &self,
        _device_id: &str,
        _params: &RegistrationParams,
        _device: &DeviceInfo,
        _token: &str,
    ) -> Result<()> {
        self.0.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unregister_device(
        &self,
        _device_id: &str,
        _params: &RegistrationParams,
    ) -> Result<()> {
        self.0.unregister_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_events(
        &self,
        _params: &RegistrationParams,
        request: &EventsRequest,
    ) -> Result<()> {
        self.0.batches.lock().unwrap().push(request.clone());
        if self.0.fail_send.load(Ordering::SeqCst) {
            return Err(PushError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}

struct ScriptedProvider(Arc<Script>);

#[async_trait]
impl PushTokenProvider for ScriptedProvider {
    async fn obtain_token(&self, _sender_ids: &[String]) -> Result<String> {
        let n = self.0.obtain_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("tok-{n}"))
    }

    async fn release_token(&self) -> Result<()> {
        self.0.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn device() -> DeviceInfo {
    DeviceInfo {
        device_model: "pixel-8".to_string(),
        os: "android".to_string(),
        os_version: "14".to_string(),
        app_version: 7,
    }
}

fn params() -> RegistrationParams {
    RegistrationParams::new("uuid-1", "secret-1", "https://push.example.com")
}

fn service() -> (PushService, Arc<Script>) {
    service_over(SqliteStore::in_memory().unwrap())
}

fn service_over(store: SqliteStore) -> (PushService, Arc<Script>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let script = Arc::new(Script::default());
    let service = PushService::new(
        Box::new(store),
        Box::new(ScriptedBackend(Arc::clone(&script))),
        Box::new(ScriptedProvider(Arc::clone(&script))),
        ServiceConfig::new(device()),
    );
    (service, script)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_runs_on_a_multi_thread_runtime() {
    let (service, script) = service();

    service.register(params()).await.unwrap();
    service
        .log_event(types::NOTIFICATION_RECEIVED, None)
        .await
        .unwrap();
    service.request_send_cycle().unwrap();

    assert_eq!(service.status().await.unwrap().pending_events, 0);
    assert_eq!(script.register_calls.load(Ordering::SeqCst), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn registration_round_trip_reports_status() {
    let (service, _script) = service();

    let info = service.register(params()).await.unwrap();
    assert_eq!(info.backend_device_id, "dev-1");
    assert_eq!(info.push_token, "tok-0");

    let status = service.status().await.unwrap();
    assert!(status.registered);
    assert_eq!(status.backend_device_id.as_deref(), Some("dev-1"));
    assert!(status.has_push_token);
    assert_eq!(status.pending_events, 0);

    service.shutdown().await;
}

#[tokio::test]
async fn repeated_registration_skips_network() {
    let (service, script) = service();

    service.register(params()).await.unwrap();
    let info = service.register(params()).await.unwrap();

    assert_eq!(info.backend_device_id, "dev-1");
    assert_eq!(script.obtain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.update_calls.load(Ordering::SeqCst), 0);

    service.shutdown().await;
}

#[tokio::test]
async fn changed_params_update_in_place() {
    let (service, script) = service();
    service.register(params()).await.unwrap();

    let mut changed = params();
    changed.device_alias = Some("kitchen-tablet".to_string());
    service.register(changed).await.unwrap();

    assert_eq!(script.obtain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.update_calls.load(Ordering::SeqCst), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn backend_failure_retry_reuses_cached_token() {
    let (service, script) = service();
    script.fail_register.store(true, Ordering::SeqCst);

    let err = service.register(params()).await.unwrap_err();
    assert!(matches!(err, PushError::Network(_)));
    assert!(!service.is_send_cycle_armed());

    script.fail_register.store(false, Ordering::SeqCst);
    let info = service.register(params()).await.unwrap();

    // The token from the failed attempt is reused; only the backend call
    // is repeated.
    assert_eq!(info.push_token, "tok-0");
    assert_eq!(script.obtain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.register_calls.load(Ordering::SeqCst), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn manual_send_cycle_drains_queued_events() {
    let (service, script) = service();
    service.register(params()).await.unwrap();

    for _ in 0..3 {
        let id = service
            .log_event(types::NOTIFICATION_RECEIVED, None)
            .await
            .unwrap();
        assert!(id.is_some());
    }
    assert_eq!(service.status().await.unwrap().pending_events, 3);

    service.request_send_cycle().unwrap();

    let status = service.status().await.unwrap();
    assert_eq!(status.pending_events, 0);
    let batches = script.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].events.len(), 3);
    assert_eq!(batches[0].device_id, "dev-1");
    drop(batches);

    service.shutdown().await;
}

#[tokio::test]
async fn failed_cycle_keeps_events_and_retries_in_full() {
    let (service, script) = service();
    service.register(params()).await.unwrap();

    for _ in 0..3 {
        service
            .log_event(types::NOTIFICATION_OPENED, None)
            .await
            .unwrap();
    }

    script.fail_send.store(true, Ordering::SeqCst);
    service.request_send_cycle().unwrap();
    assert_eq!(service.status().await.unwrap().pending_events, 3);

    script.fail_send.store(false, Ordering::SeqCst);
    service.request_send_cycle().unwrap();
    assert_eq!(service.status().await.unwrap().pending_events, 0);

    let batches = script.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    // The retry resends the failed rows as one batch.
    assert_eq!(batches[1].events.len(), 3);
    drop(batches);

    service.shutdown().await;
}

#[tokio::test]
async fn analytics_disabled_makes_log_event_a_no_op() {
    let (service, _script) = service();
    let mut params = params();
    params.analytics_enabled = false;
    service.register(params).await.unwrap();

    let mut payload = BTreeMap::new();
    payload.insert("campaign".to_string(), "summer".to_string());
    let id = service
        .log_event(types::NOTIFICATION_RECEIVED, Some(payload))
        .await
        .unwrap();

    assert!(id.is_none());
    assert_eq!(service.status().await.unwrap().pending_events, 0);

    service.shutdown().await;
}

#[tokio::test]
async fn registration_arms_the_send_cycle_timer() {
    let (service, _script) = service();
    assert!(!service.is_send_cycle_armed());

    service.register(params()).await.unwrap();
    assert!(service.is_send_cycle_armed());

    service.shutdown().await;
}

#[tokio::test]
async fn first_event_into_empty_store_arms_the_timer() {
    // A previous run registered this device; the new service starts with
    // the timer disarmed until an event arrives.
    let store = SqliteStore::in_memory().unwrap();
    let state = RegistrationState {
        params: params(),
        push_token: Some("tok-0".to_string()),
        backend_device_id: Some("dev-1".to_string()),
        registered_app_version: Some(7),
    };
    store.save_registration_state(&state).unwrap();

    let (service, _script) = service_over(store);
    assert!(!service.is_send_cycle_armed());

    service
        .log_event(types::NOTIFICATION_RECEIVED, None)
        .await
        .unwrap();
    assert!(service.is_send_cycle_armed());

    service.shutdown().await;
}

#[tokio::test]
async fn unregister_queues_receipt_and_disarms_timer() {
    let (service, script) = service();
    service.register(params()).await.unwrap();
    assert!(service.is_send_cycle_armed());

    service.unregister().await.unwrap();

    assert!(!service.is_send_cycle_armed());
    assert_eq!(script.unregister_calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.release_calls.load(Ordering::SeqCst), 1);

    let status = service.status().await.unwrap();
    assert!(!status.registered);
    assert!(!status.has_push_token);
    // The unregistration receipt waits for a later send cycle.
    assert_eq!(status.pending_events, 1);

    service.shutdown().await;
}
