use inkpost_application::{PreferencesStore, StoreContext};
use inkpost_core::config::PreferencesConfig;
use inkpost_core::error_info::codes;
use inkpost_core::remote::{Namespace, RemoteStore};
use inkpost_core::session::{IdentityKey, IdentitySource};
use inkpost_core::settings::{ConnectionStatus, Settings, SettingsPatch, SettingsService};
use inkpost_core::signal::{SyncEvent, Topic};
use inkpost_infrastructure::{BroadcastHub, InMemoryRemoteStore, InMemorySettingsService};
use std::sync::Arc;

struct FixedIdentity(&'static str);

impl IdentitySource for FixedIdentity {
    fn identity_key(&self) -> IdentityKey {
        IdentityKey::user(self.0)
    }
}

struct Harness {
    remote: InMemoryRemoteStore,
    hub: BroadcastHub,
    origin: InMemorySettingsService,
    context: StoreContext,
}

fn harness() -> Harness {
    let remote = InMemoryRemoteStore::new();
    let hub = BroadcastHub::new();
    let context = StoreContext::new(Arc::new(remote.clone()), hub.clone());
    Harness {
        remote,
        hub,
        origin: InMemorySettingsService::default(),
        context,
    }
}

fn store_for(h: &Harness, user: &'static str) -> PreferencesStore {
    PreferencesStore::with_identity(
        &h.context,
        &PreferencesConfig::default(),
        Arc::new(h.origin.clone()),
        Arc::new(FixedIdentity(user)),
    )
}

async fn cached_settings(h: &Harness, user: &str) -> Option<Settings> {
    h.remote
        .get(Namespace::Settings, user)
        .await
        .unwrap()
        .map(|value| serde_json::from_value(value).unwrap())
}

#[tokio::test]
async fn test_update_merges_only_patched_fields() {
    let h = harness();
    let store = store_for(&h, "u1");

    let updated = store
        .update_settings(SettingsPatch::new().max_tokens(500))
        .await
        .unwrap();

    assert_eq!(updated.max_tokens, 500);
    assert_eq!(updated.temperature, 0.7);
    assert_eq!(store.settings(), updated);
    assert_eq!(cached_settings(&h, "u1").await.unwrap().max_tokens, 500);
}

#[tokio::test]
async fn test_update_keeps_local_fields_outside_the_patch() {
    let h = harness();
    let store = store_for(&h, "u1");
    store.load_settings().await.unwrap();
    let last_connected = store.settings().last_connected;
    assert!(last_connected.is_some());

    // The origin never stores last_connected; it must survive the merge.
    store
        .update_settings(SettingsPatch::new().temperature(0.2))
        .await
        .unwrap();

    let settings = store.settings();
    assert_eq!(settings.temperature, 0.2);
    assert_eq!(settings.last_connected, last_connected);
}

#[tokio::test]
async fn test_update_rejected_by_origin() {
    let h = harness();
    let mut updates = h.hub.subscribe(&[Topic::Settings]);
    let store = store_for(&h, "u1");

    let err = store
        .update_settings(SettingsPatch::new().temperature(3.5))
        .await
        .unwrap_err();

    assert!(err.is_origin());
    let state = store.snapshot();
    assert!(state.error.unwrap().has_code(codes::ORIGIN_ERROR));
    assert_eq!(state.settings.temperature, 0.7);
    assert!(!state.loading);
    assert!(updates.drain().is_empty());
}

#[tokio::test]
async fn test_initialize_without_cache_loads_from_origin() {
    let h = harness();
    h.origin
        .update_settings(&SettingsPatch::new().api_url("http://models.local:1234"))
        .await
        .unwrap();
    let store = store_for(&h, "u1");

    store.initialize().await;

    let state = store.snapshot();
    assert_eq!(state.settings.api_url, "http://models.local:1234");
    assert!(state.connected);
    assert!(!state.loading);
    assert_eq!(h.origin.get_calls(), 1);
    assert_eq!(
        cached_settings(&h, "u1").await.unwrap().api_url,
        "http://models.local:1234"
    );
}

#[tokio::test]
async fn test_initialize_adopts_cache_and_tests_connection() {
    let h = harness();
    let cached = Settings {
        temperature: 1.1,
        ..Settings::default()
    };
    h.remote
        .set(
            Namespace::Settings,
            "u1",
            serde_json::to_value(&cached).unwrap(),
            60,
        )
        .await
        .unwrap();
    h.origin
        .set_models(vec!["qwen2.5-7b-instruct".to_string()])
        .await;
    let store = store_for(&h, "u1");

    store.initialize().await;

    let state = store.snapshot();
    assert_eq!(state.settings.temperature, 1.1);
    assert_eq!(state.settings.active_models, vec!["qwen2.5-7b-instruct"]);
    assert_eq!(state.connection_status, ConnectionStatus::Connected);
    assert!(state.settings.last_connected.is_some());
    assert_eq!(h.origin.get_calls(), 0);
}

#[tokio::test]
async fn test_initialize_with_backend_down() {
    let h = harness();
    h.remote.set_available(false);
    let store = store_for(&h, "u1");

    store.initialize().await;

    let state = store.snapshot();
    assert!(state.error.unwrap().has_code(codes::INIT_FAILED));
    assert!(store.is_fallback());
    // The origin is still used as a last resort.
    assert_eq!(h.origin.get_calls(), 1);
    assert!(state.connected);
}

#[tokio::test]
async fn test_connection_failure_is_recorded_not_returned() {
    let h = harness();
    let store = store_for(&h, "u1");
    h.origin.set_reachable(false);

    assert!(!store.test_connection().await);

    let state = store.snapshot();
    assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
    assert!(!state.connected);
    assert!(state.error.unwrap().has_code(codes::CONNECTION_FAILED));

    h.origin.set_reachable(true);
    assert!(store.test_connection().await);
    let state = store.snapshot();
    assert_eq!(state.connection_status, ConnectionStatus::Connected);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_load_settings_origin_error() {
    let h = harness();
    let store = store_for(&h, "u1");
    h.origin.set_reachable(false);

    assert!(store.load_settings().await.is_err());
    let state = store.snapshot();
    assert!(state.error.unwrap().has_code(codes::ORIGIN_ERROR));
    assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_sibling_adopts_update_payload() {
    let h = harness();
    let a = store_for(&h, "u1");
    let b = store_for(&h, "u1");
    let other_user = store_for(&h, "u2");
    let mut b_state = b.subscribe_state();

    a.update_settings(SettingsPatch::new().temperature(0.3))
        .await
        .unwrap();

    tokio::time::timeout(
        std::time::Duration::from_secs(1),
        b_state.wait_for(|s| s.settings.temperature == 0.3),
    )
    .await
    .expect("sibling adopted in time")
    .expect("store alive");

    assert_eq!(other_user.settings().temperature, 0.7);
}

#[tokio::test]
async fn test_sibling_adoption_does_not_write_back() {
    let h = harness();
    let a = store_for(&h, "u1");
    let b = store_for(&h, "u1");

    let calls = h.remote.call_count();
    b.handle_signal(&SyncEvent::SettingsUpdated {
        origin: a.instance_id(),
        identity: "u1".to_string(),
        timestamp: chrono::Utc::now(),
        settings: Some(Settings {
            max_tokens: 64,
            ..Settings::default()
        }),
    })
    .await;

    assert_eq!(b.settings().max_tokens, 64);
    assert_eq!(h.remote.call_count(), calls);
}

#[tokio::test]
async fn test_reset_state_restores_defaults_and_announces() {
    let h = harness();
    let mut updates = h.hub.subscribe(&[Topic::Settings]);
    let store = store_for(&h, "u1");
    store
        .update_settings(SettingsPatch::new().max_tokens(128))
        .await
        .unwrap();

    store.reset_state().await;

    assert_eq!(store.settings(), Settings::default());
    assert_eq!(cached_settings(&h, "u1").await.unwrap(), Settings::default());

    let events = updates.drain();
    assert_eq!(events.len(), 2);
    match &events[1] {
        SyncEvent::SettingsUpdated {
            identity, settings, ..
        } => {
            assert_eq!(identity, "u1");
            assert_eq!(settings.as_ref(), Some(&Settings::default()));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_backend_outage_keeps_origin_calls_working() {
    let h = harness();
    let store = store_for(&h, "u1");
    h.remote.set_available(false);

    let updated = store
        .update_settings(SettingsPatch::new().max_tokens(700))
        .await
        .unwrap();
    assert_eq!(updated.max_tokens, 700);
    assert!(store.is_fallback());

    let calls = h.remote.call_count();
    store.load_settings().await.unwrap();
    assert_eq!(h.remote.call_count(), calls);

    h.remote.set_available(true);
    store.handle_signal(&SyncEvent::ConnectivityRestored).await;
    assert_eq!(cached_settings(&h, "u1").await.unwrap().max_tokens, 700);
}
