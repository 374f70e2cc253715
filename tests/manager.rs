mod common;

use std::sync::{Arc, Mutex};

use common::{MockBackend, Probe, config, full};
use embassy_time::Duration;
use mqtt_switchboard::backend::BackendRegistry;
use mqtt_switchboard::{
    BackendError, BackendType, Capabilities, ClientManager, ConnectionEvent, ErrorKind, LastWill,
    Message, QoS,
};

const TICK: Duration = Duration::from_millis(10);

fn single(name: &str, capabilities: Capabilities) -> (ClientManager<4>, Probe) {
    let mut registry = BackendRegistry::<4>::new();
    let (backend, probe) = MockBackend::new(capabilities);
    registry.register(name, backend).unwrap();
    (ClientManager::new(registry), probe)
}

fn connected() -> (ClientManager<4>, Probe) {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::Custom("mock-a")).unwrap();
    manager.configure(&config()).unwrap();
    manager.connect().unwrap();
    (manager, probe)
}

#[test]
fn init_is_idempotent() {
    let (mut manager, _probe) = single("mock-a", full());

    manager.init(BackendType::PubSub).unwrap();
    let first = manager.get_backend().map(|d| d.name().to_owned());
    manager.init(BackendType::Custom("other")).unwrap();

    assert!(manager.is_initialized());
    assert_eq!(manager.get_backend().map(|d| d.name().to_owned()), first);
    assert_eq!(manager.get_last_error(), "Already initialized");
}

#[test]
fn init_prefers_the_hinted_backend() {
    let mut registry = BackendRegistry::<4>::new();
    registry.register("mock-a", MockBackend::new(full()).0).unwrap();
    registry.register("pubsub", MockBackend::new(full()).0).unwrap();
    let mut manager = ClientManager::new(registry);

    manager.init(BackendType::PubSub).unwrap();

    assert_eq!(manager.get_backend().map(|d| d.name()), Some("pubsub"));
}

#[test]
fn init_without_backends_fails() {
    let mut manager = ClientManager::new(BackendRegistry::<4>::new());

    assert_eq!(manager.init(BackendType::PubSub), Err(ErrorKind::BackendNotFound));
    assert!(!manager.is_initialized());
    assert_eq!(manager.get_last_error(), "No backend available");
}

#[test]
fn duplicate_registration_keeps_the_original() {
    let mut registry = BackendRegistry::<4>::new();
    let (original, _) = MockBackend::versioned(full(), "1.0");
    registry.register("mock-a", original).unwrap();
    let mut manager = ClientManager::new(registry);
    manager.init(BackendType::PubSub).unwrap();

    let (duplicate, _) = MockBackend::versioned(full(), "2.0");
    assert_eq!(
        manager.register_backend("mock-a", duplicate),
        Err(ErrorKind::AlreadyRegistered)
    );
    assert_eq!(manager.get_last_error(), "Backend already registered");
    assert_eq!(manager.find_backend("mock-a").map(|d| d.version()), Some("1.0"));
    assert_eq!(manager.list_backends(8).len(), 1);
}

#[test]
fn registry_capacity_is_enforced() {
    let mut registry = BackendRegistry::<2>::new();
    registry.register("a", MockBackend::new(full()).0).unwrap();
    let mut manager = ClientManager::new(registry);
    manager.init(BackendType::PubSub).unwrap();

    manager.register_backend("b", MockBackend::new(full()).0).unwrap();
    assert_eq!(
        manager.register_backend("c", MockBackend::new(full()).0),
        Err(ErrorKind::CapacityExceeded)
    );
    assert_eq!(manager.get_last_error(), "Too many backends registered");
    assert!(manager.find_backend("a").is_some());
    assert!(manager.find_backend("b").is_some());
    assert!(manager.find_backend("c").is_none());
}

#[test]
fn registration_requires_init() {
    let (mut manager, _probe) = single("mock-a", full());
    assert_eq!(
        manager.register_backend("mock-b", MockBackend::new(full()).0),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(manager.get_last_error(), "Manager not initialized");
}

#[test]
fn connect_requires_configuration() {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();

    assert_eq!(manager.connect(), Err(ErrorKind::NotConnected));
    assert_eq!(manager.get_last_error(), "Client not configured");
    assert!(!probe.called("connect"));
}

#[test]
fn requests_without_connection_never_reach_the_backend() {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();
    manager.configure(&config()).unwrap();

    assert_eq!(
        manager.publish("t/1", b"x", QoS::AtMostOnce, false),
        Err(ErrorKind::NotConnected)
    );
    assert_eq!(manager.get_last_error(), "Not connected to broker");
    assert_eq!(
        manager.subscribe("t/#", QoS::AtLeastOnce),
        Err(ErrorKind::NotConnected)
    );
    assert_eq!(manager.unsubscribe("t/#"), Err(ErrorKind::NotConnected));

    assert!(!probe.called("publish"));
    assert!(!probe.called("subscribe"));
    assert!(!probe.called("unsubscribe"));
}

#[test]
fn bad_topics_are_invalid() {
    let (mut manager, probe) = connected();

    assert_eq!(
        manager.publish("", b"x", QoS::AtMostOnce, false),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(manager.get_last_error(), "Topic is empty");

    let long = "t".repeat(300);
    assert_eq!(
        manager.subscribe(&long, QoS::AtMostOnce),
        Err(ErrorKind::InvalidParam)
    );
    assert!(!probe.called("publish"));
    assert!(!probe.called("subscribe"));
}

#[test]
fn invalid_config_is_rejected_before_the_backend() {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();

    let mut broken = config();
    broken.host.clear();
    assert_eq!(manager.configure(&broken), Err(ErrorKind::InvalidParam));
    assert_eq!(manager.get_last_error(), "Broker host is empty");

    let mut broken = config();
    broken.port = 70_000;
    assert_eq!(manager.configure(&broken), Err(ErrorKind::InvalidParam));
    assert_eq!(manager.get_last_error(), "Invalid broker port");

    assert!(!probe.called("init"));
    assert!(!manager.is_configured());
}

#[test]
fn configure_without_backend_fails() {
    let mut manager = ClientManager::new(BackendRegistry::<4>::new());
    assert_eq!(manager.configure(&config()), Err(ErrorKind::BackendNotFound));
}

#[test]
fn failed_backend_init_leaves_client_unconfigured() {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();
    manager.configure(&config()).unwrap();

    {
        let mut state = probe.state();
        state.fail_init = Some(BackendError::Memory);
        state.error_text = "no room for session";
    }
    assert_eq!(manager.configure(&config()), Err(ErrorKind::MemoryError));
    assert_eq!(manager.get_last_error(), "no room for session");
    assert!(!manager.is_configured());
    assert!(manager.config().is_none());
}

#[test]
fn incomplete_backend_is_rejected_and_current_kept() {
    let (mut manager, _probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();

    let partial = full().without(Capabilities::UNSUBSCRIBE);
    assert_eq!(
        manager.register_backend("partial", MockBackend::new(partial).0),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(manager.get_last_error(), "Incomplete backend operations");
    assert_eq!(manager.set_backend("partial"), Err(ErrorKind::BackendNotFound));
    assert_eq!(manager.get_backend().map(|d| d.name()), Some("mock-a"));
}

#[test]
fn disconnect_is_idempotent() {
    let (mut manager, probe) = connected();

    manager.disconnect().unwrap();
    assert_eq!(manager.get_last_error(), "Disconnected successfully");
    manager.disconnect().unwrap();
    assert_eq!(manager.get_last_error(), "Already disconnected");

    assert_eq!(probe.count("disconnect"), 1);
    assert!(!manager.is_connected());
}

#[test]
fn disconnect_is_best_effort() {
    let (mut manager, probe) = connected();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager
        .set_connection_callback(move |event| sink.lock().unwrap().push(event))
        .unwrap();
    {
        let mut state = probe.state();
        state.fail_disconnect = Some(BackendError::Native(-42));
        state.error_text = "socket reset";
    }

    assert_eq!(manager.disconnect(), Ok(()));
    assert_eq!(manager.get_last_error(), "socket reset");
    assert!(!manager.is_connected());
    assert_eq!(*events.lock().unwrap(), [ConnectionEvent::Disconnected]);
}

#[test]
fn publish_then_disconnect() {
    let (mut manager, probe) = connected();
    assert_eq!(manager.get_connection_status_string(), "Connected");

    manager
        .publish("sensors/7/temp", b"21.5", QoS::AtLeastOnce, true)
        .unwrap();
    manager
        .publish_message(&Message::new("sensors/7/hum", b"40", QoS::AtMostOnce, false))
        .unwrap();
    manager.disconnect().unwrap();

    let state = probe.state();
    assert_eq!(
        state.published,
        [
            ("sensors/7/temp".to_owned(), b"21.5".to_vec(), QoS::AtLeastOnce, true),
            ("sensors/7/hum".to_owned(), b"40".to_vec(), QoS::AtMostOnce, false),
        ]
    );
    drop(state);
    assert!(!manager.is_connected());
    assert_eq!(manager.get_connection_status_string(), "Disconnected");
}

#[test]
fn switching_backends_tears_down_the_old_one() {
    let mut registry = BackendRegistry::<4>::new();
    let (a, probe_a) = MockBackend::new(full());
    let (b, probe_b) = MockBackend::new(full());
    registry.register("mock-a", a).unwrap();
    registry.register("mock-b", b).unwrap();
    let mut manager = ClientManager::new(registry);

    manager.init(BackendType::Custom("mock-a")).unwrap();
    manager.configure(&config()).unwrap();
    manager.connect().unwrap();

    manager.set_backend("mock-b").unwrap();
    assert_eq!(manager.get_last_error(), "Backend switched successfully");
    assert_eq!(manager.get_backend().map(|d| d.name()), Some("mock-b"));
    assert!(probe_a.called("disconnect"));
    assert!(probe_a.called("cleanup"));
    assert!(!manager.is_configured());
    assert_eq!(manager.connect(), Err(ErrorKind::NotConnected));

    manager.configure(&config()).unwrap();
    manager.connect().unwrap();
    manager.publish("t", b"via b", QoS::AtMostOnce, false).unwrap();

    assert_eq!(probe_b.state().published.len(), 1);
    assert!(probe_a.state().published.is_empty());
}

#[test]
fn switching_to_unknown_backend_keeps_current() {
    let (mut manager, probe) = connected();
    assert_eq!(manager.set_backend("ghost"), Err(ErrorKind::BackendNotFound));
    assert!(manager.is_connected());
    assert!(!probe.called("cleanup"));
}

#[test]
fn reselecting_the_active_backend_resets_it() {
    let (mut manager, probe) = connected();

    manager.set_backend("mock-a").unwrap();

    assert_eq!(manager.get_last_error(), "Backend switched successfully");
    assert_eq!(manager.get_backend().map(|d| d.name()), Some("mock-a"));
    assert!(!manager.is_connected());
    assert!(!manager.is_configured());
    assert!(manager.config().is_none());
    assert!(probe.called("disconnect"));
    assert!(probe.called("cleanup"));
    assert_eq!(manager.connect(), Err(ErrorKind::NotConnected));
}

#[test]
fn refused_callback_setup_does_not_undo_activation() {
    let (mut manager, probe) = single("mock-a", full());
    probe.state().fail_callback = Some(BackendError::Protocol);

    assert_eq!(manager.init(BackendType::Custom("mock-a")), Ok(()));
    assert!(manager.is_initialized());
    assert_eq!(manager.get_backend().map(|d| d.name()), Some("mock-a"));
    assert!(probe.called("set_callback"));

    assert_eq!(manager.set_backend("mock-a"), Ok(()));
    assert_eq!(manager.get_backend().map(|d| d.name()), Some("mock-a"));
    assert_eq!(probe.count("set_callback"), 2);
}

#[test]
fn callback_receives_messages_from_the_loop() {
    let (mut manager, probe) = connected();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager
        .set_message_callback(move |topic, payload| {
            sink.lock().unwrap().push((topic.to_owned(), payload.to_vec()));
        })
        .unwrap();
    assert_eq!(probe.state().callback_installed, Some(true));

    probe
        .state()
        .inbound
        .push_back(("cmd/led".to_owned(), b"on".to_vec()));
    manager.run_loop(TICK).unwrap();

    probe
        .state()
        .inbound
        .push_back(("cmd/led".to_owned(), b"off".to_vec()));
    manager.yield_now(TICK).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        [
            ("cmd/led".to_owned(), b"on".to_vec()),
            ("cmd/led".to_owned(), b"off".to_vec()),
        ]
    );
    assert!(!probe.called("yield"));

    manager.clear_message_callback().unwrap();
    assert_eq!(probe.state().callback_installed, Some(false));
}

#[test]
fn yield_uses_native_hook_when_declared() {
    let (mut manager, probe) = single("mock-a", full() | Capabilities::YIELD);
    manager.init(BackendType::PubSub).unwrap();

    manager.yield_now(TICK).unwrap();

    assert!(probe.called("yield"));
    assert!(!probe.called("loop"));
}

#[test]
fn loop_is_skipped_for_backends_without_it() {
    let (mut manager, probe) = single("mock-a", Capabilities::REQUIRED);
    manager.init(BackendType::PubSub).unwrap();

    assert_eq!(manager.run_loop(TICK), Ok(()));
    assert_eq!(manager.yield_now(TICK), Ok(()));
    assert!(!probe.called("loop"));
}

#[test]
fn backend_failures_are_translated() {
    let (mut manager, probe) = connected();
    {
        let mut state = probe.state();
        state.fail_publish = Some(BackendError::Refused);
        state.error_text = "quota exceeded";
    }
    assert_eq!(
        manager.publish("t", b"x", QoS::AtMostOnce, false),
        Err(ErrorKind::PublishFailed)
    );
    assert_eq!(manager.get_last_error(), "quota exceeded");

    probe.state().fail_publish = Some(BackendError::Native(-777));
    probe.state().error_text = "";
    assert_eq!(
        manager.publish("t", b"x", QoS::AtMostOnce, false),
        Err(ErrorKind::Unknown)
    );
    assert_eq!(manager.get_last_error(), "Publish failed");
}

#[test]
fn connect_failure_reaches_connection_callback() {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();
    manager.configure(&config()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager
        .set_connection_callback(move |event| sink.lock().unwrap().push(event))
        .unwrap();

    probe.state().fail_connect = Some(BackendError::Auth);
    assert_eq!(manager.connect(), Err(ErrorKind::ConnectionFailed));
    assert_eq!(manager.get_last_error(), "Connection failed");

    probe.state().fail_connect = None;
    manager.connect().unwrap();
    assert_eq!(manager.connect(), Err(ErrorKind::AlreadyConnected));

    assert_eq!(
        *events.lock().unwrap(),
        [
            ConnectionEvent::ConnectFailed(ErrorKind::ConnectionFailed),
            ConnectionEvent::Connected,
        ]
    );
}

#[test]
fn reconnect_falls_back_to_disconnect_and_connect() {
    let (mut manager, probe) = connected();

    manager.reconnect().unwrap();

    let calls = probe.calls();
    assert_eq!(&calls[calls.len() - 2..], ["disconnect", "connect"]);
    assert!(!probe.called("reconnect"));
    assert!(manager.is_connected());
}

#[test]
fn reconnect_fallback_reports_both_transitions() {
    let (mut manager, _probe) = connected();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager
        .set_connection_callback(move |event| sink.lock().unwrap().push(event))
        .unwrap();

    manager.reconnect().unwrap();

    assert_eq!(manager.get_last_error(), "Reconnected successfully");
    assert_eq!(
        *events.lock().unwrap(),
        [ConnectionEvent::Disconnected, ConnectionEvent::Connected]
    );
}

#[test]
fn reconnect_fallback_surfaces_connect_failure() {
    let (mut manager, probe) = connected();
    {
        let mut state = probe.state();
        state.fail_connect = Some(BackendError::ConnectionFailed);
        state.error_text = "broker unreachable";
    }

    assert_eq!(manager.reconnect(), Err(ErrorKind::ConnectionFailed));
    assert_eq!(manager.get_last_error(), "broker unreachable");
    assert!(!manager.is_connected());
}

#[test]
fn reconnect_uses_native_hook_when_declared() {
    let (mut manager, probe) = single("mock-a", full() | Capabilities::RECONNECT);
    manager.init(BackendType::PubSub).unwrap();
    manager.configure(&config()).unwrap();

    manager.reconnect().unwrap();

    assert!(probe.called("reconnect"));
    assert!(!probe.called("connect"));
}

#[test]
fn will_is_forwarded_to_the_backend() {
    let (mut manager, probe) = single("mock-a", full());
    manager.init(BackendType::PubSub).unwrap();

    let will = LastWill::new("dev/status", b"offline", QoS::AtLeastOnce, true);
    manager.set_will(&will).unwrap();
    assert_eq!(probe.state().will.as_ref(), Some(&will));

    manager.clear_will().unwrap();
    assert!(probe.state().will.is_none());

    let empty = LastWill::new("", b"", QoS::AtMostOnce, false);
    assert_eq!(manager.set_will(&empty), Err(ErrorKind::InvalidParam));
}

#[test]
fn cleanup_disconnects_and_keeps_the_registry() {
    let (mut manager, probe) = connected();

    manager.cleanup();

    assert!(probe.called("disconnect"));
    assert!(probe.called("cleanup"));
    assert!(!manager.is_initialized());
    assert!(manager.get_backend().is_none());
    assert_eq!(manager.get_connection_status_string(), "Not initialized");
    assert!(manager.find_backend("mock-a").is_some());

    manager.init(BackendType::PubSub).unwrap();
    assert_eq!(manager.connect(), Err(ErrorKind::NotConnected));
}

#[test]
fn dropping_the_manager_cleans_up() {
    let (manager, probe) = connected();
    drop(manager);
    assert!(probe.called("cleanup"));
    assert!(!probe.state().connected);
}
