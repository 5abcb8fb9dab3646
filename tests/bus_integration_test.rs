//! Event bus integration tests: acknowledgments, liveness probes, routing,
//! and the loopback socket transport.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{eventually, free_port, local_bus, MockTransport, SHORT_ACK_TIMEOUT};
use livepreview_lib::bus::{
    AgentLaunched, BuildStarted, BusError, BusRole, Envelope, EventBus, LinkRole, LocalHub,
    SetPreviewPath, SocketTransport,
};
use uuid::Uuid;

fn started(directory: &str) -> BuildStarted {
    BuildStarted {
        directory: directory.to_string(),
        file_name: "A.swift".to_string(),
    }
}

type Outcomes = Arc<Mutex<Vec<Result<(), BusError>>>>;

fn record(outcomes: &Outcomes) -> impl FnOnce(Result<(), BusError>) + Send + 'static {
    let outcomes = outcomes.clone();
    move |result| outcomes.lock().unwrap().push(result)
}

// ====================================================================================
// LIVENESS
// ====================================================================================

#[tokio::test]
async fn agent_answers_liveness_probe() {
    let hub = LocalHub::new();
    let _agent = local_bus(&hub, BusRole::Agent);
    let client = local_bus(&hub, BusRole::Client);

    assert!(client.is_agent_launched().await);
    assert_eq!(client.pending_acks(), 0);
}

#[tokio::test]
async fn clients_never_answer_liveness_probe() {
    let hub = LocalHub::new();
    let _other = local_bus(&hub, BusRole::Client);
    let client = local_bus(&hub, BusRole::Client);

    assert!(!client.is_agent_launched().await);
    assert_eq!(client.pending_acks(), 0);
}

// ====================================================================================
// ACKNOWLEDGMENTS
// ====================================================================================

#[tokio::test]
async fn acknowledged_publish_resolves_once_and_dispatches() {
    let hub = LocalHub::new();
    let sender = local_bus(&hub, BusRole::Client);
    let receiver = local_bus(&hub, BusRole::Agent);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    receiver.on::<BuildStarted, _>(move |event| sink.lock().unwrap().push(event.directory));

    let outcomes: Outcomes = Arc::default();
    sender.publish_with_ack(&started("/p/Sources/App"), record(&outcomes));

    assert!(eventually(|| outcomes.lock().unwrap().len() == 1).await);
    tokio::time::sleep(SHORT_ACK_TIMEOUT * 2).await;

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0], Ok(()));
    assert_eq!(*seen.lock().unwrap(), vec!["/p/Sources/App".to_string()]);
}

#[tokio::test]
async fn several_receivers_still_resolve_once() {
    let hub = LocalHub::new();
    let sender = local_bus(&hub, BusRole::Client);
    let _a = local_bus(&hub, BusRole::Client);
    let _b = local_bus(&hub, BusRole::Client);
    let _c = local_bus(&hub, BusRole::Agent);

    let outcomes: Outcomes = Arc::default();
    sender.publish_with_ack(&AgentLaunched {}, record(&outcomes));

    assert!(eventually(|| !outcomes.lock().unwrap().is_empty()).await);
    tokio::time::sleep(SHORT_ACK_TIMEOUT * 2).await;
    assert_eq!(*outcomes.lock().unwrap(), vec![Ok(())]);
}

#[tokio::test]
async fn unanswered_publish_times_out_once() {
    let transport = Arc::new(MockTransport::new());
    let bus = EventBus::new(transport.clone(), BusRole::Client)
        .unwrap()
        .with_ack_timeout(Duration::from_millis(50));

    let outcomes: Outcomes = Arc::default();
    let id = bus.publish_with_ack(&AgentLaunched {}, record(&outcomes));
    assert_eq!(bus.pending_acks(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    // A late acknowledgment changes nothing.
    bus.on_receive(&Envelope::acknowledgment(id).encode().unwrap());

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![Err(BusError::AckTimeout(Duration::from_millis(50)))]
    );
    assert_eq!(bus.pending_acks(), 0);
    assert!(transport.sent()[0].wants_ack);
}

#[tokio::test]
async fn failed_send_resolves_once_with_error() {
    let transport = Arc::new(MockTransport::new());
    transport.refuse_sends("link down");
    let bus = EventBus::new(transport, BusRole::Client)
        .unwrap()
        .with_ack_timeout(Duration::from_millis(50));

    let outcomes: Outcomes = Arc::default();
    bus.publish_with_ack(&AgentLaunched {}, record(&outcomes));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![Err(BusError::Transport("link down".into()))]
    );
    assert_eq!(bus.pending_acks(), 0);
}

// ====================================================================================
// ROUTING
// ====================================================================================

#[tokio::test]
async fn malformed_messages_never_reach_handlers() {
    let transport = Arc::new(MockTransport::new());
    let bus = Arc::new(EventBus::new(transport.clone(), BusRole::Agent).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    bus.on::<SetPreviewPath, _>(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    bus.start();

    transport.deliver("not json");
    transport.deliver(r#"{"id":"nope","kind":"setPreviewPath","payload":{}}"#);
    transport.deliver(&format!(
        r#"{{"id":"{}","kind":"somethingElse","payload":{{}}}}"#,
        Uuid::new_v4()
    ));
    transport.deliver(&format!(
        r#"{{"id":"{}","kind":"setPreviewPath","payload":{{"path":42}}}}"#,
        Uuid::new_v4()
    ));
    transport.deliver(&format!(
        r#"{{"id":"{}","kind":"setPreviewPath","payload":{{"path":"/p"}}}}"#,
        Uuid::new_v4()
    ));

    assert!(eventually(|| calls.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sender_does_not_hear_itself() {
    let hub = LocalHub::new();
    let bus = local_bus(&hub, BusRole::Agent);
    let heard = Arc::new(AtomicUsize::new(0));
    let counter = heard.clone();
    bus.on::<AgentLaunched, _>(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(&AgentLaunched {}).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(heard.load(Ordering::SeqCst), 0);
}

// ====================================================================================
// SOCKET TRANSPORT
// ====================================================================================

#[tokio::test]
async fn socket_transport_relays_between_processes() {
    let port = free_port();
    let hub = SocketTransport::connect("livepreview-test", Some(port))
        .await
        .unwrap();
    let spoke_a = SocketTransport::connect("livepreview-test", Some(port))
        .await
        .unwrap();
    let spoke_b = SocketTransport::connect("livepreview-test", Some(port))
        .await
        .unwrap();
    assert_eq!(hub.role(), Some(LinkRole::Hub));
    assert_eq!(spoke_a.role(), Some(LinkRole::Spoke));

    let agent = Arc::new(EventBus::new(Arc::new(spoke_a), BusRole::Agent).unwrap());
    agent.start();
    let client = Arc::new(EventBus::new(Arc::new(spoke_b), BusRole::Client).unwrap());
    client.start();
    let observer = Arc::new(EventBus::new(Arc::new(hub), BusRole::Client).unwrap());
    observer.start();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    observer.on::<BuildStarted, _>(move |event| sink.lock().unwrap().push(event.directory));
    // Give the spokes time to be accepted by the hub.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.is_agent_launched().await);
    agent.publish(&started("/p/Sources/App")).unwrap();

    assert!(eventually(|| seen.lock().unwrap().len() == 1).await);
    assert_eq!(*seen.lock().unwrap(), vec!["/p/Sources/App".to_string()]);
}
