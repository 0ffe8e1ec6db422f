// crates/kernel-server/tests/loopback_session.rs
use std::sync::Arc;
use std::time::Duration;

use kernel_core::{DeploymentDirective, EngineConfig, Header, MessageType, OutboundMessage, Request, SessionRequest};
use kernel_server::types::OutboundRx;
use kernel_server::{Broker, BrokerHandle, BrokerOptions, Connection, ConnectionId, LoopbackLauncher};
use serde_json::json;
use tokio::time::{sleep, timeout};

fn start() -> BrokerHandle {
    let config = EngineConfig {
        imports: vec!["scala.util.Random".to_string(), "scala.collection.mutable".to_string()],
        ..EngineConfig::default()
    };
    let (broker, handle) = Broker::new(
        config,
        Arc::new(LoopbackLauncher),
        std::future::ready(DeploymentDirective::Local),
        BrokerOptions::default(),
    );
    tokio::spawn(broker.run());
    handle
}

fn attach(handle: &BrokerHandle, id: u64) -> OutboundRx {
    let (conn, rx) = Connection::channel(ConnectionId(id));
    handle.register(conn).unwrap();
    rx
}

fn send(handle: &BrokerHandle, request: Request) {
    let header = Header::new(json!({ "msg_id": "m-1", "session": "s" }));
    handle.request(SessionRequest::new(header, "s", request)).unwrap();
}

async fn take(rx: &mut OutboundRx, n: usize) -> Vec<OutboundMessage> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let msg = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("viewer queue closed");
        out.push(msg);
    }
    out
}

fn types(msgs: &[OutboundMessage]) -> Vec<MessageType> {
    msgs.iter().map(|m| m.msg_type).collect()
}

#[tokio::test]
async fn loopback_echoes_lines_and_result() {
    let handle = start();
    let mut viewer = attach(&handle, 1);

    send(&handle, Request::execute(1, "val a = 1\nprintln(a < 2)"));
    let msgs = take(&mut viewer, 7).await;

    assert_eq!(
        types(&msgs),
        vec![
            MessageType::Status,
            MessageType::Pyin,
            MessageType::Stream,
            MessageType::Stream,
            MessageType::ExecuteResult,
            MessageType::Status,
            MessageType::ExecuteReply,
        ]
    );
    assert_eq!(msgs[2].content["text"], "val a = 1\n");
    assert_eq!(msgs[3].content["text"], "println(a < 2)\n");
    assert_eq!(
        msgs[4].content["data"]["text/html"],
        "<pre>val a = 1\nprintln(a &lt; 2)</pre>"
    );
}

#[tokio::test]
async fn loopback_unclosed_bracket_is_incomplete() {
    let handle = start();
    let mut viewer = attach(&handle, 1);

    send(&handle, Request::execute(1, "def f() = {"));
    let msgs = take(&mut viewer, 5).await;

    assert_eq!(msgs[2].msg_type, MessageType::Error);
    assert_eq!(msgs[3].execution_state(), Some("idle"));
    assert_eq!(msgs[4].msg_type, MessageType::ExecuteReply);
}

#[tokio::test]
async fn loopback_completes_imported_names() {
    let handle = start();
    let mut viewer = attach(&handle, 1);

    send(&handle, Request::completion("new Ran", 7));
    let reply = take(&mut viewer, 1).await.remove(0);

    assert_eq!(reply.msg_type, MessageType::CompleteReply);
    assert_eq!(reply.content["matches"], json!(["Random"]));
    assert_eq!(reply.content["matched_text"], "Ran");
    assert_eq!(reply.content["cursor_start"], 4);
    assert_eq!(reply.content["cursor_end"], 7);
}

#[tokio::test]
async fn loopback_object_info_for_imports() {
    let handle = start();
    let mut viewer = attach(&handle, 1);

    send(&handle, Request::object_info("mutable"));
    send(&handle, Request::object_info("Missing"));
    let replies = take(&mut viewer, 2).await;

    assert_eq!(replies[0].content["found"], true);
    assert_eq!(replies[0].content["call_def"], "scala.collection.mutable");
    assert_eq!(replies[1].content["found"], false);
}

#[tokio::test]
async fn loopback_sleep_is_interruptible() {
    let handle = start();
    let mut viewer = attach(&handle, 1);

    send(&handle, Request::execute(1, ":sleep 10000\nnever"));
    take(&mut viewer, 2).await;

    // Give the engine time to enter the sleep before interrupting.
    sleep(Duration::from_millis(50)).await;
    handle.interrupt().unwrap();

    let msgs = take(&mut viewer, 3).await;
    assert_eq!(msgs[0].content, json!({ "text": "Interrupted\n", "name": "stderr" }));
    assert_eq!(msgs[1].execution_state(), Some("idle"));
    assert_eq!(msgs[2].msg_type, MessageType::ExecuteReply);
}

#[tokio::test]
async fn loopback_interrupt_reaches_a_queued_execution() {
    let handle = start();
    let mut viewer = attach(&handle, 1);

    send(&handle, Request::execute(1, ":sleep 300"));
    send(&handle, Request::execute(2, ":sleep 5000\nnever"));
    take(&mut viewer, 4).await;

    // The second execution is queued behind the first; it is the one
    // tracked for interrupt.
    sleep(Duration::from_millis(50)).await;
    handle.interrupt().unwrap();

    // Each message must arrive well before the queued sleep would end.
    let msgs = take(&mut viewer, 6).await;
    let results = msgs.iter().filter(|m| m.msg_type == MessageType::ExecuteResult).count();
    let replies = msgs.iter().filter(|m| m.msg_type == MessageType::ExecuteReply).count();
    let interrupted: Vec<_> = msgs
        .iter()
        .filter(|m| m.msg_type == MessageType::Stream)
        .map(|m| m.content.clone())
        .collect();

    assert_eq!(results, 1, "only the first execution completes");
    assert_eq!(replies, 2);
    assert_eq!(interrupted, vec![json!({ "text": "Interrupted\n", "name": "stderr" })]);
    assert!(!msgs.iter().any(|m| m.content["text"] == "never\n"));
}
