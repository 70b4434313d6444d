//! End-to-end runs against a scripted in-memory server.

use std::time::Duration;

use futures::StreamExt;
use remote_run_core::{Event, Language, RunRequest, ServerFrame, WireMessage};
use remote_run_session::{
    ClientConfig, RunSpec, Session, SessionFactory, Termination, execute,
    transcript::TIMEOUT_MARKER,
};
use remote_run_transport::{MemoryConnection, MemoryConnector, RemotePeer};
use tokio::time::Instant;

fn factory(host: &str) -> (SessionFactory<MemoryConnector>, RemotePeer) {
    let (connector, peer) = MemoryConnector::pair(Some(host));
    (SessionFactory::new(connector, ClientConfig::default()), peer)
}

async fn expect_handshake(peer: &mut RemotePeer) -> RunRequest {
    assert_eq!(peer.recv().await, Some(WireMessage::text("{}")));
    match peer.recv().await {
        Some(WireMessage::Text(text)) => {
            let payload = text.strip_prefix('7').expect("control discriminator");
            serde_json::from_str(payload).expect("run request payload")
        }
        other => panic!("expected handshake frame, got {other:?}"),
    }
}

fn output(text: &str) -> String {
    ServerFrame::output(text).encode()
}

#[tokio::test]
async fn test_python_run_without_stdin() {
    let (factory, mut peer) = factory("judge-3");

    let server = tokio::spawn(async move {
        let request = expect_handshake(&mut peer).await;
        assert_eq!(request.language, Language::Python);
        assert_eq!(request.code, "print(1)");
        assert_eq!(request.mode, "run");
        assert_eq!(request.original_id, 1);

        peer.send_text(ServerFrame::system("running").encode()).unwrap();
        peer.send_text("3").unwrap();
        peer.send_text(output("1\n")).unwrap();
        peer.close();
        peer
    });

    let report = execute(&factory, &RunSpec::new(Language::Python, "print(1)"))
        .await
        .unwrap();
    let mut peer = server.await.unwrap();

    assert_eq!(report.transcript, "[Host judge-3]\n[System running]\n1\n");
    assert!(!report.timed_out);
    assert!(!report.transcript.contains("[Timeout]"));
    // No input frame was written.
    assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_stdin_echo_is_suppressed() {
    let (factory, mut peer) = factory("judge-3");
    let mut session = factory
        .create(Language::Python, "print(input().upper())", vec![])
        .await
        .unwrap();
    expect_handshake(&mut peer).await;

    session.send("hello").await.unwrap();
    assert_eq!(peer.recv().await, Some(WireMessage::text("1hello")));

    peer.send_text(output("hello")).unwrap();
    peer.send_text(output("HELLO")).unwrap();
    peer.close();

    let events: Vec<Event> = session.events().collect().await;
    assert_eq!(events, vec![Event::Output("HELLO".into())]);
}

#[tokio::test]
async fn test_stdin_run_transcript() {
    let (factory, mut peer) = factory("judge-9");

    let server = tokio::spawn(async move {
        expect_handshake(&mut peer).await;
        assert_eq!(peer.recv().await, Some(WireMessage::text("1hello")));
        peer.send_text(output("hello")).unwrap();
        peer.send_text(output("HELLO")).unwrap();
        peer.close();
    });

    let spec = RunSpec::new(Language::Python, "print(input().upper())").stdin("hello");
    let report = execute(&factory, &spec).await.unwrap();
    server.await.unwrap();

    assert_eq!(report.transcript, "[Host judge-9]\nHELLO");
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out() {
    let (factory, mut peer) = factory("judge-3");

    let started = Instant::now();
    let report = execute(&factory, &RunSpec::new(Language::Cpp, "int main() { for (;;); }"))
        .await
        .unwrap();

    assert!(report.timed_out);
    assert!(report.transcript.ends_with(TIMEOUT_MARKER));
    assert_eq!(report.transcript, "[Host judge-3]\n\n[Timeout]");
    assert_eq!(report.elapsed, Duration::from_secs(10));
    assert_eq!(started.elapsed(), Duration::from_secs(10));

    // The session was closed after the timeout.
    expect_handshake(&mut peer).await;
    while let Some(msg) = peer.recv().await {
        assert_eq!(msg, WireMessage::text("2"));
    }
}

#[tokio::test]
async fn test_unknown_discriminator_surfaces_raw_text() {
    let (factory, mut peer) = factory("judge-3");
    let mut session = factory.create(Language::Python, "", vec![]).await.unwrap();
    expect_handshake(&mut peer).await;

    peer.send_text("9abc").unwrap();
    assert_eq!(
        session.receive(None).await.unwrap(),
        Some(Event::Unknown("9abc".into()))
    );
}

#[tokio::test]
async fn test_iteration_matches_repeated_receive() {
    async fn scripted() -> (Session<MemoryConnection>, RemotePeer) {
        let (factory, mut peer) = factory("judge-3");
        let session = factory.create(Language::Python, "", vec![]).await.unwrap();
        expect_handshake(&mut peer).await;
        let frames = [
            "3".to_string(),
            "2".to_string(),
            output("a"),
            ServerFrame::system("b").encode(),
            "3".to_string(),
            "xyz".to_string(),
        ];
        for frame in frames {
            peer.send_text(frame).unwrap();
        }
        peer.close();
        (session, peer)
    }

    let (mut iterated, _peer_a) = scripted().await;
    let from_stream: Vec<Event> = iterated.events().collect().await;

    let (mut polled, _peer_b) = scripted().await;
    let mut from_receive = Vec::new();
    while let Some(event) = polled.receive(None).await.unwrap() {
        from_receive.push(event);
    }

    assert_eq!(from_stream, from_receive);
    assert_eq!(from_stream.len(), 3);
    assert_eq!(iterated.termination(), Some(&Termination::Closed));
    assert_eq!(polled.termination(), Some(&Termination::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_runs_until_close() {
    let (factory, mut peer) = factory("judge-3");
    let mut session = factory.create(Language::Python, "", vec![]).await.unwrap();
    expect_handshake(&mut peer).await;

    let started = Instant::now();
    assert_eq!(peer.recv().await, Some(WireMessage::text("2")));
    assert_eq!(peer.recv().await, Some(WireMessage::text("2")));
    assert_eq!(started.elapsed(), Duration::from_secs(20));

    session.send("input").await.unwrap();
    assert_eq!(peer.recv().await, Some(WireMessage::text("1input")));

    session.close().await;
    session.close().await;
    assert!(!session.keepalive_active());
    assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_dropping_session_stops_keepalive() {
    let (factory, mut peer) = factory("judge-3");
    let session = factory.create(Language::Python, "", vec![]).await.unwrap();
    expect_handshake(&mut peer).await;

    drop(session);
    assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_hang_up_ends_run_cleanly() {
    let (factory, mut peer) = factory("judge-3");
    let mut session = factory.create(Language::Python, "", vec![]).await.unwrap();
    expect_handshake(&mut peer).await;

    peer.send_text(output("partial")).unwrap();
    peer.hang_up();

    assert_eq!(
        session.receive(None).await.unwrap(),
        Some(Event::Output("partial".into()))
    );
    assert_eq!(session.receive(None).await.unwrap(), None);
    assert_eq!(session.termination(), Some(&Termination::Closed));
    assert!(!session.keepalive_active());
}
