//! Transport tests against in-process WebSocket servers.
//!
//! Each test binds a real TCP listener on a loopback port and drives the
//! transport actor through connect / traffic / close scenarios.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    WebSocketStream,
};

use parley_core::buffering::AudioFrame;
use parley_core::protocol::{pcm_to_bytes, Phase, ServerEvent};
use parley_core::{SessionTransport, TransportConfig, TransportEvent};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn next_event(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
) -> TransportEvent {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport event channel closed unexpectedly")
}

async fn bind_server() -> (TcpListener, TransportConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = TransportConfig {
        server_url: format!("ws://{addr}"),
        max_reconnect_attempts: 3,
        reconnect_base_delay: Duration::from_millis(30),
    };
    (listener, config)
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

#[tokio::test]
async fn demultiplexes_traffic_and_closes_gracefully() {
    let (listener, config) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;

        // Mixed inbound traffic for the client to demux.
        ws.send(Message::Text(
            r#"{"type":"phase","phase":"greeting"}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Binary(pcm_to_bytes(&[100, -100, 0])))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"type":"server_load","cpu":0.93}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text("{malformed".into())).await.unwrap();

        // Expect one audio frame, one control message, then a normal close.
        let mut saw_audio = false;
        let mut saw_control = false;
        let mut close_code = None;
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Binary(bytes)) => {
                    assert_eq!(bytes.len(), 4096 * 2);
                    saw_audio = true;
                }
                Ok(Message::Text(text)) => {
                    assert_eq!(text, r#"{"type":"end_of_turn"}"#);
                    saw_control = true;
                }
                Ok(Message::Close(frame)) => {
                    close_code = frame.map(|f| f.code);
                    break;
                }
                _ => {}
            }
        }
        (saw_audio, saw_control, close_code)
    });

    let (transport, mut events) = SessionTransport::connect(config, "demo");

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Event(ServerEvent::Phase {
            phase: Phase::Greeting
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Audio(vec![100, -100, 0])
    );
    // Unknown tag still parses; malformed JSON is dropped without an event
    // and without the connection going down.
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Event(ServerEvent::Unknown)
    );

    let handle = transport.handle();
    handle.send_audio(AudioFrame::new(vec![42; 4096], 16_000));
    handle.send_control(parley_core::ClientCommand::EndOfTurn);

    // Give the sends time to flush before closing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    transport.disconnect();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected {
            reconnecting: false
        }
    );

    let (saw_audio, saw_control, close_code) = server.await.unwrap();
    assert!(saw_audio, "server never received the audio frame");
    assert!(saw_control, "server never received end_of_turn");
    assert_eq!(close_code, Some(CloseCode::Normal));
}

#[tokio::test]
async fn server_normal_close_does_not_trigger_reconnect() {
    let (listener, config) = bind_server().await;

    tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "interview over".into(),
        })))
        .await
        .unwrap();
        // Drain until the close handshake completes.
        while ws.next().await.is_some() {}
    });

    let (_transport, mut events) = SessionTransport::connect(config, "demo");

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected {
            reconnecting: false
        }
    );
    // Terminal: the actor exits instead of scheduling a retry.
    assert!(timeout(RECV_TIMEOUT, events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn abnormal_drop_retries_three_times_then_exhausts() {
    let (listener, config) = bind_server().await;

    tokio::spawn(async move {
        // Accept once, then kill the connection without a close frame and
        // stop listening so every retry is refused.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);
        drop(listener);
    });

    let (_transport, mut events) = SessionTransport::connect(config, "demo");

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    for _ in 0..3 {
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Disconnected { reconnecting: true }
        );
    }
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected {
            reconnecting: false
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ReconnectsExhausted
    );
    assert!(timeout(RECV_TIMEOUT, events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn disconnect_during_backoff_halts_pending_attempts() {
    let (listener, mut config) = bind_server().await;
    // Long enough that the deliberate disconnect always lands mid-backoff.
    config.reconnect_base_delay = Duration::from_secs(30);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);
        drop(listener);
    });

    let (transport, mut events) = SessionTransport::connect(config, "demo");

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected { reconnecting: true }
    );

    transport.disconnect();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected {
            reconnecting: false
        }
    );
    // No exhaustion event: the retry was abandoned, not spent.
    assert!(timeout(RECV_TIMEOUT, events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn sends_while_disconnected_are_dropped_silently() {
    let config = TransportConfig {
        // Nothing listens here; every attempt fails.
        server_url: "ws://127.0.0.1:9".into(),
        max_reconnect_attempts: 0,
        reconnect_base_delay: Duration::from_millis(10),
    };

    let (transport, mut events) = SessionTransport::connect(config, "demo");
    let handle = transport.handle();

    // Dropped, not queued or panicking.
    handle.send_audio(AudioFrame::new(vec![1; 4096], 16_000));
    handle.send_control(parley_core::ClientCommand::EndOfTurn);
    assert!(!handle.is_connected());

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected {
            reconnecting: false
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ReconnectsExhausted
    );
}
