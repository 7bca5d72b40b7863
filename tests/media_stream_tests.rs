//! Media stream socket tests over a real WebSocket connection. These cover
//! the paths that need no agent platform: frame tolerance, stream format
//! rejection and hangup handling.

use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use voicedesk::{ServerConfig, routes, state::AppState};

fn create_test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0, // Let the OS assign a port
        public_host: "voice.example.com".to_string(),
        elevenlabs_api_key: "test-xi-key".to_string(),
        elevenlabs_agent_id: "agent_test".to_string(),
        elevenlabs_api_base: "https://api.elevenlabs.io".to_string(),
        elevenlabs_webhook_secret: "test-webhook-secret".to_string(),
        intercom_access_token: "test-token".to_string(),
        intercom_base_url: "https://api.intercom.io".to_string(),
        intercom_admin_id: "100".to_string(),
        intercom_assignee_id: "200".to_string(),
        session_end_timeout: Duration::from_secs(1),
        webhook_reject_status: StatusCode::UNAUTHORIZED,
        close_despite_assignment_failure: true,
    }
}

/// Start the app on an ephemeral port and return the media stream URL.
async fn spawn_app() -> String {
    let app_state = AppState::new(create_test_config()).unwrap();
    let app = routes::create_router().with_state(app_state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://127.0.0.1:{}/media-stream", addr.port())
}

/// Wait for the server to close the connection, bounded.
async fn expect_close<S>(read: &mut S)
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return,
                _ => continue,
            }
        }
    });
    deadline.await.expect("server did not close the connection");
}

#[tokio::test]
async fn stop_frame_closes_the_call() {
    let url = spawn_app().await;
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(
            json!({"event": "connected", "protocol": "Call", "version": "1.0.0"})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    write
        .send(Message::Text(
            json!({"event": "stop", "streamSid": "MZ1", "stop": {"callSid": "CA1"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    expect_close(&mut read).await;
}

#[tokio::test]
async fn malformed_frames_are_tolerated() {
    let url = spawn_app().await;
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();

    // Garbage must not kill the connection.
    write
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    write
        .send(Message::Text(json!({"unrelated": true}).to_string().into()))
        .await
        .unwrap();

    // The connection is still alive and processes a stop normally.
    write
        .send(Message::Text(
            json!({"event": "stop", "streamSid": "MZ1", "stop": {"callSid": "CA1"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    expect_close(&mut read).await;
}

#[tokio::test]
async fn unsupported_stream_format_is_rejected() {
    let url = spawn_app().await;
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(
            json!({
                "event": "start",
                "start": {
                    "streamSid": "MZ1",
                    "callSid": "CA1",
                    "mediaFormat": {
                        "encoding": "audio/l16",
                        "sampleRate": 16000,
                        "channels": 1
                    }
                }
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

    expect_close(&mut read).await;
}

#[tokio::test]
async fn media_before_start_is_dropped() {
    let url = spawn_app().await;
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();

    // Audio ahead of any start frame has no session to go to; the bridge
    // drops it and keeps the connection open.
    write
        .send(Message::Text(
            json!({
                "event": "media",
                "streamSid": "MZ1",
                "media": {"payload": "fn9+fg==", "track": "inbound"}
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

    write
        .send(Message::Text(
            json!({"event": "stop", "streamSid": "MZ1", "stop": {"callSid": "CA1"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    expect_close(&mut read).await;
}
