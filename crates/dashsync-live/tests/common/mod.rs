//! Minimal push server for live stream tests.
//!
//! Records received text frames and broadcasts pushed events to every live
//! connection. `drop_connections` closes sockets without a handshake.

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Command {
    Push(String),
    Drop,
}

pub struct PushServer {
    url: String,
    commands: broadcast::Sender<Command>,
    received: Arc<Mutex<Vec<String>>>,
}

impl PushServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (commands, _) = broadcast::channel(64);
        let received = Arc::new(Mutex::new(Vec::new()));

        let commands_clone = commands.clone();
        let received_clone = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut commands = commands_clone.subscribe();
                let received = received_clone.clone();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else {
                        return;
                    };
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    received.lock().await.push(text.to_string());
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            cmd = commands.recv() => match cmd {
                                Ok(Command::Push(text)) => {
                                    let _ = write.send(Message::Text(text)).await;
                                }
                                _ => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            url,
            commands,
            received,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    pub fn push(&self, event: &str, data: serde_json::Value) {
        let text = serde_json::json!({ "event": event, "data": data }).to_string();
        let _ = self.commands.send(Command::Push(text));
    }

    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    pub async fn received_events(&self, event: &str) -> Vec<serde_json::Value> {
        self.received
            .lock()
            .await
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["event"] == event)
            .collect()
    }
}

/// Poll `check` every 10ms until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
