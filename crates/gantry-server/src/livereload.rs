//! WebSocket-based live reload.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use gantry_build::{BuildError, BuildEvents, FileFailure, TaskKind, TaskReport};

use crate::server::{bind, serve, ServerError, ServerHandle};

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload {
        /// Task that produced new output
        task: String,
    },

    /// A build step failed
    BuildError {
        task: String,
        /// Offending source file, if the failure was per-file
        file: Option<String>,
        message: String,
    },

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct LiveReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl LiveReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LiveReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildEvents for LiveReloadHub {
    fn file_failed(&self, task: TaskKind, failure: &FileFailure) {
        self.send(ReloadMessage::BuildError {
            task: task.to_string(),
            file: Some(failure.source.display().to_string()),
            message: failure.message.clone(),
        });
    }

    fn task_finished(&self, report: &TaskReport) {
        if report.task.signals_reload() && !report.outputs.is_empty() {
            self.send(ReloadMessage::Reload {
                task: report.task.to_string(),
            });
        }
    }

    fn task_failed(&self, task: TaskKind, error: &BuildError) {
        self.send(ReloadMessage::BuildError {
            task: task.to_string(),
            file: None,
            message: error.to_string(),
        });
    }
}

struct ReloadState {
    hub: LiveReloadHub,
    script: String,
}

/// Serves `/livereload` (websocket) and `/livereload.js` (client script).
pub struct LiveReloadServer {
    hub: LiveReloadHub,
    addr: SocketAddr,
}

impl LiveReloadServer {
    pub fn new(hub: LiveReloadHub, addr: SocketAddr) -> Self {
        Self { hub, addr }
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let listener = bind(self.addr).await?;
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(self.addr, e.to_string()))?;

        let state = Arc::new(ReloadState {
            hub: self.hub,
            script: client_script(&format!("ws://{}/livereload", local)),
        });

        let app = Router::new()
            .route("/livereload", get(ws_handler))
            .route("/livereload.js", get(script_handler))
            .with_state(state);

        tracing::info!("Live reload listening on ws://{}/livereload", local);

        Ok(serve(listener, app))
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ReloadState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Forward hub messages to one browser until it disconnects.
async fn handle_ws(mut socket: WebSocket, state: Arc<ReloadState>) {
    let mut rx = state.hub.subscribe();

    if send_json(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Live reload client lagged by {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn script_handler(State(state): State<Arc<ReloadState>>) -> impl IntoResponse {
    (
        [("content-type", "application/javascript")],
        state.script.clone(),
    )
}

/// Generate the browser-side live reload script.
pub fn client_script(ws_url: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const ws = new WebSocket('{}');
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;

  ws.onopen = function() {{
    console.log('[livereload] Connected');
    reconnectAttempts = 0;
  }};

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        console.log('[livereload] ' + msg.task + ' rebuilt');
        location.reload();
        break;

      case 'build_error':
        console.error('[livereload] ' + msg.task + ' failed' +
          (msg.file ? ' in ' + msg.file : '') + ': ' + msg.message);
        break;

      case 'connected':
        console.log('[livereload] Server acknowledged connection');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[livereload] Disconnected');
    if (reconnectAttempts < maxReconnectAttempts) {{
      reconnectAttempts++;
      setTimeout(function() {{
        location.reload();
      }}, 1000 * reconnectAttempts);
    }}
  }};
}})();
"#,
        ws_url
    )
}
