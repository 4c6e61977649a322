//! Static file serving for the build output.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

use gantry_build::PathConfig;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub output_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// External server binary; the built-in server is used when unset
    pub command: Option<PathBuf>,

    /// Live reload client URL added to HTML pages by the built-in server
    pub livereload_script: Option<String>,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public"),
            port: 4000,
            host: "127.0.0.1".to_string(),
            open: false,
            command: None,
            livereload_script: None,
        }
    }
}

impl DevServerConfig {
    /// Server settings taken from the project configuration.
    pub fn from_paths(config: &PathConfig) -> Self {
        Self {
            output_dir: config.output_dir(),
            port: config.server.port,
            host: config.server.host.clone(),
            open: false,
            command: config.server.command.as_ref().map(|c| config.resolve(c)),
            livereload_script: Some(format!(
                "http://{}:{}/livereload.js",
                config.server.host, config.server.livereload_port
            )),
        }
    }
}

/// Errors that can occur with the servers and the watch loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Failed to start {0}: {1}")]
    SpawnError(String, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Task error: {0}")]
    TaskError(String),
}

/// A running server. Owned by whoever started it; nothing stops it
/// implicitly except process exit or [`ServerHandle::shutdown`].
#[derive(Debug)]
pub enum ServerHandle {
    /// In-process axum server
    Embedded {
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },

    /// Spawned server process with its output forwarder
    Process { child: Child, forward: JoinHandle<()> },
}

impl ServerHandle {
    /// Bound address of an embedded server.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ServerHandle::Embedded { addr, .. } => Some(*addr),
            ServerHandle::Process { .. } => None,
        }
    }

    /// Stop the server and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        match self {
            ServerHandle::Embedded { shutdown, task, .. } => {
                let _ = shutdown.send(());
                task.await.map_err(|e| ServerError::TaskError(e.to_string()))
            }
            ServerHandle::Process { mut child, forward } => {
                child
                    .kill()
                    .await
                    .map_err(|e| ServerError::TaskError(e.to_string()))?;
                forward
                    .await
                    .map_err(|e| ServerError::TaskError(e.to_string()))
            }
        }
    }
}

pub(crate) fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", host, port)))
}

pub(crate) async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::BindError(addr, e.to_string()))
}

/// Serve `app` on `listener` until the handle is shut down.
pub(crate) fn serve(listener: TcpListener, app: Router) -> ServerHandle {
    let addr = listener
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)));
    let (shutdown, rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;

        if let Err(e) = result {
            tracing::error!("Server on {} stopped: {}", addr, e);
        }
    });

    ServerHandle::Embedded {
        addr,
        shutdown,
        task,
    }
}

/// Development server for the build output.
pub struct DevServer {
    config: DevServerConfig,
}

impl DevServer {
    pub fn new(config: DevServerConfig) -> Self {
        Self { config }
    }

    /// Start serving and return a handle that owns the server.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let handle = match &self.config.command {
            Some(command) => self.spawn_process(command)?,
            None => self.serve_embedded().await?,
        };

        if self.config.open {
            let url = format!("http://{}:{}", self.config.host, self.config.port);
            let _ = open::that(&url);
        }

        Ok(handle)
    }

    async fn serve_embedded(&self) -> Result<ServerHandle, ServerError> {
        let addr = parse_addr(&self.config.host, self.config.port)?;
        let listener = bind(addr).await?;

        let mut app = Router::new().fallback_service(ServeDir::new(&self.config.output_dir));
        if let Some(src) = &self.config.livereload_script {
            let tag: Arc<str> = Arc::from(format!(r#"<script src="{}"></script>"#, src));
            app = app.layer(middleware::map_response_with_state(tag, add_reload_script));
        }
        let handle = serve(listener, app);

        if let Some(local) = handle.local_addr() {
            tracing::info!(
                "Serving {} at http://{}",
                self.config.output_dir.display(),
                local
            );
        }

        Ok(handle)
    }

    /// Spawn `<command> <output_dir> -p<port>` and forward its output.
    fn spawn_process(&self, command: &Path) -> Result<ServerHandle, ServerError> {
        let mut child = Command::new(command)
            .arg(&self.config.output_dir)
            .arg(format!("-p{}", self.config.port))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServerError::SpawnError(command.display().to_string(), e.to_string()))?;

        tracing::info!(
            "Started {} for {} on port {}",
            command.display(),
            self.config.output_dir.display(),
            self.config.port
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let forward = tokio::spawn(async move {
            let out = stdout.map(|s| tokio::spawn(forward_lines(s)));
            let err = stderr.map(|s| tokio::spawn(forward_lines(s)));
            for task in out.into_iter().chain(err) {
                let _ = task.await;
            }
        });

        Ok(ServerHandle::Process { child, forward })
    }
}

/// Add the live reload script tag to successful HTML responses.
async fn add_reload_script(State(tag): State<Arc<str>>, response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to read page body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let page = insert_before_body_end(&String::from_utf8_lossy(&bytes), &tag);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(page))
}

/// Insert `tag` before the last `</body>`, or append it when there is none.
fn insert_before_body_end(html: &str, tag: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{}{}", html, tag),
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn default_port_is_4000() {
        assert_eq!(DevServerConfig::default().port, 4000);
    }

    #[test]
    fn takes_settings_from_paths() {
        let mut paths = PathConfig::with_root("/site");
        paths.server.command = Some(PathBuf::from("node_modules/.bin/http-server"));

        let config = DevServerConfig::from_paths(&paths);

        assert_eq!(config.output_dir, PathBuf::from("/site/public"));
        assert_eq!(
            config.command,
            Some(PathBuf::from("/site/node_modules/.bin/http-server"))
        );
    }

    #[tokio::test]
    async fn serves_output_directory() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "<body>Hello</body>").unwrap();

        let handle = DevServer::new(DevServerConfig {
            output_dir: temp.path().to_path_buf(),
            port: 0,
            ..Default::default()
        })
        .start()
        .await
        .unwrap();

        let addr = handle.local_addr().unwrap();
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("<body>Hello</body>"));

        handle.shutdown().await.unwrap();
    }

    #[test]
    fn script_goes_before_closing_body() {
        let tag = r#"<script src="/livereload.js"></script>"#;

        assert_eq!(
            insert_before_body_end("<BODY>Hi</BODY>", tag),
            r#"<BODY>Hi<script src="/livereload.js"></script></BODY>"#
        );
        assert_eq!(
            insert_before_body_end("<p>fragment</p>", tag),
            r#"<p>fragment</p><script src="/livereload.js"></script>"#
        );
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn pages_load_the_reload_script() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "<body>Hello</body>").unwrap();
        fs::write(temp.path().join("site.css"), "body{color:red}").unwrap();

        let paths = PathConfig::with_root(temp.path());
        let config = DevServerConfig {
            output_dir: temp.path().to_path_buf(),
            port: 0,
            ..DevServerConfig::from_paths(&paths)
        };
        let handle = DevServer::new(config).start().await.unwrap();
        let addr = handle.local_addr().unwrap();

        let page = get(addr, "/index.html").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains(
            r#"<body>Hello<script src="http://127.0.0.1:35729/livereload.js"></script></body>"#
        ));

        let css = get(addr, "/site.css").await;
        assert!(css.ends_with("body{color:red}"));
        assert!(!css.contains("livereload"));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn missing_server_binary_fails_to_spawn() {
        let result = DevServer::new(DevServerConfig {
            command: Some(PathBuf::from("/nonexistent/http-server")),
            ..Default::default()
        })
        .start()
        .await;

        assert!(matches!(result, Err(ServerError::SpawnError(_, _))));
    }
}
