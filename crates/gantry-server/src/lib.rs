//! Watch loop, live reload and development server for gantry.
//!
//! The watch loop rebuilds individual tasks as their sources change and
//! tells connected browsers to reload over a WebSocket.

pub mod livereload;
pub mod server;
pub mod watch;
pub mod watcher;

pub use livereload::{LiveReloadHub, LiveReloadServer, ReloadMessage};
pub use server::{DevServer, DevServerConfig, ServerError, ServerHandle};
pub use watch::{Dispatch, Dispatcher, WatchHandle, WatchLoop, WatchSubscription};
pub use watcher::{FileWatcher, WatchEvent};
