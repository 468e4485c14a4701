//! Browser native messaging host
//!
//! Serves the browser extension over stdin/stdout and tells it when the
//! desktop app rewrites the shared sync document.

pub mod config;
pub mod protocol;
pub mod runtime;
pub mod service;

pub use config::HostConfig;
pub use protocol::{InboundMessage, OutboundMessage, Push, Request, Resolution, SyncStatus};
pub use runtime::run;
pub use service::NativeHost;
