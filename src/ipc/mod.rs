//! IPC module for daemon-UI communication

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Request, Response};
pub use server::{RequestContext, Server};
