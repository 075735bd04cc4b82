//! The IPC surface: i3-ipc framing over a UNIX socket, JSON payloads.

pub mod client;
pub mod protocol;
pub mod reply;
pub mod server;
