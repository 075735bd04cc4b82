//! The IPC server: a non-blocking UNIX listener polled from the main event
//! loop, one buffered connection per client, plus event fan-out to
//! subscribers.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use super::protocol::{self, EventType, MessageType, EVENT_BIT};
use crate::common::collections::HashSet;
use crate::common::config;

pub struct IncomingRequest {
    pub client: usize,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

struct IpcClient {
    stream: UnixStream,
    buf: Vec<u8>,
    subscriptions: HashSet<String>,
    dead: bool,
}

pub struct IpcServer {
    listener: UnixListener,
    clients: Vec<IpcClient>,
    pub socket_path: PathBuf,
}

impl IpcServer {
    pub fn default_socket_path() -> PathBuf {
        config::runtime_dir().join(format!("ipc-socket.{}", std::process::id()))
    }

    pub fn bind(path: &Path) -> anyhow::Result<IpcServer> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        // a stale socket from a crashed instance would block the bind
        if path.exists() {
            std::fs::remove_file(path).ok();
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("binding IPC socket {}", path.display()))?;
        listener.set_nonblocking(true).context("making IPC socket non-blocking")?;
        debug!(path = %path.display(), "IPC socket bound");
        Ok(IpcServer {
            listener,
            clients: Vec::new(),
            socket_path: path.to_path_buf(),
        })
    }

    pub fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    pub fn client_fds(&self) -> Vec<RawFd> {
        self.clients.iter().map(|c| c.stream.as_raw_fd()).collect()
    }

    pub fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if stream.set_nonblocking(true).is_ok() {
                        self.clients.push(IpcClient {
                            stream,
                            buf: Vec::new(),
                            subscriptions: HashSet::default(),
                            dead: false,
                        });
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "IPC accept failed");
                    break;
                }
            }
        }
    }

    /// Drain readable clients and return every complete request, in
    /// arrival order.
    pub fn read_requests(&mut self) -> Vec<IncomingRequest> {
        let mut requests = Vec::new();
        for index in 0..self.clients.len() {
            let client = &mut self.clients[index];
            let mut chunk = [0u8; 4096];
            loop {
                match client.stream.read(&mut chunk) {
                    Ok(0) => {
                        client.dead = true;
                        break;
                    }
                    Ok(n) => client.buf.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(_) => {
                        client.dead = true;
                        break;
                    }
                }
            }
            loop {
                match protocol::decode(&client.buf) {
                    Ok(Some((message_type, payload, consumed))) => {
                        client.buf.drain(..consumed);
                        match MessageType::from_u32(message_type) {
                            Some(message_type) => requests.push(IncomingRequest {
                                client: index,
                                message_type,
                                payload,
                            }),
                            None => {
                                warn!(message_type, "unknown IPC request type");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "dropping misbehaving IPC client");
                        client.dead = true;
                        break;
                    }
                }
            }
        }
        self.reap();
        requests
    }

    pub fn send_reply(&mut self, client: usize, message_type: MessageType, payload: &[u8]) {
        let Some(client) = self.clients.get_mut(client) else { return };
        let frame = protocol::encode(message_type as u32, payload);
        if client.stream.write_all(&frame).is_err() {
            client.dead = true;
        }
        self.reap();
    }

    /// Record subscriptions from a SUBSCRIBE payload (a JSON array of
    /// event names) and acknowledge.
    pub fn subscribe(&mut self, client: usize, payload: &[u8]) {
        let names: Vec<String> = serde_json::from_slice(payload).unwrap_or_default();
        let success = if let Some(client) = self.clients.get_mut(client) {
            let mut all_known = true;
            for name in names {
                if EventType::from_name(&name).is_some() {
                    client.subscriptions.insert(name);
                } else {
                    all_known = false;
                }
            }
            all_known
        } else {
            false
        };
        let ack = serde_json::json!({ "success": success }).to_string();
        self.send_reply(client, MessageType::Subscribe, ack.as_bytes());
    }

    /// Push an event to every client subscribed to it.
    pub fn broadcast(&mut self, event: EventType, payload: &[u8]) {
        let frame = protocol::encode(EVENT_BIT | event as u32, payload);
        for client in &mut self.clients {
            if !client.subscriptions.contains(event.name()) {
                continue;
            }
            if client.stream.write_all(&frame).is_err() {
                client.dead = true;
            }
        }
        self.reap();
    }

    fn reap(&mut self) {
        self.clients.retain(|c| !c.dead);
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        std::fs::remove_file(&self.socket_path).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn temp_socket(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("trellis-ipc-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn request_reply_round_trip() {
        let path = temp_socket("rr");
        let mut server = IpcServer::bind(&path).unwrap();
        let mut client = UnixStream::connect(&path).unwrap();
        client
            .write_all(&protocol::encode(MessageType::GetVersion as u32, b""))
            .unwrap();

        server.accept_pending();
        let requests = server.read_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message_type, MessageType::GetVersion);

        server.send_reply(requests[0].client, MessageType::GetVersion, b"{}");
        let mut buf = vec![0u8; protocol::HEADER_LEN + 2];
        client.read_exact(&mut buf).unwrap();
        let (message_type, payload, _) = protocol::decode(&buf).unwrap().unwrap();
        assert_eq!(message_type, MessageType::GetVersion as u32);
        assert_eq!(payload, b"{}");
    }

    #[test]
    fn events_reach_only_subscribers() {
        let path = temp_socket("ev");
        let mut server = IpcServer::bind(&path).unwrap();
        let mut subscriber = UnixStream::connect(&path).unwrap();
        let mut bystander = UnixStream::connect(&path).unwrap();
        subscriber
            .write_all(&protocol::encode(
                MessageType::Subscribe as u32,
                br#"["workspace"]"#,
            ))
            .unwrap();

        server.accept_pending();
        for request in server.read_requests() {
            assert_eq!(request.message_type, MessageType::Subscribe);
            server.subscribe(request.client, &request.payload);
        }
        server.broadcast(EventType::Workspace, br#"{"change":"focus"}"#);

        // the subscriber sees the ack and then the event
        let mut header = [0u8; protocol::HEADER_LEN];
        subscriber.read_exact(&mut header).unwrap();
        let ack_len = u32::from_le_bytes(header[6..10].try_into().unwrap()) as usize;
        let mut ack = vec![0u8; ack_len];
        subscriber.read_exact(&mut ack).unwrap();

        subscriber.read_exact(&mut header).unwrap();
        let event_type = u32::from_le_bytes(header[10..14].try_into().unwrap());
        assert_eq!(event_type, EVENT_BIT | EventType::Workspace as u32);

        bystander.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 1];
        assert!(bystander.read(&mut buf).is_err(), "bystander got an event");
    }
}
