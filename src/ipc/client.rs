//! Client side of the IPC socket, used by `trellis-cli` and by the main
//! binary when it forwards a command to a running instance.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt};

use super::protocol::{self, HEADER_LEN};

/// Find the running instance's socket: `I3SOCK` wins, else the property
/// the manager leaves on the root window.
pub fn discover_socket() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("I3SOCK") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    socket_from_root_property().context("no I3SOCK and no socket path on the root window")
}

fn socket_from_root_property() -> anyhow::Result<PathBuf> {
    let (conn, screen_num) = x11rb::connect(None).context("connecting to X")?;
    let root = conn.setup().roots[screen_num].root;
    let atom = conn
        .intern_atom(true, b"I3_SOCKET_PATH")?
        .reply()
        .context("interning I3_SOCKET_PATH")?
        .atom;
    if atom == x11rb::NONE {
        bail!("I3_SOCKET_PATH is not set; is the window manager running?");
    }
    let reply = conn
        .get_property(false, root, atom, AtomEnum::ANY, 0, 4096)?
        .reply()
        .context("reading I3_SOCKET_PATH")?;
    if reply.value.is_empty() {
        bail!("I3_SOCKET_PATH is empty; is the window manager running?");
    }
    Ok(PathBuf::from(String::from_utf8_lossy(&reply.value).into_owned()))
}

/// One blocking request/reply exchange.
pub fn send(path: &Path, message_type: u32, payload: &[u8]) -> anyhow::Result<(u32, Vec<u8>)> {
    let mut stream = UnixStream::connect(path)
        .with_context(|| format!("connecting to {}", path.display()))?;
    stream.write_all(&protocol::encode(message_type, payload)).context("sending request")?;

    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).context("reading reply header")?;
    if &header[..6] != protocol::MAGIC {
        bail!("reply carries bad magic bytes");
    }
    let length = u32::from_le_bytes(header[6..10].try_into().unwrap());
    let reply_type = u32::from_le_bytes(header[10..14].try_into().unwrap());
    let mut body = vec![0u8; length as usize];
    stream.read_exact(&mut body).context("reading reply body")?;
    Ok((reply_type, body))
}
