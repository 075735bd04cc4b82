//! i3-ipc wire framing: `"i3-ipc"` ‖ u32 length ‖ u32 type ‖ payload,
//! all little-endian. Replies reuse the request type; event pushes set the
//! high bit.

use thiserror::Error;

pub const MAGIC: &[u8; 6] = b"i3-ipc";
pub const HEADER_LEN: usize = MAGIC.len() + 8;
pub const EVENT_BIT: u32 = 1 << 31;

/// Payloads larger than this are considered hostile and the client is
/// disconnected.
pub const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    Command = 0,
    GetWorkspaces = 1,
    Subscribe = 2,
    GetOutputs = 3,
    GetTree = 4,
    GetMarks = 5,
    GetBarConfig = 6,
    GetVersion = 7,
}

impl MessageType {
    pub fn from_u32(value: u32) -> Option<MessageType> {
        match value {
            0 => Some(MessageType::Command),
            1 => Some(MessageType::GetWorkspaces),
            2 => Some(MessageType::Subscribe),
            3 => Some(MessageType::GetOutputs),
            4 => Some(MessageType::GetTree),
            5 => Some(MessageType::GetMarks),
            6 => Some(MessageType::GetBarConfig),
            7 => Some(MessageType::GetVersion),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum EventType {
    Workspace = 0,
    Output = 1,
    Mode = 2,
    Window = 3,
    BarconfigUpdate = 4,
}

impl EventType {
    pub fn name(self) -> &'static str {
        match self {
            EventType::Workspace => "workspace",
            EventType::Output => "output",
            EventType::Mode => "mode",
            EventType::Window => "window",
            EventType::BarconfigUpdate => "barconfig_update",
        }
    }

    pub fn from_name(name: &str) -> Option<EventType> {
        match name {
            "workspace" => Some(EventType::Workspace),
            "output" => Some(EventType::Output),
            "mode" => Some(EventType::Mode),
            "window" => Some(EventType::Window),
            "barconfig_update" => Some(EventType::BarconfigUpdate),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad magic bytes")]
    BadMagic,
    #[error("payload length {0} exceeds the limit")]
    TooLarge(u32),
}

pub fn encode(message_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&message_type.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Try to take one frame off the front of `buf`. Returns the type, the
/// payload and the number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<Option<(u32, Vec<u8>, usize)>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if &buf[..MAGIC.len()] != MAGIC {
        return Err(FrameError::BadMagic);
    }
    let length = u32::from_le_bytes(buf[6..10].try_into().unwrap());
    if length > MAX_PAYLOAD {
        return Err(FrameError::TooLarge(length));
    }
    let message_type = u32::from_le_bytes(buf[10..14].try_into().unwrap());
    let total = HEADER_LEN + length as usize;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((message_type, buf[HEADER_LEN..total].to_vec(), total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let frame = encode(MessageType::Command as u32, b"workspace 2");
        let (message_type, payload, consumed) = decode(&frame).unwrap().unwrap();
        assert_eq!(message_type, 0);
        assert_eq!(payload, b"workspace 2");
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn short_reads_are_incomplete_not_errors() {
        let frame = encode(4, b"{}");
        assert_eq!(decode(&frame[..3]).unwrap(), None);
        assert_eq!(decode(&frame[..HEADER_LEN]).unwrap(), None);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut frame = encode(0, b"");
        frame[0] = b'x';
        assert_eq!(decode(&frame), Err(FrameError::BadMagic));
    }

    #[test]
    fn event_bit_layout() {
        assert_eq!(EVENT_BIT | EventType::Workspace as u32, 0x8000_0000);
        assert_eq!(EVENT_BIT | EventType::Window as u32, 0x8000_0003);
    }

    #[test]
    fn two_frames_in_one_buffer() {
        let mut buf = encode(0, b"nop");
        buf.extend_from_slice(&encode(7, b""));
        let (_, payload, consumed) = decode(&buf).unwrap().unwrap();
        assert_eq!(payload, b"nop");
        let (message_type, _, _) = decode(&buf[consumed..]).unwrap().unwrap();
        assert_eq!(message_type, 7);
    }
}
