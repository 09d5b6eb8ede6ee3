//! Socket frame protocol.
//!
//! One frame per request: `type(1) | length(2, big-endian) | body`. The
//! length covers the whole frame including the 3-byte header. Replies are a
//! single type byte. Type values are a wire contract with the database-side
//! hook scripts.

use tokio::io::{AsyncRead, AsyncReadExt};

use walvault_common::{Error, Result};

/// Largest accepted frame, header included.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const HEADER_LEN: usize = 3;

/// Message and reply types carried in the first frame byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Check = 0x43,               // 'C'
    WalPush = 0x46,             // 'F'
    WalFetch = 0x47,            // 'G'
    Ok = 0x4F,                  // 'O'
    ArchiveNonExistence = 0x4E, // 'N'
    Error = 0x45,               // 'E'
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x43 => Some(Self::Check),
            0x46 => Some(Self::WalPush),
            0x47 => Some(Self::WalFetch),
            0x4F => Some(Self::Ok),
            0x4E => Some(Self::ArchiveNonExistence),
            0x45 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Read exactly one frame.
pub async fn read_message<R>(reader: &mut R) -> Result<(MessageType, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| Error::frame(format!("failed to read frame header: {e}")))?;

    let message_type = MessageType::from_byte(header[0])
        .ok_or_else(|| Error::frame(format!("unexpected message type: {:#04x}", header[0])))?;
    let length = u16::from_be_bytes([header[1], header[2]]) as usize;
    if length < HEADER_LEN {
        return Err(Error::frame(format!("frame length {length} too short")));
    }
    if length > MAX_FRAME_LEN {
        return Err(Error::frame(format!("frame length {length} too large")));
    }

    let mut body = vec![0u8; length - HEADER_LEN];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| Error::frame(format!("failed to read frame body: {e}")))?;
    Ok((message_type, body))
}

/// Encode one frame; used by clients and tests.
pub fn encode_message(message_type: MessageType, body: &[u8]) -> Vec<u8> {
    let length = (HEADER_LEN + body.len()) as u16;
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.push(message_type.as_byte());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Split a WalFetch body into its two NUL-separated fields:
/// `filename \0 destination path`.
pub fn parse_fetch_body(body: &[u8]) -> Result<(String, String)> {
    let text = std::str::from_utf8(body)
        .map_err(|_| Error::frame("wal-fetch body is not valid UTF-8".to_string()))?;
    let mut fields = text.split('\0').filter(|s| !s.is_empty());
    match (fields.next(), fields.next(), fields.next()) {
        (Some(name), Some(dest), None) => Ok((name.to_string(), dest.to_string())),
        _ => Err(Error::frame(
            "wal-fetch incorrect arguments count".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let frame = encode_message(MessageType::WalPush, b"000000010000000000000001");
        let (message_type, body) = read_message(&mut frame.as_slice()).await.unwrap();
        assert_eq!(message_type, MessageType::WalPush);
        assert_eq!(body, b"000000010000000000000001");
    }

    #[tokio::test]
    async fn test_type_bytes_are_the_contract() {
        assert_eq!(MessageType::Check.as_byte(), 0x43);
        assert_eq!(MessageType::WalPush.as_byte(), 0x46);
        assert_eq!(MessageType::WalFetch.as_byte(), 0x47);
        assert_eq!(MessageType::Ok.as_byte(), 0x4F);
        assert_eq!(MessageType::ArchiveNonExistence.as_byte(), 0x4E);
        assert_eq!(MessageType::Error.as_byte(), 0x45);
    }

    #[tokio::test]
    async fn test_unknown_type_is_a_frame_error() {
        let frame = [0x5A, 0x00, 0x03];
        let err = read_message(&mut frame.as_slice()).await.err().unwrap();
        assert!(matches!(err, walvault_common::Error::Frame(_)));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_rejected() {
        // Header claims the largest possible body but delivers 5 bytes.
        let mut frame = vec![MessageType::WalPush.as_byte()];
        frame.extend_from_slice(&u16::MAX.to_be_bytes());
        frame.resize(8, 0);
        let err = read_message(&mut frame.as_slice()).await.err().unwrap();
        assert!(matches!(err, walvault_common::Error::Frame(_)));
    }

    #[tokio::test]
    async fn test_short_length_is_rejected() {
        let frame = [MessageType::Check.as_byte(), 0x00, 0x02];
        let err = read_message(&mut frame.as_slice()).await.err().unwrap();
        assert!(matches!(err, walvault_common::Error::Frame(_)));
    }

    #[test]
    fn test_parse_fetch_body() {
        let (name, dest) = parse_fetch_body(b"000000010000000000000001\0/tmp/x").unwrap();
        assert_eq!(name, "000000010000000000000001");
        assert_eq!(dest, "/tmp/x");

        assert!(parse_fetch_body(b"missing_destination").is_err());
        assert!(parse_fetch_body(b"a\0b\0c").is_err());
    }
}
