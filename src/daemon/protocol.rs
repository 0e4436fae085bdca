//! IPC Protocol types using rkyv for zero-copy serialization
//!
//! All request/response types use `#[derive(Archive, Serialize, Deserialize)]`
//! so the daemon can read requests straight out of the receive buffer.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

/// Compatibility level this build speaks. A daemon reporting a lower version
/// must be replaced.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// IPC request from client to daemon
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub enum Request {
    /// Ask for the protocol version the daemon speaks
    Version,
    /// Ask for the daemon's process id
    Pid,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Version => "version",
            Request::Pid => "pid",
        }
    }
}

/// IPC response from daemon to client
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub enum Response {
    /// Response to Version
    Version { version: u32 },
    /// Response to Pid
    Pid { pid: u32 },
    /// Error occurred
    Error { kind: ErrorKind, message: String },
}

/// Error classes a daemon can report
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub enum ErrorKind {
    /// The database on disk predates the current storage format
    StorageIncompatible,
    /// Anything else
    Internal,
}

/// Message frame for wire protocol
///
/// Format: [4-byte length (little-endian)][rkyv bytes]
pub struct MessageFrame;

impl MessageFrame {
    /// Encode a request to bytes with length prefix
    pub fn encode_request(request: &Request) -> Result<Vec<u8>, rkyv::rancor::Error> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(request)?;
        Ok(Self::prefixed(&bytes))
    }

    /// Encode a response to bytes with length prefix
    pub fn encode_response(response: &Response) -> Result<Vec<u8>, rkyv::rancor::Error> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(response)?;
        Ok(Self::prefixed(&bytes))
    }

    /// Decode a response body (without the length prefix)
    pub fn decode_response(body: &[u8]) -> Result<Response, rkyv::rancor::Error> {
        rkyv::from_bytes::<Response, rkyv::rancor::Error>(body)
    }

    /// Read length prefix from buffer
    pub fn read_length(buf: &[u8; 4]) -> usize {
        u32::from_le_bytes(*buf) as usize
    }

    /// Zeroed, suitably aligned buffer for a frame body of `len` bytes
    pub fn body_buffer(len: usize) -> AlignedVec {
        let mut buf = AlignedVec::with_capacity(len);
        buf.resize(len, 0);
        buf
    }

    fn prefixed(bytes: &[u8]) -> Vec<u8> {
        let len = bytes.len() as u32;
        let mut result = Vec::with_capacity(4 + bytes.len());
        result.extend_from_slice(&len.to_le_bytes());
        result.extend_from_slice(bytes);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(frame: &[u8]) -> AlignedVec {
        let len = MessageFrame::read_length(frame[..4].try_into().unwrap());
        assert_eq!(len, frame.len() - 4);
        let mut buf = MessageFrame::body_buffer(len);
        buf.copy_from_slice(&frame[4..]);
        buf
    }

    #[test]
    fn request_is_readable_in_place() {
        let frame = MessageFrame::encode_request(&Request::Pid).unwrap();
        let bytes = body(&frame);
        let archived = rkyv::access::<ArchivedRequest, rkyv::rancor::Error>(&bytes).unwrap();
        assert!(matches!(archived, ArchivedRequest::Pid));
    }

    #[test]
    fn storage_error_keeps_its_kind() {
        let response = Response::Error {
            kind: ErrorKind::StorageIncompatible,
            message: "old database".to_string(),
        };
        let frame = MessageFrame::encode_response(&response).unwrap();
        let decoded = MessageFrame::decode_response(&body(&frame)).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn garbage_body_is_rejected() {
        let bytes = MessageFrame::body_buffer(3);
        assert!(MessageFrame::decode_response(&bytes).is_err());
    }

    #[test]
    fn request_names() {
        assert_eq!(Request::Version.name(), "version");
        assert_eq!(Request::Pid.name(), "pid");
    }
}
