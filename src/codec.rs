//! Plain-text line protocol.
//!
//! Every datagram carries exactly one whitespace-delimited ASCII message, there is no
//! length prefix or framing beyond the datagram itself.
//!
//! - Register: `<id>`
//! - Introduction: `<peer_id> <host> <port>`
//! - Punch: `<ping|ack> from <sender_id>`

use std::fmt;
use std::str;
use thiserror::Error;

/// A datagram that does not decode as the expected message.
///
/// Receivers drop these and keep going, noise on the port is never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("datagram is not valid utf-8")]
    NotUtf8,
    #[error("empty peer id")]
    EmptyId,
    #[error("peer id {0:?} contains whitespace")]
    IdWhitespace(String),
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("unknown punch kind {0:?}")]
    UnknownKind(String),
    #[error("expected \"from\", found {0:?}")]
    MissingFrom(String),
}

/// Peer address as told by the rendezvous server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introduction {
    pub peer_id: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchKind {
    Ping,
    Ack,
}

impl PunchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchKind::Ping => "ping",
            PunchKind::Ack => "ack",
        }
    }
}

impl fmt::Display for PunchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness datagram exchanged directly between peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Punch {
    pub kind: PunchKind,
    pub sender: String,
}

impl fmt::Display for Punch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.kind, self.sender)
    }
}

fn as_text(buf: &[u8]) -> Result<&str, MalformedMessage> {
    str::from_utf8(buf).map_err(|_| MalformedMessage::NotUtf8)
}

fn fields<const N: usize>(text: &str) -> Result<[&str; N], MalformedMessage> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let found = fields.len();
    fields
        .try_into()
        .map_err(|_| MalformedMessage::FieldCount { expected: N, found })
}

/// Checks that an id survives a trip through the whitespace-delimited introduction.
pub fn validate_id(id: &str) -> Result<(), MalformedMessage> {
    if id.is_empty() {
        return Err(MalformedMessage::EmptyId);
    }
    if id.chars().any(char::is_whitespace) {
        return Err(MalformedMessage::IdWhitespace(id.to_string()));
    }
    Ok(())
}

pub fn encode_register(id: &str) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub fn decode_register(buf: &[u8]) -> Result<String, MalformedMessage> {
    let id = as_text(buf)?.trim();
    validate_id(id)?;
    Ok(id.to_string())
}

pub fn encode_introduction(peer_id: &str, host: &str, port: u16) -> Vec<u8> {
    format!("{} {} {}", peer_id, host, port).into_bytes()
}

pub fn decode_introduction(buf: &[u8]) -> Result<Introduction, MalformedMessage> {
    let [peer_id, host, port] = fields::<3>(as_text(buf)?)?;
    let port = port
        .parse()
        .map_err(|_| MalformedMessage::InvalidPort(port.to_string()))?;

    Ok(Introduction {
        peer_id: peer_id.to_string(),
        host: host.to_string(),
        port,
    })
}

pub fn encode_punch(kind: PunchKind, sender: &str) -> Vec<u8> {
    format!("{} from {}", kind, sender).into_bytes()
}

pub fn decode_punch(buf: &[u8]) -> Result<Punch, MalformedMessage> {
    let [kind, from, sender] = fields::<3>(as_text(buf)?)?;
    let kind = match kind {
        "ping" => PunchKind::Ping,
        "ack" => PunchKind::Ack,
        _ => return Err(MalformedMessage::UnknownKind(kind.to_string())),
    };
    if from != "from" {
        return Err(MalformedMessage::MissingFrom(from.to_string()));
    }

    Ok(Punch {
        kind,
        sender: sender.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        assert_eq!(encode_register("peer1"), b"peer1");
        assert_eq!(decode_register(b"  peer1\n").unwrap(), "peer1");
        assert_eq!(decode_register(b" \t"), Err(MalformedMessage::EmptyId));
        assert_eq!(
            decode_register(b"peer 1"),
            Err(MalformedMessage::IdWhitespace("peer 1".into()))
        );
        assert_eq!(decode_register(&[0xff, 0xfe]), Err(MalformedMessage::NotUtf8));
    }

    #[test]
    fn test_introduction() {
        let buf = encode_introduction("peer2", "10.0.0.7", 40123);
        assert_eq!(buf, b"peer2 10.0.0.7 40123");

        let intro = decode_introduction(b"peer2  ::1 9999\n").unwrap();
        assert_eq!(
            intro,
            Introduction {
                peer_id: "peer2".into(),
                host: "::1".into(),
                port: 9999,
            }
        );
    }

    #[test]
    fn test_introduction_malformed() {
        assert_eq!(
            decode_introduction(b"peer2 10.0.0.7"),
            Err(MalformedMessage::FieldCount {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            decode_introduction(b"a b c d"),
            Err(MalformedMessage::FieldCount {
                expected: 3,
                found: 4
            })
        );
        assert_eq!(
            decode_introduction(b"peer2 10.0.0.7 port"),
            Err(MalformedMessage::InvalidPort("port".into()))
        );
        assert_eq!(
            decode_introduction(b"peer2 10.0.0.7 70000"),
            Err(MalformedMessage::InvalidPort("70000".into()))
        );
    }

    #[test]
    fn test_punch() {
        assert_eq!(encode_punch(PunchKind::Ping, "peer1"), b"ping from peer1");
        assert_eq!(encode_punch(PunchKind::Ack, "peer2"), b"ack from peer2");

        let punch = decode_punch(b"ack from peer2").unwrap();
        assert_eq!(punch.kind, PunchKind::Ack);
        assert_eq!(punch.sender, "peer2");
        assert_eq!(punch.to_string(), "ack from peer2");
    }

    #[test]
    fn test_punch_malformed() {
        assert_eq!(
            decode_punch(b"pong from peer2"),
            Err(MalformedMessage::UnknownKind("pong".into()))
        );
        assert_eq!(
            decode_punch(b"ping to peer2"),
            Err(MalformedMessage::MissingFrom("to".into()))
        );
        assert!(decode_punch(b"ping").is_err());
        assert!(decode_punch(b"peer2 127.0.0.1 9999").is_err());
    }
}
