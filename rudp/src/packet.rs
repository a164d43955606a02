//! Wire-format definitions for router-forwarded datagrams.
//!
//! Every datagram exchanged with the router is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (kind, sequence number, peer endpoint,
//!   payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated or malformed input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |              Sequence Number ...              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  ... Seq      |              Peer IPv4 Address ...            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  ... Addr     |           Peer Port           |  Payload ...  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 11 bytes.
//! kind(1) + seq(4) + peer_addr(4) + peer_port(2)
//!
//! The peer fields name the *logical* peer, not the router the datagram is
//! sent to; the router reads them to forward the datagram.

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 11;

/// Largest payload a single datagram may carry.
pub const MAX_PAYLOAD: usize = 1013;

/// Largest datagram on the wire (`HEADER_LEN + MAX_PAYLOAD`).
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_ADDR: usize = 5;
const OFF_PORT: usize = 9;

/// Packet type carried in the first header byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Application data fragment.
    Data = 0,
    /// Positive acknowledgement of the fragment named by `seq`.
    Ack = 1,
    /// Handshake initiation; payload carries the request fragment count.
    Syn = 2,
    /// Handshake reply to a SYN.
    SynAck = 3,
    /// Negative acknowledgement: the fragment named by `seq` is missing.
    Nak = 4,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => PacketKind::Data,
            1 => PacketKind::Ack,
            2 => PacketKind::Syn,
            3 => PacketKind::SynAck,
            4 => PacketKind::Nak,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketKind::Data => "DATA",
            PacketKind::Ack => "ACK",
            PacketKind::Syn => "SYN",
            PacketKind::SynAck => "SYN-ACK",
            PacketKind::Nak => "NAK",
        };
        f.write_str(name)
    }
}

/// A complete protocol datagram: header fields + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    /// Handshake value for SYN / SYN-ACK, fragment number for DATA, and the
    /// fragment being (negatively) acknowledged for ACK / NAK.
    pub seq: u32,
    /// Logical peer the router forwards to.
    pub peer: SocketAddrV4,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, seq: u32, peer: SocketAddrV4, payload: Vec<u8>) -> Self {
        Self {
            kind,
            seq,
            peer,
            payload,
        }
    }

    /// A payload-less control packet (ACK, NAK, SYN-ACK).
    pub fn control(kind: PacketKind, seq: u32, peer: SocketAddrV4) -> Self {
        Self::new(kind, seq, peer, Vec::new())
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Fails only when the payload would push the datagram past
    /// [`MAX_DATAGRAM`].
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[OFF_KIND] = self.kind.to_u8();
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ADDR..OFF_ADDR + 4].copy_from_slice(&self.peer.ip().octets());
        buf[OFF_PORT..OFF_PORT + 2].copy_from_slice(&self.peer.port().to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the kind byte is not one of the five known kinds.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::TooShort(buf.len()));
        }

        let kind = PacketKind::from_u8(buf[OFF_KIND])
            .ok_or(PacketError::UnknownKind(buf[OFF_KIND]))?;
        let seq = u32::from_be_bytes([
            buf[OFF_SEQ],
            buf[OFF_SEQ + 1],
            buf[OFF_SEQ + 2],
            buf[OFF_SEQ + 3],
        ]);
        let addr = Ipv4Addr::new(
            buf[OFF_ADDR],
            buf[OFF_ADDR + 1],
            buf[OFF_ADDR + 2],
            buf[OFF_ADDR + 3],
        );
        let port = u16::from_be_bytes([buf[OFF_PORT], buf[OFF_PORT + 1]]);

        Ok(Packet {
            kind,
            seq,
            peer: SocketAddrV4::new(addr, port),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Parse the dotted-quad host of a logical peer.
///
/// The header has room for exactly four octets, so anything else (host
/// names, IPv6 literals, the wrong number of octets, octets over 255) is
/// rejected here rather than written to the wire as zeros.
pub fn parse_peer_host(host: &str) -> Result<Ipv4Addr, PacketError> {
    host.parse::<Ipv4Addr>()
        .map_err(|_| PacketError::BadAddress(host.to_string()))
}

/// Errors that can arise when building or parsing a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Datagram shorter than the fixed header.
    #[error("malformed packet: {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    TooShort(usize),
    /// Kind byte outside `0..=4`.
    #[error("malformed packet: unknown packet kind {0}")]
    UnknownKind(u8),
    /// Peer host is not a four-octet dotted quad.
    #[error("malformed packet: peer address {0:?} is not a dotted-quad IPv4 address")]
    BadAddress(String),
    /// Payload does not fit in one datagram.
    #[error("malformed packet: payload of {0} bytes exceeds {MAX_PAYLOAD}")]
    PayloadTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 2, 3), 8007)
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::new(PacketKind::Data, 42, peer(), b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn every_kind_roundtrips() {
        for kind in [
            PacketKind::Data,
            PacketKind::Ack,
            PacketKind::Syn,
            PacketKind::SynAck,
            PacketKind::Nak,
        ] {
            let pkt = Packet::control(kind, 7, peer());
            assert_eq!(Packet::decode(&pkt.encode().unwrap()).unwrap().kind, kind);
        }
    }

    #[test]
    fn kind_bytes_match_wire_table() {
        assert_eq!(PacketKind::Data.to_u8(), 0);
        assert_eq!(PacketKind::Ack.to_u8(), 1);
        assert_eq!(PacketKind::Syn.to_u8(), 2);
        assert_eq!(PacketKind::SynAck.to_u8(), 3);
        assert_eq!(PacketKind::Nak.to_u8(), 4);
    }

    #[test]
    fn header_fields_are_big_endian_on_wire() {
        let pkt = Packet::control(PacketKind::Ack, 0x0102_0304, peer());
        let bytes = pkt.encode().unwrap();
        assert_eq!(bytes[OFF_KIND], 1);
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ADDR..OFF_ADDR + 4], &[192, 168, 2, 3]);
        assert_eq!(&bytes[OFF_PORT..OFF_PORT + 2], &8007u16.to_be_bytes());
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let payload = b"exactly twelve!";
        let bytes = Packet::new(PacketKind::Data, 1, peer(), payload.to_vec())
            .encode()
            .unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + payload.len());
    }

    #[test]
    fn full_payload_hits_max_datagram() {
        let bytes = Packet::new(PacketKind::Data, 1, peer(), vec![7u8; MAX_PAYLOAD])
            .encode()
            .unwrap();
        assert_eq!(bytes.len(), MAX_DATAGRAM);
        assert_eq!(MAX_DATAGRAM, 1024);
    }

    #[test]
    fn oversized_payload_rejected() {
        let pkt = Packet::new(PacketKind::Data, 1, peer(), vec![0u8; MAX_PAYLOAD + 1]);
        assert_eq!(
            pkt.encode(),
            Err(PacketError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::TooShort(0)));
    }

    #[test]
    fn decode_every_short_length_returns_error() {
        let buf = [0u8; HEADER_LEN];
        for len in 0..HEADER_LEN {
            assert_eq!(Packet::decode(&buf[..len]), Err(PacketError::TooShort(len)));
        }
    }

    #[test]
    fn decode_header_only_has_empty_payload() {
        let pkt = Packet::decode(&[1, 0, 0, 0, 9, 127, 0, 0, 1, 0x1f, 0x90]).unwrap();
        assert_eq!(pkt.kind, PacketKind::Ack);
        assert_eq!(pkt.seq, 9);
        assert_eq!(pkt.peer, "127.0.0.1:8080".parse().unwrap());
        assert!(pkt.payload.is_empty());
    }

    #[test]
    fn decode_unknown_kind_returns_error() {
        let mut bytes = Packet::control(PacketKind::Nak, 1, peer()).encode().unwrap();
        bytes[OFF_KIND] = 9;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::UnknownKind(9)));
    }

    #[test]
    fn peer_host_accepts_dotted_quad() {
        assert_eq!(
            parse_peer_host("10.0.0.254").unwrap(),
            Ipv4Addr::new(10, 0, 0, 254)
        );
    }

    #[test]
    fn peer_host_rejects_malformed_addresses() {
        for host in ["localhost", "1.2.3", "1.2.3.4.5", "1.2.3.256", "::1", "a.b.c.d", ""] {
            assert!(
                matches!(parse_peer_host(host), Err(PacketError::BadAddress(_))),
                "{host:?} should be rejected"
            );
        }
    }
}
