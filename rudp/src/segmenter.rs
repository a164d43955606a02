//! Splits an outbound payload into DATA fragments.
//!
//! Fragment `i` carries bytes `[i * MAX_PAYLOAD, (i + 1) * MAX_PAYLOAD)` of
//! the payload and sequence number `base_seq + i`.  An empty payload still
//! produces one (empty) fragment so the peer always has something to ACK.

use std::net::SocketAddrV4;

use crate::packet::{Packet, PacketKind, MAX_PAYLOAD};

/// Sequence number of the first request fragment.
///
/// 1–3 are taken by the handshake (SYN, SYN-ACK, final ACK).
pub const FIRST_DATA_SEQ: u32 = 4;

/// Number of fragments [`segment`] produces for a payload of `len` bytes.
pub fn fragment_count(len: usize) -> usize {
    len.div_ceil(MAX_PAYLOAD).max(1)
}

/// Split `payload` into DATA packets addressed to `peer`.
pub fn segment(payload: &[u8], base_seq: u32, peer: SocketAddrV4) -> Vec<Packet> {
    if payload.is_empty() {
        return vec![Packet::new(PacketKind::Data, base_seq, peer, Vec::new())];
    }

    payload
        .chunks(MAX_PAYLOAD)
        .zip(base_seq..)
        .map(|(chunk, seq)| Packet::new(PacketKind::Data, seq, peer, chunk.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddrV4 {
        "10.0.0.2:8080".parse().unwrap()
    }

    fn reassemble(fragments: &[Packet]) -> Vec<u8> {
        fragments.iter().flat_map(|p| p.payload.iter().copied()).collect()
    }

    #[test]
    fn hello_world_is_one_fragment() {
        let fragments = segment(b"hello world", FIRST_DATA_SEQ, peer());
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].seq, FIRST_DATA_SEQ);
        assert_eq!(fragments[0].kind, PacketKind::Data);

        let decoded = Packet::decode(&fragments[0].encode().unwrap()).unwrap();
        assert_eq!(decoded.payload, b"hello world");
    }

    #[test]
    fn two_thousand_bytes_split_1013_987() {
        let payload = vec![b'x'; 2000];
        let fragments = segment(&payload, 10, peer());
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].payload.len(), 1013);
        assert_eq!(fragments[1].payload.len(), 987);
        assert_eq!(fragments[0].seq, 10);
        assert_eq!(fragments[1].seq, 11);
    }

    #[test]
    fn empty_payload_still_yields_one_fragment() {
        let fragments = segment(&[], FIRST_DATA_SEQ, peer());
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].payload.is_empty());
        assert_eq!(fragment_count(0), 1);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let payload = vec![1u8; MAX_PAYLOAD * 3];
        let fragments = segment(&payload, 0, peer());
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|p| p.payload.len() == MAX_PAYLOAD));
    }

    #[test]
    fn reassembly_in_order_reproduces_payload() {
        for len in [1usize, 1012, 1013, 1014, 2026, 5000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let fragments = segment(&payload, FIRST_DATA_SEQ, peer());
            assert_eq!(fragments.len(), fragment_count(len), "len {len}");
            assert_eq!(reassemble(&fragments), payload, "len {len}");
            for (i, p) in fragments.iter().enumerate() {
                assert_eq!(p.seq, FIRST_DATA_SEQ + i as u32);
                assert_eq!(p.peer, peer());
            }
        }
    }
}
