//! Receive-side state for a segmented response.
//!
//! [`Session`] tracks the next expected fragment, decides which ACKs and
//! NAKs each DATA packet calls for, and reassembles the response.  It does
//! **not** touch the socket; [`crate::connection`] sends whatever
//! [`Session::on_data`] returns.
//!
//! # Response fragments
//!
//! Response fragments are numbered from 1.  Every payload ends in a two-byte
//! trailer:
//!
//! ```text
//!  ┌──────────── body ────────────┬──────────┬───────┐
//!  │ application bytes            │ reserved │ count │
//!  └──────────────────────────────┴──────────┴───────┘
//! ```
//!
//! `count` on the first DATA packet to arrive is the total number of
//! fragments (0 means 1).  The reserved byte has no assigned meaning; both
//! trailer bytes are dropped from the stored body.

use std::net::SocketAddrV4;

use crate::packet::{Packet, PacketKind};

/// Bytes at the end of every response payload that are not application data.
pub const TRAILER_LEN: usize = 2;

/// Sequence number of the first response fragment.
pub const FIRST_RESPONSE_SEQ: u32 = 1;

/// What the caller should do after one DATA packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataOutcome {
    /// ACK / NAK packets to send, in order.
    pub replies: Vec<Packet>,
    /// The full response, once it is complete.
    pub complete: Option<Vec<u8>>,
}

/// Per-request reassembly state.
#[derive(Debug, Clone)]
pub struct Session {
    peer: SocketAddrV4,
    /// Next in-order fragment.
    expected: u32,
    /// Announced fragment count; `None` until the first DATA packet.
    total: Option<usize>,
    /// `slots[seq - 1]` holds the body of fragment `seq`.
    slots: Vec<Option<Vec<u8>>>,
}

impl Session {
    pub fn new(peer: SocketAddrV4) -> Self {
        Self {
            peer,
            expected: FIRST_RESPONSE_SEQ,
            total: None,
            slots: Vec::new(),
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn total_fragments(&self) -> Option<usize> {
        self.total
    }

    /// `true` once any response DATA has arrived.
    pub fn has_data(&self) -> bool {
        self.total.is_some()
    }

    /// Stored body of fragment `seq`, if received.
    pub fn fragment(&self, seq: u32) -> Option<&[u8]> {
        self.slot_index(seq)
            .and_then(|i| self.slots[i].as_deref())
    }

    /// Announced fragments not yet received, ascending.
    pub fn missing(&self) -> Vec<u32> {
        self.slots
            .iter()
            .zip(FIRST_RESPONSE_SEQ..)
            .filter(|(slot, _)| slot.is_none())
            .map(|(_, seq)| seq)
            .collect()
    }

    /// Process one DATA packet.
    ///
    /// - `seq == expected`: ACK it and advance.
    /// - `seq <  expected`: duplicate or late fill; ACK it again.
    /// - `seq >  expected`: NAK every fragment in `expected..seq`, then
    ///   continue after `seq`.
    ///
    /// Fragments numbered outside `1..=total` are discarded without a reply.
    pub fn on_data(&mut self, packet: &Packet) -> DataOutcome {
        debug_assert_eq!(packet.kind, PacketKind::Data);

        if self.total.is_none() {
            let count = packet.payload.last().copied().unwrap_or(1).max(1) as usize;
            self.total = Some(count);
            self.slots = vec![None; count];
        }

        let seq = packet.seq;
        let Some(index) = self.slot_index(seq) else {
            log::warn!(
                "[session] DATA seq={seq} outside 1..={}; discarded",
                self.slots.len()
            );
            return DataOutcome::default();
        };

        let body_len = packet.payload.len().saturating_sub(TRAILER_LEN);
        if self.slots[index].is_none() {
            self.slots[index] = Some(packet.payload[..body_len].to_vec());
        }

        let mut replies = Vec::new();
        if seq == self.expected {
            replies.push(self.reply(PacketKind::Ack, seq));
            self.expected = seq + 1;
        } else if seq < self.expected {
            replies.push(self.reply(PacketKind::Ack, seq));
        } else {
            replies.extend((self.expected..seq).map(|missing| self.reply(PacketKind::Nak, missing)));
            self.expected = seq + 1;
        }

        let complete = if self.slots.len() == 1 {
            self.slots[index].clone()
        } else if self.slots.iter().all(Option::is_some) {
            Some(self.assemble())
        } else {
            None
        };

        DataOutcome { replies, complete }
    }

    /// NAKs for every announced fragment still missing.
    pub fn renak(&self) -> Vec<Packet> {
        self.missing()
            .into_iter()
            .map(|seq| self.reply(PacketKind::Nak, seq))
            .collect()
    }

    fn assemble(&self) -> Vec<u8> {
        self.slots.iter().flatten().flatten().copied().collect()
    }

    fn slot_index(&self, seq: u32) -> Option<usize> {
        let index = (seq as usize).checked_sub(FIRST_RESPONSE_SEQ as usize)?;
        (index < self.slots.len()).then_some(index)
    }

    fn reply(&self, kind: PacketKind, seq: u32) -> Packet {
        Packet::control(kind, seq, self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddrV4 {
        "10.1.1.1:8080".parse().unwrap()
    }

    /// A response fragment whose trailer announces `count` fragments.
    fn frag(seq: u32, body: &[u8], count: u8) -> Packet {
        let mut payload = body.to_vec();
        payload.extend_from_slice(&[0, count]);
        Packet::new(PacketKind::Data, seq, peer(), payload)
    }

    fn kinds_and_seqs(replies: &[Packet]) -> Vec<(PacketKind, u32)> {
        replies.iter().map(|p| (p.kind, p.seq)).collect()
    }

    #[test]
    fn single_fragment_response_completes_immediately() {
        let mut s = Session::new(peer());
        let out = s.on_data(&frag(1, b"HTTP/1.0 200 OK\r\n\r\nhi", 1));
        assert_eq!(kinds_and_seqs(&out.replies), vec![(PacketKind::Ack, 1)]);
        assert_eq!(out.complete.as_deref(), Some(&b"HTTP/1.0 200 OK\r\n\r\nhi"[..]));
    }

    #[test]
    fn zero_count_means_one_fragment() {
        let mut s = Session::new(peer());
        let out = s.on_data(&frag(1, b"body", 0));
        assert_eq!(s.total_fragments(), Some(1));
        assert_eq!(out.complete.as_deref(), Some(&b"body"[..]));
    }

    #[test]
    fn trailer_bytes_are_stripped() {
        let mut s = Session::new(peer());
        s.on_data(&frag(1, b"abc", 3));
        assert_eq!(s.fragment(1), Some(&b"abc"[..]));
    }

    #[test]
    fn in_order_fragments_ack_and_assemble() {
        let mut s = Session::new(peer());
        let a = s.on_data(&frag(1, b"one-", 3));
        let b = s.on_data(&frag(2, b"two-", 3));
        let c = s.on_data(&frag(3, b"three", 3));

        assert_eq!(kinds_and_seqs(&a.replies), vec![(PacketKind::Ack, 1)]);
        assert_eq!(kinds_and_seqs(&b.replies), vec![(PacketKind::Ack, 2)]);
        assert_eq!(kinds_and_seqs(&c.replies), vec![(PacketKind::Ack, 3)]);
        assert!(a.complete.is_none());
        assert!(b.complete.is_none());
        assert_eq!(c.complete.as_deref(), Some(&b"one-two-three"[..]));
        assert_eq!(s.expected(), 4);
    }

    #[test]
    fn gap_naks_each_missing_fragment() {
        let mut s = Session::new(peer());
        s.on_data(&frag(1, b"a", 6));
        assert_eq!(s.expected(), 2);

        // expected = 2, arrival = 2 + 3
        let out = s.on_data(&frag(5, b"e", 6));
        assert_eq!(
            kinds_and_seqs(&out.replies),
            vec![(PacketKind::Nak, 2), (PacketKind::Nak, 3), (PacketKind::Nak, 4)]
        );
        assert_eq!(s.expected(), 6);
        assert_eq!(s.missing(), vec![2, 3, 4, 6]);
    }

    #[test]
    fn late_fill_is_acked_and_completes() {
        let mut s = Session::new(peer());
        s.on_data(&frag(2, b"world", 2));
        assert_eq!(s.expected(), 3);

        let out = s.on_data(&frag(1, b"hello ", 2));
        assert_eq!(kinds_and_seqs(&out.replies), vec![(PacketKind::Ack, 1)]);
        assert_eq!(out.complete.as_deref(), Some(&b"hello world"[..]));
    }

    #[test]
    fn first_arrival_out_of_order_naks_from_one() {
        let mut s = Session::new(peer());
        let out = s.on_data(&frag(3, b"c", 3));
        assert_eq!(
            kinds_and_seqs(&out.replies),
            vec![(PacketKind::Nak, 1), (PacketKind::Nak, 2)]
        );
        assert_eq!(s.total_fragments(), Some(3));
    }

    #[test]
    fn duplicate_is_reacked_without_state_change() {
        let mut s = Session::new(peer());
        s.on_data(&frag(1, b"first", 3));
        s.on_data(&frag(2, b"second", 3));
        let before_expected = s.expected();

        let out = s.on_data(&frag(1, b"CHANGED", 3));
        assert_eq!(kinds_and_seqs(&out.replies), vec![(PacketKind::Ack, 1)]);
        assert_eq!(s.expected(), before_expected);
        assert_eq!(s.fragment(1), Some(&b"first"[..]));
        assert!(out.complete.is_none());
    }

    #[test]
    fn out_of_range_fragment_is_discarded() {
        let mut s = Session::new(peer());
        s.on_data(&frag(1, b"a", 2));
        let out = s.on_data(&frag(9, b"z", 2));
        assert!(out.replies.is_empty());
        assert!(out.complete.is_none());
        assert_eq!(s.expected(), 2);

        let zero = s.on_data(&frag(0, b"z", 2));
        assert!(zero.replies.is_empty());
    }

    #[test]
    fn empty_bodies_still_count_as_received() {
        let mut s = Session::new(peer());
        s.on_data(&frag(1, b"", 2));
        let out = s.on_data(&frag(2, b"", 2));
        assert_eq!(out.complete.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn renak_lists_missing_slots() {
        let mut s = Session::new(peer());
        s.on_data(&frag(2, b"b", 4));
        let naks = s.renak();
        assert_eq!(
            kinds_and_seqs(&naks),
            vec![(PacketKind::Nak, 1), (PacketKind::Nak, 3), (PacketKind::Nak, 4)]
        );
    }
}
