//! Background retransmission of request fragments.
//!
//! The receive loop never writes retransmissions itself on the fast path.
//! Every ACK or NAK it sees is forwarded as a [`Notice`] to a tokio task that
//! owns the encoded request fragments and re-writes the ones the peer
//! reports missing.
//!
//! # Policy
//!
//! Resend-on-signal: a NAK for fragment N puts N into the re-send set and
//! writes N once; an ACK for N takes it out again.  Bulk re-sending of every
//! unacknowledged fragment is the receive loop's job when a read goes idle.
//!
//! # Back-pressure
//!
//! Notices travel through a bounded channel filled with `try_send`.  When the
//! channel is full the notice is dropped; the peer keeps NAKing a fragment
//! it does not have, so a later notice covers the lost one.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::packet::{Packet, PacketError};
use crate::socket::Socket;

/// Loss signal forwarded from the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The peer reported fragment `seq` missing.
    Nak(u32),
    /// The peer acknowledged fragment `seq`.
    Ack(u32),
}

// ---------------------------------------------------------------------------
// ResendSet
// ---------------------------------------------------------------------------

/// Fragments known to need re-sending.
///
/// Only sequence numbers that belong to the request are ever admitted; a
/// NAK for anything else is ignored.
#[derive(Debug, Clone, Default)]
pub struct ResendSet {
    known: BTreeSet<u32>,
    pending: BTreeSet<u32>,
}

impl ResendSet {
    pub fn new(known: impl IntoIterator<Item = u32>) -> Self {
        Self {
            known: known.into_iter().collect(),
            pending: BTreeSet::new(),
        }
    }

    /// Apply one notice; returns the fragment to write now, if any.
    pub fn on_notice(&mut self, notice: Notice) -> Option<u32> {
        match notice {
            Notice::Nak(seq) if self.known.contains(&seq) => {
                self.pending.insert(seq);
                Some(seq)
            }
            Notice::Nak(_) => None,
            Notice::Ack(seq) => {
                self.pending.remove(&seq);
                None
            }
        }
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.pending.contains(&seq)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Retransmitter
// ---------------------------------------------------------------------------

/// Counters reported by [`Retransmitter::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetransmitStats {
    /// Notices the task consumed.
    pub notices: u64,
    /// Fragments it re-wrote to the socket.
    pub resent: u64,
}

/// Handle to a running retransmission task.
///
/// Dropping the handle aborts the task; [`shutdown`](Self::shutdown) lets it
/// drain the channel first and returns its counters.
#[derive(Debug)]
pub struct Retransmitter {
    tx: Option<mpsc::Sender<Notice>>,
    handle: Option<JoinHandle<RetransmitStats>>,
    dropped: u64,
}

impl Retransmitter {
    /// Encode `fragments` once and spawn the task that re-sends them.
    pub fn spawn(
        socket: Arc<Socket>,
        fragments: &[Packet],
        capacity: usize,
    ) -> Result<Self, PacketError> {
        let frames = fragments
            .iter()
            .map(|p| Ok((p.seq, p.encode()?)))
            .collect::<Result<HashMap<u32, Vec<u8>>, PacketError>>()?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(socket, frames, rx));

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            dropped: 0,
        })
    }

    /// Hand a notice to the task without waiting.
    ///
    /// Returns `false` when the notice was dropped because the channel is
    /// full or the task has already stopped.
    pub fn notify(&mut self, notice: Notice) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(notice) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                self.dropped += 1;
                log::trace!("[rtx] notice channel full; dropping {n:?}");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Notices dropped so far because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Close the channel, let the task finish what is queued, and collect
    /// its counters.
    pub async fn shutdown(mut self) -> RetransmitStats {
        drop(self.tx.take());
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => RetransmitStats::default(),
        }
    }
}

impl Drop for Retransmitter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(
    socket: Arc<Socket>,
    frames: HashMap<u32, Vec<u8>>,
    mut rx: mpsc::Receiver<Notice>,
) -> RetransmitStats {
    let mut set = ResendSet::new(frames.keys().copied());
    let mut stats = RetransmitStats::default();

    while let Some(notice) = rx.recv().await {
        stats.notices += 1;
        let Some(seq) = set.on_notice(notice) else {
            continue;
        };
        let Some(bytes) = frames.get(&seq) else {
            continue;
        };
        match socket.send_bytes(bytes).await {
            Ok(()) => {
                stats.resent += 1;
                log::debug!("[rtx] NAK seq={seq}; → DATA again ({} pending)", set.len());
            }
            Err(e) => log::warn!("[rtx] resend of seq={seq} failed: {e}"),
        }
    }

    log::trace!("[rtx] channel closed; {} notice(s), {} resend(s)", stats.notices, stats.resent);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketKind;
    use std::net::SocketAddr;
    use std::time::Duration;

    #[test]
    fn nak_for_known_fragment_is_resent() {
        let mut set = ResendSet::new(4..7);
        assert_eq!(set.on_notice(Notice::Nak(5)), Some(5));
        assert!(set.contains(5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn nak_for_unknown_fragment_is_ignored() {
        let mut set = ResendSet::new(4..7);
        assert_eq!(set.on_notice(Notice::Nak(1)), None);
        assert_eq!(set.on_notice(Notice::Nak(7)), None);
        assert!(set.is_empty());
    }

    #[test]
    fn ack_clears_pending_fragment() {
        let mut set = ResendSet::new(4..7);
        set.on_notice(Notice::Nak(4));
        set.on_notice(Notice::Nak(6));
        assert_eq!(set.on_notice(Notice::Ack(4)), None);
        assert!(!set.contains(4));
        assert!(set.contains(6));
    }

    #[test]
    fn repeated_nak_resends_each_time() {
        let mut set = ResendSet::new([4]);
        assert_eq!(set.on_notice(Notice::Nak(4)), Some(4));
        assert_eq!(set.on_notice(Notice::Nak(4)), Some(4));
        assert_eq!(set.len(), 1);
    }

    async fn loopback_pair() -> (Arc<Socket>, Socket) {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let router = Socket::bind(any).await.unwrap();
        let client = Socket::bind(any).await.unwrap();
        client.connect(router.local_addr).await.unwrap();
        (Arc::new(client), router)
    }

    #[tokio::test]
    async fn task_rewrites_nakd_fragment_to_socket() {
        let (client, router) = loopback_pair().await;
        let peer = "10.0.0.1:80".parse().unwrap();
        let fragments = vec![
            Packet::new(PacketKind::Data, 4, peer, b"aaa".to_vec()),
            Packet::new(PacketKind::Data, 5, peer, b"bbb".to_vec()),
        ];

        let mut rtx = Retransmitter::spawn(client, &fragments, 8).unwrap();
        assert!(rtx.notify(Notice::Nak(5)));

        let (pkt, _) = tokio::time::timeout(Duration::from_secs(2), router.recv_from())
            .await
            .expect("resend within 2s")
            .unwrap();
        assert_eq!(pkt, fragments[1]);

        assert!(rtx.notify(Notice::Ack(5)));
        let stats = rtx.shutdown().await;
        assert_eq!(stats.notices, 2);
        assert_eq!(stats.resent, 1);
    }

    #[tokio::test]
    async fn full_channel_drops_notice() {
        let (client, _router) = loopback_pair().await;
        let peer = "10.0.0.1:80".parse().unwrap();
        let fragments = vec![Packet::new(PacketKind::Data, 4, peer, vec![1])];

        // The task cannot run between these synchronous calls on the
        // current-thread test runtime, so the second notice finds the
        // single slot occupied.
        let mut rtx = Retransmitter::spawn(client, &fragments, 1).unwrap();
        assert!(rtx.notify(Notice::Ack(4)));
        assert!(!rtx.notify(Notice::Ack(4)));
        assert_eq!(rtx.dropped(), 1);
        rtx.shutdown().await;
    }
}
