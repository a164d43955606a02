//! Client side of the three-way handshake.
//!
//! ```text
//!   client                         router / peer
//!     │ ── SYN  seq=1  "<n frags>" ──▶ │
//!     │ ◀─ SYN-ACK seq=2 ───────────── │
//!     │ ── ACK  seq=3 ───────────────▶ │
//! ```
//!
//! [`Handshake`] is the pure state machine; [`perform`] drives it over a
//! [`Socket`] with a retry timer.  The final ACK is fire-and-forget: if it
//! is lost the peer repeats its SYN-ACK, and [`Handshake::on_packet`] in the
//! `Established` state answers that repeat with the same ACK again.

use std::net::SocketAddrV4;

use tokio::time::{sleep_until, timeout_at, Instant};

use crate::config::ConnConfig;
use crate::connection::ConnError;
use crate::packet::{Packet, PacketKind};
use crate::socket::{Socket, SocketError};
use crate::state::HandshakeState;

/// Sequence number carried by the SYN.
pub const INITIAL_SEQ: u32 = 1;

/// Handshake state for one request.
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    peer: SocketAddrV4,
    fragment_count: usize,
    initial: u32,
}

impl Handshake {
    /// `fragment_count` is the number of DATA fragments the request will
    /// send; the peer learns it from the SYN payload.
    pub fn new(peer: SocketAddrV4, fragment_count: usize) -> Self {
        Self {
            state: HandshakeState::Init,
            peer,
            fragment_count,
            initial: INITIAL_SEQ,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Build the first SYN and enter `SynSent`.
    pub fn start(&mut self) -> Packet {
        self.state = HandshakeState::SynSent;
        self.syn()
    }

    /// The retry timer fired without a valid reply: same SYN again.
    pub fn on_timeout(&mut self) -> Packet {
        debug_assert_ne!(self.state, HandshakeState::Init);
        self.syn()
    }

    /// Feed one inbound packet.
    ///
    /// Returns the ACK to send when `packet` is a SYN-ACK for our SYN.
    /// Anything else is ignored and leaves the state unchanged.
    pub fn on_packet(&mut self, packet: &Packet) -> Option<Packet> {
        if self.state == HandshakeState::Init || !self.accepts(packet) {
            return None;
        }
        self.state = HandshakeState::Established;
        Some(Packet::control(
            PacketKind::Ack,
            packet.seq.wrapping_add(1),
            self.peer,
        ))
    }

    /// `true` for a SYN-ACK carrying `initial + 1`.
    pub fn accepts(&self, packet: &Packet) -> bool {
        packet.kind == PacketKind::SynAck && packet.seq == self.initial.wrapping_add(1)
    }

    fn syn(&self) -> Packet {
        Packet::new(
            PacketKind::Syn,
            self.initial,
            self.peer,
            self.fragment_count.to_string().into_bytes(),
        )
    }
}

/// Run the handshake over `socket` (already connected to the router).
///
/// Each attempt sends the SYN and listens until `handshake_timeout` elapses;
/// packets that are not the expected SYN-ACK are discarded without ending
/// the attempt.  Returns the established [`Handshake`], or
/// [`ConnError::HandshakeFailed`] once `max_handshake_attempts` SYNs went
/// unanswered.
pub async fn perform(
    socket: &Socket,
    peer: SocketAddrV4,
    fragment_count: usize,
    config: &ConnConfig,
) -> Result<Handshake, ConnError> {
    let mut hs = Handshake::new(peer, fragment_count);
    let mut syn = hs.start();

    for attempt in 1..=config.max_handshake_attempts {
        if attempt > 1 {
            syn = hs.on_timeout();
            log::debug!("[handshake] timeout; → SYN again (attempt {attempt})");
        } else {
            log::debug!("[handshake] → SYN seq={} frags={fragment_count}", syn.seq);
        }

        if let Err(e) = socket.send(&syn).await {
            log::warn!("[handshake] SYN send failed: {e}");
        }

        let deadline = Instant::now() + config.handshake_timeout;
        loop {
            match timeout_at(deadline, socket.recv()).await {
                Ok(Ok(pkt)) => {
                    if let Some(ack) = hs.on_packet(&pkt) {
                        if let Err(e) = socket.send(&ack).await {
                            log::warn!("[handshake] ACK send failed: {e}");
                        }
                        log::debug!("[handshake] ← SYN-ACK seq={}; → ACK seq={}", pkt.seq, ack.seq);
                        return Ok(hs);
                    }
                    log::debug!(
                        "[handshake] ignoring {} seq={} while in {}",
                        pkt.kind,
                        pkt.seq,
                        hs.state()
                    );
                }
                Ok(Err(SocketError::Packet(e))) => return Err(e.into()),
                Ok(Err(SocketError::Io(e))) => {
                    log::debug!("[handshake] read error: {e}");
                    sleep_until(deadline).await;
                    break;
                }
                Err(_elapsed) => break,
            }
        }
    }

    log::warn!(
        "[handshake] no SYN-ACK after {} attempt(s); giving up",
        config.max_handshake_attempts
    );
    Err(ConnError::HandshakeFailed {
        attempts: config.max_handshake_attempts,
    })
}
