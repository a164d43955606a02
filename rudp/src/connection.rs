//! Per-request lifecycle: handshake, send, receive loop.
//!
//! A [`Connection`] owns a socket connected to the router and the logical
//! peer the router should forward to.  Each call to
//! [`Connection::exchange`] is one complete request:
//!
//! ```text
//!  segment ─▶ handshake ─▶ spawn retransmitter ─▶ write fragments
//!                                                       │
//!               ┌───────────────────────────────────────┘
//!               ▼
//!         receive loop ──ACK/NAK──▶ retransmitter (try_send)
//!               │
//!               ├─ DATA ─▶ Session (ACK / NAK / reassemble)
//!               └─ idle ─▶ bulk resend or re-NAK, bounded
//! ```
//!
//! Nothing here is shared between requests: the [`Session`], the
//! outstanding-fragment set and the retransmission task all live and die
//! inside one `exchange` call.

use std::collections::BTreeSet;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::ToSocketAddrs;
use tokio::time::timeout;

use crate::config::ConnConfig;
use crate::handshake::{self, Handshake};
use crate::packet::{Packet, PacketError, PacketKind};
use crate::retransmit::{Notice, Retransmitter};
use crate::segmenter::{segment, FIRST_DATA_SEQ};
use crate::session::Session;
use crate::socket::{Socket, SocketError};

/// Pause after a read I/O error so a refused or closed socket does not spin.
const IO_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that end a request exchange.
#[derive(Debug, Error)]
pub enum ConnError {
    /// A datagram could not be built or decoded.
    #[error(transparent)]
    Packet(#[from] PacketError),
    /// The socket could not be created or connected.
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// No SYN-ACK arrived.
    #[error("handshake failed: no SYN-ACK after {attempts} attempt(s)")]
    HandshakeFailed { attempts: u32 },
    /// The peer stopped responding mid-exchange.
    #[error("peer silent for {rounds} consecutive read(s); giving up")]
    RetriesExhausted { rounds: u32 },
}

// ---------------------------------------------------------------------------
// ResponseMode
// ---------------------------------------------------------------------------

/// How the peer delivers its response, and so when an exchange is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Numbered, trailer-carrying fragments reassembled by a [`Session`]
    /// (GET requests).
    Segmented,
    /// The first DATA packet is the whole response (POST requests).
    SingleFragment,
}

// ---------------------------------------------------------------------------
// Outstanding
// ---------------------------------------------------------------------------

/// Request fragments the peer has not acknowledged.
#[derive(Debug)]
struct Outstanding {
    known: BTreeSet<u32>,
    unacked: BTreeSet<u32>,
}

impl Outstanding {
    fn new(fragments: &[Packet]) -> Self {
        let known: BTreeSet<u32> = fragments.iter().map(|p| p.seq).collect();
        Self {
            unacked: known.clone(),
            known,
        }
    }

    fn apply(&mut self, notice: Notice) {
        match notice {
            Notice::Ack(seq) => {
                self.unacked.remove(&seq);
            }
            Notice::Nak(seq) if self.known.contains(&seq) => {
                self.unacked.insert(seq);
            }
            Notice::Nak(_) => {}
        }
    }

    fn clear(&mut self) {
        self.unacked.clear();
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Request channel to one logical peer through the router.
#[derive(Debug)]
pub struct Connection {
    socket: Arc<Socket>,
    peer: SocketAddrV4,
    config: ConnConfig,
}

impl Connection {
    /// Bind an ephemeral socket and connect it to `router`.
    pub async fn open(
        router: impl ToSocketAddrs,
        peer: SocketAddrV4,
        config: ConnConfig,
    ) -> Result<Self, ConnError> {
        let any: SocketAddr = ([0, 0, 0, 0], 0).into();
        let socket = Socket::bind(any).await?;
        socket.connect(router).await?;
        log::debug!("[conn] bound {} for peer {peer}", socket.local_addr);
        Ok(Self::new(socket, peer, config))
    }

    /// Wrap a socket that is already connected to the router.
    pub fn new(socket: Socket, peer: SocketAddrV4, config: ConnConfig) -> Self {
        Self {
            socket: Arc::new(socket),
            peer,
            config,
        }
    }

    pub fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    /// Send `request` and wait for the complete response.
    pub async fn exchange(&self, request: &[u8], mode: ResponseMode) -> Result<Vec<u8>, ConnError> {
        let fragments = segment(request, FIRST_DATA_SEQ, self.peer);
        let mut hs = handshake::perform(&self.socket, self.peer, fragments.len(), &self.config).await?;

        let mut rtx = Retransmitter::spawn(
            Arc::clone(&self.socket),
            &fragments,
            self.config.notice_capacity,
        )?;

        for fragment in &fragments {
            if let Err(e) = self.socket.send(fragment).await {
                log::warn!("[conn] DATA seq={} send failed: {e}", fragment.seq);
            }
        }
        log::debug!(
            "[conn] → {} request fragment(s), {} byte(s), {mode:?}",
            fragments.len(),
            request.len()
        );

        let result = self.receive(&fragments, &mut hs, &mut rtx, mode).await;

        let dropped = rtx.dropped();
        let stats = rtx.shutdown().await;
        log::debug!(
            "[conn] done: {} notice(s), {} resend(s), {dropped} dropped",
            stats.notices,
            stats.resent
        );
        result
    }

    async fn receive(
        &self,
        fragments: &[Packet],
        hs: &mut Handshake,
        rtx: &mut Retransmitter,
        mode: ResponseMode,
    ) -> Result<Vec<u8>, ConnError> {
        let mut outstanding = Outstanding::new(fragments);
        let mut session = Session::new(self.peer);
        let mut idle = 0u32;

        loop {
            let pkt = match timeout(self.config.read_timeout, self.socket.recv()).await {
                Ok(Ok(pkt)) => pkt,
                Ok(Err(SocketError::Packet(e))) => return Err(e.into()),
                Ok(Err(SocketError::Io(e))) => {
                    log::debug!("[conn] read error: {e}");
                    tokio::time::sleep(IO_ERROR_BACKOFF).await;
                    idle += 1;
                    self.recover(idle, fragments, &outstanding, &session, mode).await?;
                    continue;
                }
                Err(_elapsed) => {
                    idle += 1;
                    self.recover(idle, fragments, &outstanding, &session, mode).await?;
                    continue;
                }
            };
            idle = 0;

            match pkt.kind {
                PacketKind::Ack | PacketKind::Nak => {
                    let notice = if pkt.kind == PacketKind::Ack {
                        Notice::Ack(pkt.seq)
                    } else {
                        Notice::Nak(pkt.seq)
                    };
                    log::trace!("[conn] ← {} seq={}", pkt.kind, pkt.seq);
                    rtx.notify(notice);
                    outstanding.apply(notice);
                }
                PacketKind::SynAck => {
                    if let Some(ack) = hs.on_packet(&pkt) {
                        log::debug!("[conn] repeated SYN-ACK; → ACK seq={}", ack.seq);
                        self.send_quietly(&ack).await;
                    }
                }
                PacketKind::Syn => {
                    log::debug!("[conn] ignoring SYN seq={}", pkt.seq);
                }
                PacketKind::Data => match mode {
                    ResponseMode::SingleFragment => {
                        log::debug!("[conn] ← DATA seq={} len={} (final)", pkt.seq, pkt.payload.len());
                        self.send_quietly(&Packet::control(PacketKind::Ack, pkt.seq, self.peer))
                            .await;
                        return Ok(pkt.payload);
                    }
                    ResponseMode::Segmented => {
                        // Response data means the peer has the whole request.
                        outstanding.clear();
                        let out = session.on_data(&pkt);
                        log::debug!(
                            "[conn] ← DATA seq={} len={} expected={} total={:?}",
                            pkt.seq,
                            pkt.payload.len(),
                            session.expected(),
                            session.total_fragments()
                        );
                        for reply in &out.replies {
                            self.send_quietly(reply).await;
                        }
                        if let Some(body) = out.complete {
                            return Ok(body);
                        }
                    }
                },
            }
        }
    }

    /// One idle round: give up past the bound, otherwise push the exchange
    /// forward from our side.
    async fn recover(
        &self,
        idle: u32,
        fragments: &[Packet],
        outstanding: &Outstanding,
        session: &Session,
        mode: ResponseMode,
    ) -> Result<(), ConnError> {
        if idle > self.config.max_idle_rounds {
            log::warn!("[conn] {idle} idle round(s); giving up");
            return Err(ConnError::RetriesExhausted {
                rounds: self.config.max_idle_rounds,
            });
        }

        if mode == ResponseMode::Segmented && session.has_data() {
            let naks = session.renak();
            log::debug!("[conn] idle; re-NAKing {} missing fragment(s)", naks.len());
            for nak in &naks {
                self.send_quietly(nak).await;
            }
            return Ok(());
        }

        let lost: Vec<&Packet> = fragments
            .iter()
            .filter(|p| outstanding.unacked.contains(&p.seq))
            .collect();
        log::debug!("[conn] idle; resending {} unacknowledged fragment(s)", lost.len());
        for fragment in lost {
            self.send_quietly(fragment).await;
        }
        Ok(())
    }

    async fn send_quietly(&self, packet: &Packet) {
        if let Err(e) = self.socket.send(packet).await {
            log::warn!("[conn] {} seq={} send failed: {e}", packet.kind, packet.seq);
        }
    }
}
