//! In-process stand-in for the router and the application peer behind it.
//!
//! Real networks drop packets, and the real router sits between the client
//! and a real server.  To exercise the reliability paths without either,
//! [`Simulator`] binds a loopback socket that the client treats as its
//! router and plays the server side of one exchange:
//!
//! 1. answer the SYN with a SYN-ACK, learning the request fragment count;
//! 2. collect and ACK the request fragments, NAKing gaps;
//! 3. hand the reassembled request to a responder closure and deliver its
//!    answer, either segmented with the two-byte trailer or as one DATA
//!    packet, repairing losses the client reports.
//!
//! Faults are injected on both directions:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Targeted drop    | Drop the first copy of a given `(kind, seq)`.        |
//! | Random loss      | Drop any packet with probability `loss_rate`, drawn  |
//! |                  | from an RNG seeded with `seed` for reproducibility.  |
//! | Silence          | Ignore the first `ignore_syns` SYNs.                 |

use std::collections::HashSet;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::connection::ResponseMode;
use crate::handshake::INITIAL_SEQ;
use crate::packet::{Packet, PacketKind, MAX_PAYLOAD};
use crate::segmenter::FIRST_DATA_SEQ;
use crate::session::{FIRST_RESPONSE_SEQ, TRAILER_LEN};
use crate::socket::{Socket, SocketError};

/// Configuration for the fault-injection model and the simulated server.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// How the response is delivered.
    pub mode: ResponseMode,
    /// Probability that any given packet, in either direction, is dropped.
    pub loss_rate: f64,
    /// Seed for the loss RNG.
    pub seed: u64,
    /// Drop the first client → server packet matching each entry.
    pub drop_inbound_once: HashSet<(PacketKind, u32)>,
    /// Drop the first server → client packet matching each entry.
    pub drop_outbound_once: HashSet<(PacketKind, u32)>,
    /// SYNs to ignore before answering.
    pub ignore_syns: u32,
    /// Send a SYN-ACK with the wrong sequence number before the real one.
    pub bogus_syn_ack: bool,
    /// NAK missing request fragments when the client goes quiet.
    pub nak_gaps: bool,
    /// Quiet period that counts as one idle round.
    pub idle_timeout: Duration,
    /// Idle rounds tolerated before the simulator stops.
    pub max_idle_rounds: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults: a well-behaved peer.
        Self {
            mode: ResponseMode::Segmented,
            loss_rate: 0.0,
            seed: 0,
            drop_inbound_once: HashSet::new(),
            drop_outbound_once: HashSet::new(),
            ignore_syns: 0,
            bogus_syn_ack: false,
            nak_gaps: true,
            idle_timeout: Duration::from_millis(300),
            max_idle_rounds: 10,
        }
    }
}

/// What the simulator saw while serving one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimReport {
    /// The reassembled request.
    pub request: Vec<u8>,
    /// Logical peer named in the client's packet headers.
    pub peer: Option<SocketAddrV4>,
    /// Fragment count announced in the SYN.
    pub announced_fragments: usize,
    /// SYNs received, including ignored and dropped ones.
    pub syns: u32,
    /// Handshake ACKs received.
    pub handshake_acks: u32,
    /// Packets discarded by the fault model.
    pub dropped: u32,
    /// NAKs received from the client.
    pub naks_received: u32,
    /// NAKs sent to the client.
    pub naks_sent: u32,
    /// Request fragments received more than once.
    pub duplicate_fragments: u32,
}

/// Errors that stop the simulator.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("client went silent during {0}")]
    ClientSilent(&'static str),
    #[error("response of {0} bytes does not fit the response encoding")]
    ResponseTooLarge(usize),
}

/// A fault-injecting router + server for one exchange.
pub struct Simulator {
    socket: Socket,
    config: SimulatorConfig,
    rng: StdRng,
    report: SimReport,
}

impl Simulator {
    /// Bind on an ephemeral loopback port.
    pub async fn bind(config: SimulatorConfig) -> Result<Self, SimError> {
        let socket = Socket::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            socket,
            config,
            rng,
            report: SimReport::default(),
        })
    }

    /// Address the client should use as its router.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Serve exactly one exchange, answering the request with `respond`.
    pub async fn serve_one<F>(mut self, respond: F) -> Result<SimReport, SimError>
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        let (client, peer, count) = self.accept().await?;
        let request = self.collect(client, peer, count).await?;
        log::debug!("[sim] request complete: {} byte(s)", request.len());

        let response = respond(&request);
        self.report.request = request;
        match self.config.mode {
            ResponseMode::Segmented => self.respond_segmented(client, peer, &response).await?,
            ResponseMode::SingleFragment => self.respond_single(client, peer, response).await?,
        }
        Ok(self.report)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn accept(&mut self) -> Result<(SocketAddr, SocketAddrV4, usize), SimError> {
        let mut idle = 0;
        loop {
            let Some((pkt, from)) = self.recv(self.config.idle_timeout).await? else {
                idle += 1;
                if idle > self.config.max_idle_rounds {
                    return Err(SimError::ClientSilent("handshake"));
                }
                continue;
            };
            if pkt.kind != PacketKind::Syn || pkt.seq != INITIAL_SEQ {
                continue;
            }
            if self.report.syns <= self.config.ignore_syns {
                log::debug!("[sim] ignoring SYN #{}", self.report.syns);
                continue;
            }

            let count = std::str::from_utf8(&pkt.payload)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            self.report.peer = Some(pkt.peer);
            self.report.announced_fragments = count;

            if self.config.bogus_syn_ack {
                let bogus = Packet::control(PacketKind::SynAck, INITIAL_SEQ + 7, pkt.peer);
                self.send(&bogus, from).await?;
            }
            self.send_syn_ack(pkt.peer, from).await?;
            log::debug!("[sim] ← SYN frags={count}; → SYN-ACK");
            return Ok((from, pkt.peer, count));
        }
    }

    async fn collect(
        &mut self,
        client: SocketAddr,
        peer: SocketAddrV4,
        count: usize,
    ) -> Result<Vec<u8>, SimError> {
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; count];
        let mut expected = FIRST_DATA_SEQ;
        let mut idle = 0;

        while slots.iter().any(Option::is_none) {
            let Some((pkt, _)) = self.recv(self.config.idle_timeout).await? else {
                idle += 1;
                if idle > self.config.max_idle_rounds {
                    return Err(SimError::ClientSilent("request"));
                }
                if self.config.nak_gaps {
                    for (i, _) in slots.iter().enumerate().filter(|(_, s)| s.is_none()) {
                        self.send_nak(FIRST_DATA_SEQ + i as u32, peer, client).await?;
                    }
                }
                continue;
            };
            idle = 0;

            match pkt.kind {
                PacketKind::Syn => self.send_syn_ack(peer, client).await?,
                PacketKind::Ack => {
                    if pkt.seq == INITIAL_SEQ + 2 {
                        self.report.handshake_acks += 1;
                    }
                }
                PacketKind::Data => {
                    let Some(index) = (pkt.seq as usize)
                        .checked_sub(FIRST_DATA_SEQ as usize)
                        .filter(|i| *i < count)
                    else {
                        continue;
                    };
                    if slots[index].is_some() {
                        self.report.duplicate_fragments += 1;
                    } else {
                        slots[index] = Some(pkt.payload);
                    }
                    self.send(&Packet::control(PacketKind::Ack, pkt.seq, peer), client)
                        .await?;

                    if pkt.seq > expected && self.config.nak_gaps {
                        for missing in expected..pkt.seq {
                            if slots[(missing - FIRST_DATA_SEQ) as usize].is_none() {
                                self.send_nak(missing, peer, client).await?;
                            }
                        }
                    }
                    expected = expected.max(pkt.seq + 1);
                }
                PacketKind::Nak => self.report.naks_received += 1,
                PacketKind::SynAck => {}
            }
        }

        Ok(slots.into_iter().flatten().flatten().collect())
    }

    async fn respond_segmented(
        &mut self,
        client: SocketAddr,
        peer: SocketAddrV4,
        response: &[u8],
    ) -> Result<(), SimError> {
        let body_max = MAX_PAYLOAD - TRAILER_LEN;
        let chunks: Vec<&[u8]> = if response.is_empty() {
            vec![response]
        } else {
            response.chunks(body_max).collect()
        };
        let count = u8::try_from(chunks.len())
            .map_err(|_| SimError::ResponseTooLarge(response.len()))?;

        let fragments: Vec<Packet> = chunks
            .iter()
            .zip(FIRST_RESPONSE_SEQ..)
            .map(|(chunk, seq)| {
                let mut payload = chunk.to_vec();
                payload.extend_from_slice(&[0, count]);
                Packet::new(PacketKind::Data, seq, peer, payload)
            })
            .collect();

        for fragment in &fragments {
            self.send(fragment, client).await?;
        }

        let mut acked = vec![false; fragments.len()];
        let mut idle = 0;
        while acked.iter().any(|a| !a) {
            let Some((pkt, _)) = self.recv(self.config.idle_timeout).await? else {
                idle += 1;
                if idle > self.config.max_idle_rounds {
                    // Final ACKs can be lost after the client already has
                    // everything; silence here is not a failure.
                    break;
                }
                for (fragment, _) in fragments.iter().zip(&acked).filter(|(_, a)| !**a) {
                    self.send(fragment, client).await?;
                }
                continue;
            };
            idle = 0;

            let index = (pkt.seq as usize).checked_sub(FIRST_RESPONSE_SEQ as usize);
            match (pkt.kind, index) {
                (PacketKind::Ack, Some(i)) if i < fragments.len() => acked[i] = true,
                (PacketKind::Nak, Some(i)) if i < fragments.len() => {
                    self.report.naks_received += 1;
                    self.send(&fragments[i], client).await?;
                }
                (PacketKind::Data, _) => {
                    self.report.duplicate_fragments += 1;
                    self.send(&Packet::control(PacketKind::Ack, pkt.seq, peer), client)
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn respond_single(
        &mut self,
        client: SocketAddr,
        peer: SocketAddrV4,
        response: Vec<u8>,
    ) -> Result<(), SimError> {
        if response.len() > MAX_PAYLOAD {
            return Err(SimError::ResponseTooLarge(response.len()));
        }
        let reply = Packet::new(PacketKind::Data, FIRST_RESPONSE_SEQ, peer, response);
        self.send(&reply, client).await?;

        let mut idle = 0;
        loop {
            let Some((pkt, _)) = self.recv(self.config.idle_timeout).await? else {
                idle += 1;
                if idle > self.config.max_idle_rounds {
                    return Ok(());
                }
                self.send(&reply, client).await?;
                continue;
            };
            idle = 0;

            match pkt.kind {
                PacketKind::Ack if pkt.seq == FIRST_RESPONSE_SEQ => return Ok(()),
                PacketKind::Data => {
                    // The client is still resending: our ACK or reply was lost.
                    self.report.duplicate_fragments += 1;
                    self.send(&Packet::control(PacketKind::Ack, pkt.seq, peer), client)
                        .await?;
                    self.send(&reply, client).await?;
                }
                _ => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Faulty I/O
    // -----------------------------------------------------------------------

    /// Next packet that survives the fault model, or `None` after `wait`.
    async fn recv(&mut self, wait: Duration) -> Result<Option<(Packet, SocketAddr)>, SimError> {
        let deadline = Instant::now() + wait;
        loop {
            let (pkt, from) = match timeout_at(deadline, self.socket.recv_from()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Err(SocketError::Packet(e))) => {
                    log::debug!("[sim] discarding undecodable datagram: {e}");
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(v)) => v,
            };
            if pkt.kind == PacketKind::Syn {
                self.report.syns += 1;
            }
            if self.should_drop(true, &pkt) {
                log::debug!("[sim] ✗ dropped inbound {} seq={}", pkt.kind, pkt.seq);
                continue;
            }
            return Ok(Some((pkt, from)));
        }
    }

    async fn send(&mut self, pkt: &Packet, to: SocketAddr) -> Result<(), SimError> {
        if self.should_drop(false, pkt) {
            log::debug!("[sim] ✗ dropped outbound {} seq={}", pkt.kind, pkt.seq);
            return Ok(());
        }
        self.socket.send_to(pkt, to).await?;
        Ok(())
    }

    async fn send_syn_ack(&mut self, peer: SocketAddrV4, to: SocketAddr) -> Result<(), SimError> {
        let syn_ack = Packet::control(PacketKind::SynAck, INITIAL_SEQ + 1, peer);
        self.send(&syn_ack, to).await
    }

    async fn send_nak(&mut self, seq: u32, peer: SocketAddrV4, to: SocketAddr) -> Result<(), SimError> {
        self.report.naks_sent += 1;
        self.send(&Packet::control(PacketKind::Nak, seq, peer), to).await
    }

    fn should_drop(&mut self, inbound: bool, pkt: &Packet) -> bool {
        let once = if inbound {
            &mut self.config.drop_inbound_once
        } else {
            &mut self.config.drop_outbound_once
        };
        let drop = once.remove(&(pkt.kind, pkt.seq))
            || (self.config.loss_rate > 0.0 && self.rng.random_bool(self.config.loss_rate));
        if drop {
            self.report.dropped += 1;
        }
        drop
    }
}
