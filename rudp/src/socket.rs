//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Packet`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only byte I/O.
//!
//! A client socket is *connected* to the router with [`Socket::connect`];
//! every datagram then goes to the router regardless of which logical peer
//! the packet header names.  The unconnected `send_to` / `recv_from` pair is
//! what the router side (see [`crate::simulator`]) uses.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::packet::{Packet, PacketError, MAX_DATAGRAM};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The datagram could not be built or decoded.
    #[error(transparent)]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// UDP socket that sends and receives whole [`Packet`]s.
///
/// All methods are `&self` so the socket can be shared between the receive
/// loop and the retransmission task behind an `Arc`.  Each send hands one
/// whole datagram to the OS, so concurrent writers never interleave bytes.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Fix the default destination (the router) for [`send`](Self::send)
    /// and filter [`recv`](Self::recv) to datagrams from it.
    pub async fn connect(&self, router: impl ToSocketAddrs) -> Result<(), SocketError> {
        self.inner.connect(router).await?;
        Ok(())
    }

    /// Encode `packet` and send it to the connected router.
    pub async fn send(&self, packet: &Packet) -> Result<(), SocketError> {
        let bytes = packet.encode()?;
        self.send_bytes(&bytes).await
    }

    /// Send an already-encoded datagram to the connected router.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<(), SocketError> {
        self.inner.send(bytes).await?;
        Ok(())
    }

    /// Receive the next datagram from the connected router.
    pub async fn recv(&self) -> Result<Packet, SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.inner.recv(&mut buf).await?;
        Ok(Packet::decode(&buf[..n])?)
    }

    /// Encode `packet` and send it to `dest` (unconnected sockets only).
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        let bytes = packet.encode()?;
        self.inner.send_to(&bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram from anyone, with its source address.
    ///
    /// An undecodable datagram is an `Err`; the socket stays usable.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let packet = Packet::decode(&buf[..n])?;
        Ok((packet, addr))
    }
}
