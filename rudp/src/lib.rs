//! `rudp` — reliable request/response delivery over UDP through a router.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  fragments   ┌──────────┐  forwards by header  ┌──────┐
//!  │  Connection  │─────────────▶│  Router  │─────────────────────▶│ Peer │
//!  └──┬────────┬──┘              └──────────┘                      └──────┘
//!     │        │ ACK/NAK notices (bounded, try_send)
//!     │   ┌────▼──────────┐
//!     │   │ Retransmitter │  (tokio task, re-sends NAK'd fragments)
//!     │   └────┬──────────┘
//!     │        │
//!  ┌──▼────────▼───────────────────────┐
//!  │        Arc<Socket>                │  (connected to the router)
//!  └───────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire format (serialise / deserialise)
//! - [`segmenter`]   — payload → numbered DATA fragments
//! - [`state`]       — handshake finite-state-machine types
//! - [`handshake`]   — SYN / SYN-ACK / ACK exchange with bounded retries
//! - [`retransmit`]  — background re-sending driven by ACK/NAK notices
//! - [`session`]     — receive-side ordering, NAK generation, reassembly
//! - [`connection`]  — one request: handshake, send, receive loop
//! - [`config`]      — timeouts and retry bounds
//! - [`socket`]      — async UDP socket abstraction
//! - [`simulator`]   — lossy router + peer for exercising the above

pub mod config;
pub mod connection;
pub mod handshake;
pub mod packet;
pub mod retransmit;
pub mod segmenter;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;

pub use config::ConnConfig;
pub use connection::{ConnError, Connection, ResponseMode};
pub use packet::{parse_peer_host, Packet, PacketError, PacketKind};
