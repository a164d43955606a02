//! Timeouts and retry bounds for one request exchange.

use std::time::Duration;

/// Adjustable transport parameters.
///
/// The defaults match what peers on the router network expect: a 2 s SYN
/// retry interval and a 5 s idle window while waiting for a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    /// How long to wait for a SYN-ACK before sending the SYN again.
    pub handshake_timeout: Duration,
    /// SYNs sent before giving up with `HandshakeFailed`.
    pub max_handshake_attempts: u32,
    /// Deadline of every read once data is flowing.
    pub read_timeout: Duration,
    /// Consecutive reads that may end in a timeout or I/O error before the
    /// exchange fails with `RetriesExhausted`.
    pub max_idle_rounds: u32,
    /// Capacity of the receive-loop → retransmitter notice channel.
    pub notice_capacity: usize,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(2),
            max_handshake_attempts: 10,
            read_timeout: Duration::from_secs(5),
            max_idle_rounds: 6,
            notice_capacity: 64,
        }
    }
}
