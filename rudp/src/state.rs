//! Handshake finite-state-machine types.
//!
//! Transitions are implemented in [`crate::handshake`]; this module only
//! names the states so the connection layer and tests can refer to them.
//!
//! ```text
//!          start          valid SYN-ACK
//!   INIT ─────────▶ SYN_SENT ─────────▶ ESTABLISHED
//!                    │    ▲
//!                    └────┘
//!              timeout: resend SYN
//! ```

/// All possible states of the client-side handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Nothing sent yet.
    #[default]
    Init,
    /// SYN sent; waiting for a SYN-ACK carrying `initial + 1`.
    SynSent,
    /// SYN-ACK accepted and the final ACK sent; data may flow.
    Established,
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandshakeState::Init => "INIT",
            HandshakeState::SynSent => "SYN_SENT",
            HandshakeState::Established => "ESTABLISHED",
        };
        f.write_str(name)
    }
}
