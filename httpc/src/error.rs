use rudp::ConnError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpcError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Network error: {0}")]
    Io(std::io::Error),
    #[error(transparent)]
    Transport(#[from] ConnError),
    #[error("Timeout")]
    Timeout,
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Bad status line: {0}")]
    BadStatusLine(String),
    #[error("Bad redirect URI in Location header")]
    BadRedirect,
    #[error("Exceeded {0} redirects")]
    TooManyRedirects(usize),
}

impl From<std::io::Error> for HttpcError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            HttpcError::Timeout
        } else {
            HttpcError::Io(err)
        }
    }
}

impl From<tokio::time::error::Elapsed> for HttpcError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HttpcError::Timeout
    }
}

impl From<rudp::PacketError> for HttpcError {
    fn from(err: rudp::PacketError) -> Self {
        HttpcError::Transport(ConnError::Packet(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_io_error_becomes_timeout() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(HttpcError::from(err), HttpcError::Timeout));
    }

    #[test]
    fn other_io_errors_are_kept() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        match HttpcError::from(err) {
            HttpcError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn bad_peer_address_is_a_transport_error() {
        let err = rudp::parse_peer_host("example.com").unwrap_err();
        assert!(matches!(
            HttpcError::from(err),
            HttpcError::Transport(ConnError::Packet(rudp::PacketError::BadAddress(_)))
        ));
    }
}
