//! Datagram backend: requests carried by `rudp` through the router.

use crate::error::HttpcError;
use crate::tcp::HTTP_PORT;
use rudp::{parse_peer_host, ConnConfig, Connection, ResponseMode};
use std::net::SocketAddrV4;
use url::Url;

/// Logical peer named by `url`: a dotted-quad host and its port.
pub fn peer_addr(url: &Url) -> Result<SocketAddrV4, HttpcError> {
    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    let ip = parse_peer_host(host)?;
    Ok(SocketAddrV4::new(ip, url.port().unwrap_or(HTTP_PORT)))
}

/// Send `request` to the peer named by `url` through `router`.
pub async fn send(
    router: &str,
    url: &Url,
    request: &[u8],
    mode: ResponseMode,
    config: &ConnConfig,
) -> Result<Vec<u8>, HttpcError> {
    let peer = peer_addr(url)?;
    let conn = Connection::open(router, peer, config.clone()).await?;
    log::debug!(
        "[httpc] udp → {peer} via {router} ({} byte(s), {mode:?})",
        request.len()
    );
    let response = conn.exchange(request, mode).await?;
    log::debug!("[httpc] udp ← {peer}: {} byte(s)", response.len());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudp::{ConnError, PacketError};

    #[test]
    fn peer_from_dotted_quad_url() {
        let url = Url::parse("http://192.168.2.3:8007/get").unwrap();
        assert_eq!(peer_addr(&url).unwrap(), "192.168.2.3:8007".parse().unwrap());
        let url = Url::parse("http://10.0.0.1/").unwrap();
        assert_eq!(peer_addr(&url).unwrap().port(), 80);
    }

    #[test]
    fn hostname_peer_is_rejected() {
        let url = Url::parse("http://localhost:8007/").unwrap();
        assert!(matches!(
            peer_addr(&url),
            Err(HttpcError::Transport(ConnError::Packet(PacketError::BadAddress(_))))
        ));
    }
}
