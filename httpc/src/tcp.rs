//! Stream backend: one request per TCP connection, response read until close.

use crate::error::HttpcError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use url::Url;

/// Port used when the URL has none.
pub const HTTP_PORT: u16 = 80;

/// Connect attempts on transient errors.
const CONNECT_RETRIES: u32 = 3;

/// Returns true if the error is likely transient (retry may succeed).
fn is_transient_io_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::ConnectionReset
    )
}

/// `host:port` of the server named by `url`.
pub fn server_addr(url: &Url) -> Result<String, HttpcError> {
    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    Ok(format!("{host}:{}", url.port().unwrap_or(HTTP_PORT)))
}

/// Send `request` to the server named by `url` and read until it closes.
/// The whole exchange shares one deadline.
pub async fn send(url: &Url, request: &[u8], deadline: Duration) -> Result<Vec<u8>, HttpcError> {
    let addr = server_addr(url)?;
    let deadline = Instant::now() + deadline;

    let mut stream = connect(&addr, deadline).await?;
    log::debug!("[httpc] tcp → {addr}: {} byte(s)", request.len());

    timeout_at(deadline, stream.write_all(request)).await??;
    timeout_at(deadline, stream.flush()).await??;

    let mut response = Vec::new();
    timeout_at(deadline, stream.read_to_end(&mut response)).await??;
    log::debug!("[httpc] tcp ← {addr}: {} byte(s)", response.len());
    Ok(response)
}

async fn connect(addr: &str, deadline: Instant) -> Result<TcpStream, HttpcError> {
    let mut last_err = None;
    for _ in 0..CONNECT_RETRIES {
        match timeout_at(deadline, TcpStream::connect(addr)).await? {
            Ok(stream) => return Ok(stream),
            Err(e) if is_transient_io_error(&e) => {
                log::debug!("[httpc] tcp connect to {addr}: {e}; retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_err.map_or(HttpcError::Timeout, HttpcError::from))
}
