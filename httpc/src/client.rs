use crate::config::ClientConfig;
use crate::error::HttpcError;
use crate::redirect::follow_redirects;
use crate::request::{format_get, format_post, Headers};
use crate::response::Response;
use crate::{tcp, udp};
use rudp::ResponseMode;
use url::Url;

/// Which socket type carries requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transport {
    #[default]
    Tcp,
    /// `rudp` through the configured router.
    Udp,
}

/// HTTP/1.0 client over either transport.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Transport,
}

impl Client {
    pub fn new(config: ClientConfig, transport: Transport) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// GET `url`, following 301–303 redirects up to the configured cap.
    pub async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpcError> {
        let url = parse_url(url)?;
        let first = self.fetch(&url, headers).await?;
        follow_redirects(url, first, self.config.max_redirects, |next| async move {
            self.fetch(&next, headers).await
        })
        .await
    }

    /// POST `body` to `url`. Redirects are returned to the caller as-is.
    pub async fn post(
        &self,
        url: &str,
        headers: &Headers,
        body: &[u8],
    ) -> Result<Response, HttpcError> {
        let url = parse_url(url)?;
        let request = format_post(&url, headers, body);
        let raw = self.roundtrip(&url, &request, ResponseMode::SingleFragment).await?;
        Response::parse(&raw)
    }

    async fn fetch(&self, url: &Url, headers: &Headers) -> Result<Response, HttpcError> {
        let request = format_get(url, headers);
        let raw = self.roundtrip(url, &request, ResponseMode::Segmented).await?;
        Response::parse(&raw)
    }

    async fn roundtrip(
        &self,
        url: &Url,
        request: &[u8],
        mode: ResponseMode,
    ) -> Result<Vec<u8>, HttpcError> {
        match self.transport {
            Transport::Tcp => tcp::send(url, request, self.config.tcp_timeout).await,
            Transport::Udp => {
                let router = self.config.router_addr();
                udp::send(&router, url, request, mode, &self.config.transport).await
            }
        }
    }
}

/// Parse an absolute `http://` URL with a host.
pub fn parse_url(input: &str) -> Result<Url, HttpcError> {
    let url = Url::parse(input)?;
    if url.scheme() != "http" {
        return Err(HttpcError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(url::ParseError::EmptyHost.into());
    }
    Ok(url)
}
