//! Minimal HTTP/1.0 GET client towards the collector

use heapless::String;

use crate::error::{Error, Result};
use crate::model::HttpResponse;

pub const DEFAULT_PORT: u16 = 80;

/// Target of a request, borrowed from the URL string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Path and query, always starting with `/`
    pub path: &'a str,
}

impl<'a> Url<'a> {
    pub fn parse(url: &'a str) -> Result<Self> {
        let rest = url.strip_prefix("http://").ok_or(Error::InvalidUrl)?;
        let (authority, path) = match rest.find(['/', '?']) {
            Some(index) => rest.split_at(index),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| Error::InvalidUrl)?),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() || path.starts_with('?') {
            return Err(Error::InvalidUrl);
        }

        Ok(Self { host, port, path })
    }
}

/// Split a raw reply into status code and (possibly truncated) body
pub fn parse_response(raw: &[u8]) -> Result<HttpResponse> {
    let line_end = raw
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(Error::HttpResponse)?;
    let status_line = core::str::from_utf8(&raw[..line_end]).map_err(|_| Error::HttpResponse)?;

    let mut parts = status_line.split(' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(Error::HttpResponse);
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<i32>().ok())
        .ok_or(Error::HttpResponse)?;

    let mut body = String::new();
    if let Some(start) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        let bytes = &raw[start + 4..];
        let bytes = &bytes[..bytes.len().min(body.capacity())];
        let text = match core::str::from_utf8(bytes) {
            Ok(text) => text,
            // Cut at the last complete character
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        };
        let _ = body.push_str(text);
    }

    Ok(HttpResponse { status, body })
}

#[cfg(feature = "device")]
pub use client::HttpClient;

#[cfg(feature = "device")]
mod client {
    use core::fmt::Write;

    use embassy_net::{IpAddress, Ipv4Address, Stack, dns::DnsQueryType, tcp::TcpSocket};
    use embassy_time::Duration;
    use heapless::String;

    use super::{Url, parse_response};
    use crate::error::{Error, Result};
    use crate::model::HttpResponse;
    use crate::protocol::MAX_URL_LEN;
    use crate::traits::HttpTransport;

    const SOCKET_BUFFER: usize = 1024;
    const RESPONSE_MAX: usize = 1024;
    const SOCKET_TIMEOUT_SECS: u64 = 10;

    pub struct HttpClient {
        stack: Stack<'static>,
        rx_buffer: [u8; SOCKET_BUFFER],
        tx_buffer: [u8; SOCKET_BUFFER],
    }

    impl HttpClient {
        pub fn new(stack: Stack<'static>) -> Self {
            Self {
                stack,
                rx_buffer: [0; SOCKET_BUFFER],
                tx_buffer: [0; SOCKET_BUFFER],
            }
        }

        async fn resolve(&self, host: &str) -> Result<IpAddress> {
            if let Ok(address) = host.parse::<Ipv4Address>() {
                return Ok(IpAddress::Ipv4(address));
            }
            let addresses = self
                .stack
                .dns_query(host, DnsQueryType::A)
                .await
                .map_err(|_| Error::Dns)?;
            addresses.first().copied().ok_or(Error::Dns)
        }
    }

    impl HttpTransport for HttpClient {
        async fn get(&mut self, url: &str) -> Result<HttpResponse> {
            let target = Url::parse(url)?;
            let address = self.resolve(target.host).await?;

            let mut request: String<{ MAX_URL_LEN + 128 }> = String::new();
            write!(
                request,
                "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
                target.path, target.host
            )
            .map_err(|_| Error::UrlTooLong)?;

            let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer, &mut self.tx_buffer);
            socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));
            socket
                .connect((address, target.port))
                .await
                .map_err(|_| Error::ConnectionRefused)?;

            let mut pending = request.as_bytes();
            while !pending.is_empty() {
                match socket.write(pending).await {
                    Ok(0) | Err(_) => {
                        socket.abort();
                        return Err(Error::HttpSend);
                    }
                    Ok(n) => pending = &pending[n..],
                }
            }

            let mut response = [0u8; RESPONSE_MAX];
            let mut len = 0;
            while len < response.len() {
                match socket.read(&mut response[len..]).await {
                    Ok(0) => break,
                    Ok(n) => len += n,
                    Err(_) if len > 0 => break,
                    Err(_) => {
                        socket.abort();
                        return Err(Error::Timeout);
                    }
                }
            }
            socket.close();

            parse_response(&response[..len])
        }
    }
}
