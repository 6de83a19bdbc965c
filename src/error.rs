//! Error types for the gateway

use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// SPI transfer with the radio failed
    #[error("radio SPI transfer failed")]
    Spi,

    /// Radio answered with an unexpected silicon version
    #[error("unexpected radio version 0x{0:02X}")]
    RadioVersion(u8),

    /// Serial console read or write failed
    #[error("console I/O error")]
    Console,

    /// Network interface refused the station configuration or start
    #[error("network interface error")]
    Network,

    /// Credential does not fit its bounded buffer
    #[error("credential too long")]
    CredentialTooLong,

    /// Forward URL does not fit its bounded buffer
    #[error("forward URL too long")]
    UrlTooLong,

    /// Collector URL is not of the form http://host[:port]/path
    #[error("invalid collector URL")]
    InvalidUrl,

    /// Host name could not be resolved
    #[error("DNS lookup failed")]
    Dns,

    /// TCP connection to the collector could not be opened
    #[error("connection refused")]
    ConnectionRefused,

    /// Socket write failed mid-request
    #[error("HTTP send failed")]
    HttpSend,

    /// Response did not start with a parsable status line
    #[error("malformed HTTP response")]
    HttpResponse,

    /// No reply before the socket timeout
    #[error("operation timed out")]
    Timeout,
}
