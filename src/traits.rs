//! Hardware abstraction traits
//!
//! The relay and connectivity logic only see these seams, so they run the same
//! against the ESP32 drivers and against the fakes in the unit tests.

use crate::error::Result;
use crate::model::{ConnectivityStatus, Credentials, HttpResponse};

/// Packet source in the style of the Arduino LoRa API
pub trait RadioSource {
    /// Check for a completed reception; returns its length or 0
    fn parse_packet(&mut self) -> Result<usize>;

    /// Whether unread bytes remain in the current packet
    fn available(&mut self) -> Result<bool>;

    /// Read the next byte of the current packet
    fn read(&mut self) -> Result<u8>;
}

/// Station side of the network interface
#[allow(async_fn_in_trait)]
pub trait NetworkInterface {
    /// Start joining the network; does not wait for the association
    async fn begin(&mut self, credentials: &Credentials) -> Result<()>;

    /// Fresh link status query
    fn status(&mut self) -> ConnectivityStatus;
}

/// Request/response transport towards the collector
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    /// Issue a single GET for `url`
    async fn get(&mut self, url: &str) -> Result<HttpResponse>;
}

/// Byte-oriented serial console
#[allow(async_fn_in_trait)]
pub trait Console {
    /// Wait for the next received byte
    async fn read_byte(&mut self) -> Result<u8>;

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Interactive source of network credentials
#[allow(async_fn_in_trait)]
pub trait CredentialSource {
    /// Block until a network name and a secret have been entered
    async fn request(&mut self) -> Credentials;
}

/// Read-only view of whether the gateway can reach the collector right now
///
/// Every call must query the underlying interface; implementations do not cache.
pub trait ConnectivityCheck {
    fn status(&self) -> ConnectivityStatus;
}

impl<T: ConnectivityCheck + ?Sized> ConnectivityCheck for &T {
    fn status(&self) -> ConnectivityStatus {
        (**self).status()
    }
}
