// Model of the data flowing through the gateway

use heapless::{String, Vec};

use crate::error::{Error, Result};

/// SX127x FIFO payload limit
pub const MAX_PACKET_LEN: usize = 255;
pub const NETWORK_NAME_MAX: usize = 32;
pub const SECRET_MAX: usize = 64;

/// One radio reception, drained from the transceiver FIFO
pub type RawPacket = Vec<u8, MAX_PACKET_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Disconnected,
    Connected,
}

impl ConnectivityStatus {
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Usable only once the link is associated and an address is configured
    pub const fn from_stack(link_up: bool, config_up: bool) -> Self {
        if link_up && config_up {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

/// Network name and secret for the station interface
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub network_name: String<NETWORK_NAME_MAX>,
    pub secret: String<SECRET_MAX>,
}

impl Credentials {
    pub fn new(network_name: &str, secret: &str) -> Result<Self> {
        Ok(Self {
            network_name: String::try_from(network_name).map_err(|_| Error::CredentialTooLong)?,
            secret: String::try_from(secret).map_err(|_| Error::CredentialTooLong)?,
        })
    }
}

// Keep the secret out of logs.
impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("network_name", &self.network_name)
            .field("secret", &"***")
            .finish()
    }
}

/// A validated sensor reading, borrowed from the packet it was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorFrame<'a> {
    pub receiver_id: &'a str,
    pub temperature: &'a str,
    pub humidity: &'a str,
    pub light_state: &'a str,
}

/// Reply of the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: i32,
    pub body: String<256>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn associated_without_address_is_not_connected() {
        assert_eq!(
            ConnectivityStatus::from_stack(true, false),
            ConnectivityStatus::Disconnected
        );
        assert_eq!(
            ConnectivityStatus::from_stack(false, true),
            ConnectivityStatus::Disconnected
        );
        assert_eq!(
            ConnectivityStatus::from_stack(true, true),
            ConnectivityStatus::Connected
        );
    }

    #[test]
    fn credentials_enforce_limits() {
        assert!(Credentials::new("home", "hunter22").is_ok());

        let long_name = "n".repeat(NETWORK_NAME_MAX + 1);
        assert_eq!(
            Credentials::new(&long_name, "x").unwrap_err(),
            Error::CredentialTooLong
        );

        let long_secret = "s".repeat(SECRET_MAX + 1);
        assert_eq!(
            Credentials::new("home", &long_secret).unwrap_err(),
            Error::CredentialTooLong
        );
    }

    #[test]
    fn debug_hides_secret() {
        let creds = Credentials::new("home", "hunter22").unwrap();
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("home"));
        assert!(!rendered.contains("hunter22"));
    }
}
