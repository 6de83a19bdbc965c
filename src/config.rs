//! Gateway configuration
//!
//! Defaults reproduce the field deployment. The receiver id and collector URL
//! can be overridden at build time:
//!
//! ```text
//! LORABRIDGE_RECEIVER_ID=4711 LORABRIDGE_COLLECTOR_URL=http://10.0.0.2/ingest cargo build ...
//! ```

use crate::connectivity::RetryPolicy;

pub const DEFAULT_RECEIVER_ID: &str = "9525";
pub const DEFAULT_COLLECTOR_URL: &str = "http://192.168.2.101/esp32/guardar_datos.php";

const RELAY_POLL_INTERVAL_MS: u32 = 1_000;
const RECONNECT_INTERVAL_MS: u32 = 10_000;
const CONNECT_TIMEOUT_MS: u32 = 5_000;
const CONNECT_POLL_INTERVAL_MS: u32 = 500;

/// Radio wiring and carrier for the TTGO LoRa32 board
pub mod radio {
    pub const FREQUENCY_HZ: u32 = 915_000_000;
    pub const SPI_FREQ_KHZ: u32 = 8_000;
    // SCK 5, MISO 19, MOSI 27, NSS 18, RST 14, DIO0 26
}

/// Runtime configuration shared by the bootstrap and both tasks
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub receiver_id: &'static str,
    pub collector_url: &'static str,
    pub relay_poll_interval_ms: u32,
    pub reconnect_interval_ms: u32,
    pub connect_timeout_ms: u32,
    pub connect_poll_interval_ms: u32,
    pub retry: RetryPolicy,
}

impl GatewayConfig {
    /// Defaults, with build time overrides applied
    pub const fn from_env() -> Self {
        let receiver_id = match option_env!("LORABRIDGE_RECEIVER_ID") {
            Some(id) => id,
            None => DEFAULT_RECEIVER_ID,
        };
        let collector_url = match option_env!("LORABRIDGE_COLLECTOR_URL") {
            Some(url) => url,
            None => DEFAULT_COLLECTOR_URL,
        };

        Self {
            receiver_id,
            collector_url,
            relay_poll_interval_ms: RELAY_POLL_INTERVAL_MS,
            reconnect_interval_ms: RECONNECT_INTERVAL_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            connect_poll_interval_ms: CONNECT_POLL_INTERVAL_MS,
            retry: RetryPolicy::Forever,
        }
    }

    /// Number of status polls that fit in the connect timeout
    pub const fn connect_polls(&self) -> u32 {
        if self.connect_poll_interval_ms == 0 {
            return 1;
        }
        self.connect_timeout_ms.div_ceil(self.connect_poll_interval_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_timing() {
        let config = GatewayConfig {
            receiver_id: DEFAULT_RECEIVER_ID,
            collector_url: DEFAULT_COLLECTOR_URL,
            ..GatewayConfig::from_env()
        };
        assert_eq!(config.relay_poll_interval_ms, 1_000);
        assert_eq!(config.reconnect_interval_ms, 10_000);
        assert_eq!(config.connect_polls(), 10);
        assert_eq!(config.retry, RetryPolicy::Forever);
    }

    #[test]
    fn zero_poll_interval_polls_once() {
        let config = GatewayConfig {
            connect_poll_interval_ms: 0,
            ..GatewayConfig::from_env()
        };
        assert_eq!(config.connect_polls(), 1);
    }
}
