//! Receive, parse and forward pipeline (hardware-independent)

use embedded_hal_async::delay::DelayNs;

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::model::RawPacket;
use crate::protocol::{self, ForwardRequest, Rejected};
use crate::traits::{ConnectivityCheck, HttpTransport, RadioSource};

/// Received packets between two summary lines
const STATS_LOG_EVERY: u32 = 50;

/// What one pipeline iteration did with the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Nothing received
    Idle,
    /// Dropped by the framing protocol
    Rejected(Rejected),
    /// Valid frame, but the station is not joined
    Offline,
    /// Collector answered with this status code
    Delivered(i32),
    /// Request could not be completed
    Failed(Error),
}

/// Running counters of the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u32,
    pub forwarded: u32,
    pub rejected: u32,
    pub offline: u32,
    pub failed: u32,
}

impl RelayStats {
    fn record(&mut self, outcome: &RelayOutcome) {
        match outcome {
            RelayOutcome::Idle => return,
            RelayOutcome::Rejected(_) => self.rejected += 1,
            RelayOutcome::Offline => self.offline += 1,
            RelayOutcome::Delivered(_) => self.forwarded += 1,
            RelayOutcome::Failed(_) => self.failed += 1,
        }
        self.received += 1;
    }
}

pub struct RelayPipeline<R, H, P, D> {
    radio: R,
    http: H,
    connectivity: P,
    delay: D,
    receiver_id: &'static str,
    collector_url: &'static str,
    poll_interval_ms: u32,
    stats: RelayStats,
}

impl<R, H, P, D> RelayPipeline<R, H, P, D>
where
    R: RadioSource,
    H: HttpTransport,
    P: ConnectivityCheck,
    D: DelayNs,
{
    /// `connectivity` is queried before every forward
    pub fn new(radio: R, http: H, connectivity: P, delay: D, config: &GatewayConfig) -> Self {
        Self {
            radio,
            http,
            connectivity,
            delay,
            receiver_id: config.receiver_id,
            collector_url: config.collector_url,
            poll_interval_ms: config.relay_poll_interval_ms,
            stats: RelayStats::default(),
        }
    }

    /// One iteration: poll, drain, parse, forward, then wait one poll interval
    pub async fn step(&mut self) -> RelayOutcome {
        let outcome = match self.receive() {
            Ok(Some(packet)) => self.relay(&packet).await,
            Ok(None) => RelayOutcome::Idle,
            Err(e) => {
                log::warn!("[LORA] Receive failed: {}", e);
                RelayOutcome::Idle
            }
        };

        self.stats.record(&outcome);
        if outcome != RelayOutcome::Idle && self.stats.received % STATS_LOG_EVERY == 0 {
            log::info!("[RELAY] {:?}", self.stats);
        }

        self.delay.delay_ms(self.poll_interval_ms).await;
        outcome
    }

    pub async fn run(mut self) -> ! {
        log::info!("[RELAY] Listening for receiver id {}", self.receiver_id);
        loop {
            self.step().await;
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    fn receive(&mut self) -> Result<Option<RawPacket>> {
        if self.radio.parse_packet()? == 0 {
            return Ok(None);
        }

        let mut packet = RawPacket::new();
        while self.radio.available()? {
            let byte = self.radio.read()?;
            // Anything past the FIFO size cannot be a valid frame; drop the tail.
            let _ = packet.push(byte);
        }
        Ok(Some(packet))
    }

    async fn relay(&mut self, packet: &[u8]) -> RelayOutcome {
        log::info!(
            "[LORA] Received: {}",
            core::str::from_utf8(packet).unwrap_or("<binary>")
        );

        let frame = match protocol::parse(packet, self.receiver_id) {
            Ok(frame) => frame,
            Err(Rejected::UnrecognizedSender) => {
                log::debug!("[RELAY] Not addressed to {}, ignoring", self.receiver_id);
                return RelayOutcome::Rejected(Rejected::UnrecognizedSender);
            }
            Err(Rejected::Malformed) => {
                log::warn!("[RELAY] Invalid frame format");
                return RelayOutcome::Rejected(Rejected::Malformed);
            }
        };
        log::debug!("[RELAY] Valid receiver id detected");

        if !self.connectivity.status().is_connected() {
            log::warn!("[RELAY] Cannot send data: WiFi not connected");
            return RelayOutcome::Offline;
        }

        let request = match ForwardRequest::build(self.collector_url, &frame) {
            Ok(request) => request,
            Err(e) => {
                log::error!("[RELAY] {}", e);
                return RelayOutcome::Failed(e);
            }
        };

        match self.http.get(request.url()).await {
            Ok(response) if response.status > 0 => {
                log::info!("[RELAY] Data sent to server ({})", response.status);
                log::info!("[RELAY] {}", response.body.as_str());
                RelayOutcome::Delivered(response.status)
            }
            Ok(response) => {
                log::error!("[RELAY] Error sending data to server ({})", response.status);
                RelayOutcome::Failed(Error::HttpResponse)
            }
            Err(e) => {
                log::error!("[RELAY] Error sending data to server: {}", e);
                RelayOutcome::Failed(e)
            }
        }
    }
}
