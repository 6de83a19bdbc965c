//! Station interface on the ESP32 WiFi radio

use embassy_net::Stack;
use embassy_time::{Duration, TimeoutError, with_timeout};
use esp_radio::wifi::{AuthMethod, ClientConfig, ModeConfig, WifiController};

use crate::error::{Error, Result};
use crate::model::{ConnectivityStatus, Credentials};
use crate::traits::{ConnectivityCheck, NetworkInterface};

const BEGIN_WAIT_MS: u64 = 500;

pub struct StationLink {
    controller: WifiController<'static>,
}

impl StationLink {
    pub fn new(controller: WifiController<'static>) -> Self {
        Self { controller }
    }
}

impl NetworkInterface for StationLink {
    async fn begin(&mut self, credentials: &Credentials) -> Result<()> {
        if matches!(self.controller.is_connected(), Ok(true)) {
            let _ = self.controller.disconnect_async().await;
        }

        let auth_method = if credentials.secret.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::Wpa2Personal
        };
        let client = ClientConfig::default()
            .with_ssid(credentials.network_name.as_str().into())
            .with_password(credentials.secret.as_str().into())
            .with_auth_method(auth_method);

        self.controller
            .set_config(&ModeConfig::Client(client))
            .map_err(|e| {
                log::error!("[WIFI] Station config rejected: {:?}", e);
                Error::Network
            })?;

        if !matches!(self.controller.is_started(), Ok(true)) {
            self.controller.start_async().await.map_err(|e| {
                log::error!("[WIFI] Start failed: {:?}", e);
                Error::Network
            })?;
        }

        // Association keeps running past this wait; the caller polls status().
        let wait = Duration::from_millis(BEGIN_WAIT_MS);
        match with_timeout(wait, self.controller.connect_async()).await {
            Ok(Ok(())) | Err(TimeoutError) => Ok(()),
            Ok(Err(e)) => {
                log::warn!("[WIFI] Association rejected: {:?}", e);
                Err(Error::Network)
            }
        }
    }

    fn status(&mut self) -> ConnectivityStatus {
        match self.controller.is_connected() {
            Ok(true) => ConnectivityStatus::Connected,
            _ => ConnectivityStatus::Disconnected,
        }
    }
}

/// Fresh readiness of the station as seen by the IP stack
///
/// Connected only once the WiFi link is up and DHCP has configured an address.
#[derive(Clone, Copy)]
pub struct StackStatus {
    stack: Stack<'static>,
}

impl StackStatus {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl ConnectivityCheck for StackStatus {
    fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus::from_stack(self.stack.is_link_up(), self.stack.is_config_up())
    }
}
