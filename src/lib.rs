#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod connectivity;
pub mod credentials;
pub mod error;
pub mod http;
pub mod model;
pub mod protocol;
pub mod relay;
pub mod supervisor;
pub mod sx127x;
pub mod traits;

#[cfg(feature = "device")]
pub mod hardware;
#[cfg(feature = "device")]
pub mod wifi;
