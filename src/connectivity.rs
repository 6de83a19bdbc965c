//! Network join and retry state machine

use core::sync::atomic::{AtomicU8, Ordering};

use embedded_hal_async::delay::DelayNs;

use crate::config::GatewayConfig;
use crate::model::{ConnectivityStatus, Credentials};
use crate::traits::{ConnectivityCheck, CredentialSource, NetworkInterface};

const STATUS_DISCONNECTED: u8 = 0;
const STATUS_CONNECTED: u8 = 1;

/// Link status shared between the supervisor and the relay
///
/// Written only through [`ConnectivityManager`]; every read is a fresh load.
pub struct LinkState {
    status: AtomicU8,
}

impl LinkState {
    pub const fn new() -> Self {
        Self {
            status: AtomicU8::new(STATUS_DISCONNECTED),
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        match self.status.load(Ordering::Acquire) {
            STATUS_CONNECTED => ConnectivityStatus::Connected,
            _ => ConnectivityStatus::Disconnected,
        }
    }

    fn set(&self, status: ConnectivityStatus) {
        let raw = match status {
            ConnectivityStatus::Connected => STATUS_CONNECTED,
            ConnectivityStatus::Disconnected => STATUS_DISCONNECTED,
        };
        self.status.store(raw, Ordering::Release);
    }
}

/// Last status published by the manager
impl ConnectivityCheck for LinkState {
    fn status(&self) -> ConnectivityStatus {
        LinkState::status(self)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

/// How many join rounds to try before giving up
///
/// `Forever` keeps re-prompting for credentials with no backoff and no escape.
/// On a gateway with nobody at the console that blocks the calling task for
/// good, which is the intended field behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Forever,
    Rounds(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    GaveUp,
}

/// Owns the credentials and drives the network interface until it is joined
pub struct ConnectivityManager<'a, N, C, D> {
    net: N,
    prompt: C,
    delay: D,
    link: &'a LinkState,
    credentials: Option<Credentials>,
    poll_interval_ms: u32,
    polls: u32,
    retry: RetryPolicy,
}

impl<'a, N, C, D> ConnectivityManager<'a, N, C, D>
where
    N: NetworkInterface,
    C: CredentialSource,
    D: DelayNs,
{
    pub fn new(net: N, prompt: C, delay: D, link: &'a LinkState, config: &GatewayConfig) -> Self {
        Self {
            net,
            prompt,
            delay,
            link,
            credentials: None,
            poll_interval_ms: config.connect_poll_interval_ms,
            polls: config.connect_polls(),
            retry: config.retry,
        }
    }

    /// Acquire the first credentials and join the network
    pub async fn establish(&mut self) -> ConnectOutcome {
        self.reacquire_credentials().await;
        self.connect().await
    }

    /// Join the network, re-prompting for credentials after every timed out round
    pub async fn connect(&mut self) -> ConnectOutcome {
        let mut round: u32 = 0;
        loop {
            round = round.saturating_add(1);

            if self.credentials.is_none() {
                self.reacquire_credentials().await;
            }

            if self.attempt().await {
                self.link.set(ConnectivityStatus::Connected);
                log::info!("[WIFI] Connected");
                return ConnectOutcome::Connected;
            }

            self.link.set(ConnectivityStatus::Disconnected);

            if let RetryPolicy::Rounds(max) = self.retry {
                if round >= max {
                    log::error!("[WIFI] Giving up after {} rounds", round);
                    return ConnectOutcome::GaveUp;
                }
            }

            log::warn!("[WIFI] Connection failed, requesting network credentials again");
            self.reacquire_credentials().await;
        }
    }

    /// Query the interface and publish the result
    pub fn refresh(&mut self) -> ConnectivityStatus {
        let status = self.net.status();
        self.link.set(status);
        status
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// One join round: begin, then poll until connected or the timeout runs out
    async fn attempt(&mut self) -> bool {
        let Some(credentials) = self.credentials.as_ref() else {
            return false;
        };

        log::info!("[WIFI] Connecting to {}", credentials.network_name.as_str());
        if let Err(e) = self.net.begin(credentials).await {
            log::error!("[WIFI] Join request failed: {}", e);
            return false;
        }

        for _ in 0..self.polls {
            if self.net.status().is_connected() {
                return true;
            }
            self.delay.delay_ms(self.poll_interval_ms).await;
            log::debug!("[WIFI] .");
        }

        self.net.status().is_connected()
    }

    async fn reacquire_credentials(&mut self) {
        let credentials = self.prompt.request().await;
        log::debug!("[WIFI] Credentials received for {}", credentials.network_name.as_str());
        self.credentials = Some(credentials);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use embassy_futures::block_on;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Delay that returns immediately and accumulates the requested time
    #[derive(Clone, Default)]
    pub(crate) struct FakeDelay {
        pub(crate) elapsed_ms: Rc<Cell<u64>>,
    }

    impl DelayNs for FakeDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.elapsed_ms.set(self.elapsed_ms.get() + u64::from(ns) / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.elapsed_ms.set(self.elapsed_ms.get() + u64::from(ms));
        }
    }

    /// Interface that joins once it has seen `joins_after` status polls
    /// with the accepted network name
    #[derive(Clone, Default)]
    pub(crate) struct FakeNet {
        pub(crate) accept: Rc<RefCell<Option<&'static str>>>,
        pub(crate) joins_after: u32,
        pub(crate) begins: Rc<RefCell<Vec<String>>>,
        pub(crate) polls: Rc<Cell<u32>>,
        pub(crate) connected: Rc<Cell<bool>>,
        pub(crate) fail_begin: bool,
        pub(crate) current: Rc<RefCell<Option<String>>>,
    }

    impl NetworkInterface for FakeNet {
        async fn begin(&mut self, credentials: &Credentials) -> Result<()> {
            if self.fail_begin {
                return Err(Error::Network);
            }
            let name = String::from(credentials.network_name.as_str());
            self.begins.borrow_mut().push(name.clone());
            *self.current.borrow_mut() = Some(name);
            self.polls.set(0);
            self.connected.set(false);
            Ok(())
        }

        fn status(&mut self) -> ConnectivityStatus {
            let accepted = match (&*self.current.borrow(), *self.accept.borrow()) {
                (Some(current), Some(accept)) => current == accept,
                _ => false,
            };
            if accepted && !self.connected.get() {
                self.polls.set(self.polls.get() + 1);
                if self.polls.get() > self.joins_after {
                    self.connected.set(true);
                }
            }
            if self.connected.get() {
                ConnectivityStatus::Connected
            } else {
                ConnectivityStatus::Disconnected
            }
        }
    }

    /// Side-effect free view of the association, as a task on the other core sees it
    impl ConnectivityCheck for FakeNet {
        fn status(&self) -> ConnectivityStatus {
            if self.connected.get() {
                ConnectivityStatus::Connected
            } else {
                ConnectivityStatus::Disconnected
            }
        }
    }

    /// Prompt that replays scripted answers, repeating the last one
    #[derive(Clone)]
    pub(crate) struct ScriptedPrompt {
        pub(crate) answers: Rc<RefCell<VecDeque<&'static str>>>,
        pub(crate) requests: Rc<Cell<u32>>,
        last: Rc<Cell<&'static str>>,
    }

    impl ScriptedPrompt {
        pub(crate) fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: Rc::new(RefCell::new(answers.iter().copied().collect())),
                requests: Rc::new(Cell::new(0)),
                last: Rc::new(Cell::new("")),
            }
        }
    }

    impl CredentialSource for ScriptedPrompt {
        async fn request(&mut self) -> Credentials {
            self.requests.set(self.requests.get() + 1);
            let name = self.answers.borrow_mut().pop_front().unwrap_or(self.last.get());
            self.last.set(name);
            Credentials::new(name, "secret").unwrap()
        }
    }

    fn config(retry: RetryPolicy) -> GatewayConfig {
        GatewayConfig {
            retry,
            ..GatewayConfig::from_env()
        }
    }

    #[test]
    fn connects_within_timeout() {
        let link = LinkState::new();
        let net = FakeNet {
            accept: Rc::new(RefCell::new(Some("home"))),
            joins_after: 3,
            ..FakeNet::default()
        };
        let prompt = ScriptedPrompt::new(&["home"]);
        let delay = FakeDelay::default();
        let mut manager = ConnectivityManager::new(
            net.clone(),
            prompt.clone(),
            delay.clone(),
            &link,
            &config(RetryPolicy::Forever),
        );

        assert_eq!(block_on(manager.establish()), ConnectOutcome::Connected);
        assert_eq!(link.status(), ConnectivityStatus::Connected);
        assert_eq!(prompt.requests.get(), 1);
        assert_eq!(delay.elapsed_ms.get(), 1_500);
    }

    #[test]
    fn timeout_reprompts_and_retries() {
        let link = LinkState::new();
        let net = FakeNet {
            accept: Rc::new(RefCell::new(Some("right"))),
            ..FakeNet::default()
        };
        let prompt = ScriptedPrompt::new(&["wrong", "also-wrong", "right"]);
        let delay = FakeDelay::default();
        let mut manager = ConnectivityManager::new(
            net.clone(),
            prompt.clone(),
            delay.clone(),
            &link,
            &config(RetryPolicy::Forever),
        );

        assert_eq!(block_on(manager.establish()), ConnectOutcome::Connected);
        assert_eq!(prompt.requests.get(), 3);
        assert_eq!(*net.begins.borrow(), ["wrong", "also-wrong", "right"]);
        // Two full 5 s rounds before the good one.
        assert_eq!(delay.elapsed_ms.get(), 10_000);
        assert_eq!(manager.credentials().unwrap().network_name.as_str(), "right");
    }

    #[test]
    fn capped_policy_gives_up() {
        let link = LinkState::new();
        let net = FakeNet::default();
        let prompt = ScriptedPrompt::new(&["nowhere"]);
        let mut manager = ConnectivityManager::new(
            net.clone(),
            prompt.clone(),
            FakeDelay::default(),
            &link,
            &config(RetryPolicy::Rounds(3)),
        );

        assert_eq!(block_on(manager.establish()), ConnectOutcome::GaveUp);
        assert_eq!(net.begins.borrow().len(), 3);
        // Initial prompt plus one re-prompt between each failed round.
        assert_eq!(prompt.requests.get(), 3);
        assert_eq!(link.status(), ConnectivityStatus::Disconnected);
    }

    #[test]
    fn begin_error_counts_as_failed_round() {
        let link = LinkState::new();
        let net = FakeNet {
            fail_begin: true,
            ..FakeNet::default()
        };
        let prompt = ScriptedPrompt::new(&["home"]);
        let delay = FakeDelay::default();
        let mut manager = ConnectivityManager::new(
            net,
            prompt.clone(),
            delay.clone(),
            &link,
            &config(RetryPolicy::Rounds(2)),
        );

        assert_eq!(block_on(manager.establish()), ConnectOutcome::GaveUp);
        assert_eq!(prompt.requests.get(), 2);
        assert_eq!(delay.elapsed_ms.get(), 0);
    }

    #[test]
    fn refresh_publishes_fresh_status() {
        let link = LinkState::new();
        let net = FakeNet {
            accept: Rc::new(RefCell::new(Some("home"))),
            ..FakeNet::default()
        };
        let mut manager = ConnectivityManager::new(
            net.clone(),
            ScriptedPrompt::new(&["home"]),
            FakeDelay::default(),
            &link,
            &config(RetryPolicy::Forever),
        );

        block_on(manager.establish());
        assert_eq!(link.status(), ConnectivityStatus::Connected);

        net.connected.set(false);
        *net.accept.borrow_mut() = None;
        assert_eq!(manager.refresh(), ConnectivityStatus::Disconnected);
        assert_eq!(link.status(), ConnectivityStatus::Disconnected);
    }
}
