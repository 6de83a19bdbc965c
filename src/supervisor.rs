//! Background task keeping the station joined

use embedded_hal_async::delay::DelayNs;

use crate::connectivity::{ConnectOutcome, ConnectivityManager};
use crate::traits::{CredentialSource, NetworkInterface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    IdleWait,
    Reconnecting,
}

pub struct Supervisor<'a, N, C, D, T> {
    manager: ConnectivityManager<'a, N, C, D>,
    timer: T,
    interval_ms: u32,
    state: SupervisorState,
    reconnects: u32,
}

impl<'a, N, C, D, T> Supervisor<'a, N, C, D, T>
where
    N: NetworkInterface,
    C: CredentialSource,
    D: DelayNs,
    T: DelayNs,
{
    pub fn new(manager: ConnectivityManager<'a, N, C, D>, timer: T, interval_ms: u32) -> Self {
        Self {
            manager,
            timer,
            interval_ms,
            state: SupervisorState::IdleWait,
            reconnects: 0,
        }
    }

    /// Check the link, reconnect if it dropped, then wait one interval
    pub async fn tick(&mut self) -> Option<ConnectOutcome> {
        let mut outcome = None;

        if !self.manager.refresh().is_connected() {
            log::warn!("[SUPERVISOR] WiFi disconnected, reconnecting...");
            self.state = SupervisorState::Reconnecting;
            self.reconnects = self.reconnects.wrapping_add(1);
            outcome = Some(self.manager.connect().await);
            self.state = SupervisorState::IdleWait;
        }

        self.timer.delay_ms(self.interval_ms).await;
        outcome
    }

    pub async fn run(mut self) -> ! {
        log::info!("[SUPERVISOR] Checking link every {} ms", self.interval_ms);
        loop {
            self.tick().await;
        }
    }

    /// State between ticks
    ///
    /// `Reconnecting` only holds while `tick` is suspended in a connect round, so
    /// a caller holding the supervisor always sees `IdleWait`.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Reconnect attempts started since boot
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::connectivity::tests::{FakeDelay, FakeNet, ScriptedPrompt};
    use crate::connectivity::{LinkState, RetryPolicy};
    use crate::model::ConnectivityStatus;
    use embassy_futures::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn supervisor<'a>(
        link: &'a LinkState,
        net: &FakeNet,
        prompt: &ScriptedPrompt,
        timer: &FakeDelay,
    ) -> Supervisor<'a, FakeNet, ScriptedPrompt, FakeDelay, FakeDelay> {
        let config = GatewayConfig {
            retry: RetryPolicy::Rounds(1),
            ..GatewayConfig::from_env()
        };
        let manager = ConnectivityManager::new(
            net.clone(),
            prompt.clone(),
            FakeDelay::default(),
            link,
            &config,
        );
        Supervisor::new(manager, timer.clone(), config.reconnect_interval_ms)
    }

    #[test]
    fn connected_link_is_left_alone() {
        let link = LinkState::new();
        let net = FakeNet {
            accept: Rc::new(RefCell::new(Some("home"))),
            ..FakeNet::default()
        };
        *net.current.borrow_mut() = Some("home".into());
        let prompt = ScriptedPrompt::new(&["home"]);
        let timer = FakeDelay::default();
        let mut supervisor = supervisor(&link, &net, &prompt, &timer);

        for _ in 0..3 {
            assert_eq!(block_on(supervisor.tick()), None);
        }
        assert!(net.begins.borrow().is_empty());
        assert_eq!(supervisor.reconnects(), 0);
        assert_eq!(link.status(), ConnectivityStatus::Connected);
        assert_eq!(timer.elapsed_ms.get(), 30_000);
    }

    #[test]
    fn one_attempt_per_interval_while_down() {
        let link = LinkState::new();
        let net = FakeNet::default();
        let prompt = ScriptedPrompt::new(&["gone"]);
        let timer = FakeDelay::default();
        let mut supervisor = supervisor(&link, &net, &prompt, &timer);

        for tick in 1..=4u32 {
            assert_eq!(block_on(supervisor.tick()), Some(ConnectOutcome::GaveUp));
            assert_eq!(net.begins.borrow().len() as u32, tick);
            assert_eq!(timer.elapsed_ms.get(), u64::from(tick) * 10_000);
            assert_eq!(supervisor.state(), SupervisorState::IdleWait);
        }
        assert_eq!(supervisor.reconnects(), 4);
    }

    #[test]
    fn heals_dropped_link() {
        let link = LinkState::new();
        let net = FakeNet {
            accept: Rc::new(RefCell::new(Some("home"))),
            ..FakeNet::default()
        };
        let prompt = ScriptedPrompt::new(&["home"]);
        let timer = FakeDelay::default();
        let mut supervisor = supervisor(&link, &net, &prompt, &timer);

        assert_eq!(
            block_on(supervisor.tick()),
            Some(ConnectOutcome::Connected)
        );
        assert_eq!(link.status(), ConnectivityStatus::Connected);

        // Access point drops us.
        net.connected.set(false);
        *net.current.borrow_mut() = None;
        assert_eq!(
            block_on(supervisor.tick()),
            Some(ConnectOutcome::Connected)
        );
        assert_eq!(net.begins.borrow().len(), 2);
        assert_eq!(link.status(), ConnectivityStatus::Connected);
    }
}
