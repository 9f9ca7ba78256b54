//! Reconnecting Connection State Machine
//!
//! Sans-IO: the machine never touches a socket or a timer. Operations return
//! [`Effect`]s that the driver executes, and the driver feeds transport
//! callbacks back in through [`ConnectionStateMachine::handle_transport`].
//!
//! Every transport the machine asks for is tagged with a [`Generation`]. Any
//! callback carrying a generation other than the one of the live transport is
//! stale and ignored, which makes late events from a closed or replaced
//! connection harmless.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::state::ConnectionState;
use crate::listeners::{ListenerSet, Subscription};
use crate::retry::RetryPolicy;

/// Close code sent on an intentional disconnect
pub const NORMAL_CLOSE_CODE: u16 = 1000;
/// Reason sent together with [`NORMAL_CLOSE_CODE`] on an intentional disconnect
pub const INTENTIONAL_CLOSE_REASON: &str = "client disconnect";
/// Close code reported for connections that ended without a close frame
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

// ----------------------------------------------------------------------------
// Events and Effects
// ----------------------------------------------------------------------------

/// Identity of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Marker used for closures requested by the client itself
    pub fn intentional() -> Self {
        Self::new(NORMAL_CLOSE_CODE, INTENTIONAL_CLOSE_REASON)
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(ABNORMAL_CLOSE_CODE, reason)
    }

    pub fn is_intentional(&self) -> bool {
        self.code == NORMAL_CLOSE_CODE && self.reason == INTENTIONAL_CLOSE_REASON
    }
}

/// Callback from a transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed(CloseInfo),
    Error(String),
}

/// Side effect requested from the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport { generation: Generation, url: String },
    CloseTransport { generation: Generation, close: CloseInfo },
    /// Replaces any pending reconnect timer
    ScheduleReconnect { generation: Generation, delay: Duration },
    CancelReconnect,
}

/// Result of feeding a transport event into the machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOutcome {
    pub effects: Vec<Effect>,
    /// Inbound payload to route, only produced while connected
    pub payload: Option<String>,
}

// ----------------------------------------------------------------------------
// State Machine
// ----------------------------------------------------------------------------

pub struct ConnectionStateMachine {
    state: ConnectionState,
    url: Option<String>,
    generation: Generation,
    transport: Option<Generation>,
    reconnect_pending: bool,
    policy: Arc<dyn RetryPolicy>,
    listeners: ListenerSet<ConnectionState>,
}

impl ConnectionStateMachine {
    pub fn new(url: Option<String>, policy: Arc<dyn RetryPolicy>) -> Self {
        let state = match &url {
            Some(url) => ConnectionState::NotConnected {
                url: url.clone(),
                attempt: 0,
            },
            None => ConnectionState::NoUrl,
        };
        Self {
            state,
            url,
            generation: Generation::default(),
            transport: None,
            reconnect_pending: false,
            policy,
            listeners: ListenerSet::new(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Shared handle to the state-change listeners
    pub fn listeners(&self) -> ListenerSet<ConnectionState> {
        self.listeners.clone()
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Connect to `url`, or settle into `NoUrl` when it is `None`
    ///
    /// An active connection is closed intentionally first.
    pub fn connect(&mut self, url: Option<String>) -> Vec<Effect> {
        let mut effects = if self.state.is_active() {
            self.disconnect()
        } else {
            Vec::new()
        };
        self.cancel_reconnect(&mut effects);
        self.url = url;

        match self.url.clone() {
            Some(url) => self.open(url, 0, &mut effects),
            None => {
                debug!("Connect requested without a URL");
                self.set_state(ConnectionState::NoUrl);
            }
        }
        effects
    }

    /// Reconnect to the configured URL
    pub fn reconnect(&mut self) -> Vec<Effect> {
        let url = self.url.clone();
        self.connect(url)
    }

    /// Intentionally close the connection with the standard marker
    pub fn disconnect(&mut self) -> Vec<Effect> {
        self.disconnect_with(CloseInfo::intentional())
    }

    /// Intentionally close the connection, sending `close` to the server
    pub fn disconnect_with(&mut self, close: CloseInfo) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.state.is_active() {
            debug!("Ignoring disconnect while {}", self.state.name());
            return effects;
        }

        self.cancel_reconnect(&mut effects);
        if let Some(generation) = self.transport.take() {
            effects.push(Effect::CloseTransport { generation, close });
        }
        self.generation = self.generation.next();

        if let Some(url) = self.url.clone() {
            let attempt = self.state.attempt();
            self.set_state(ConnectionState::NotConnected { url, attempt });
        }
        effects
    }

    /// Change the configured URL
    ///
    /// With an active connection this reconnects to the new URL; without one
    /// the machine only records it. `None` always settles into `NoUrl`.
    pub fn set_url(&mut self, url: Option<String>) -> Vec<Effect> {
        if url == self.url {
            return Vec::new();
        }
        match url {
            None => self.connect(None),
            Some(url) if self.state.is_active() || self.reconnect_pending => {
                self.connect(Some(url))
            }
            Some(url) => {
                info!("Connection URL set to {}", url);
                self.url = Some(url.clone());
                self.set_state(ConnectionState::NotConnected { url, attempt: 0 });
                Vec::new()
            }
        }
    }

    /// Feed a callback of the transport opened for `generation`
    pub fn handle_transport(
        &mut self,
        generation: Generation,
        event: TransportEvent,
    ) -> TransportOutcome {
        let mut outcome = TransportOutcome::default();
        if self.transport != Some(generation) {
            debug!(
                "Ignoring stale transport event from generation {} (current {})",
                generation.value(),
                self.generation.value()
            );
            return outcome;
        }

        match event {
            TransportEvent::Opened => {
                if let ConnectionState::Connecting { url, .. } = &self.state {
                    let url = url.clone();
                    info!("Connected to {}", url);
                    self.set_state(ConnectionState::Connected { url, attempt: 1 });
                }
            }
            TransportEvent::Message(text) => {
                if self.state.is_connected() {
                    outcome.payload = Some(text);
                } else {
                    debug!("Dropping message received while {}", self.state.name());
                }
            }
            TransportEvent::Error(reason) => {
                warn!("Transport error: {}", reason);
            }
            TransportEvent::Closed(close) => {
                self.transport = None;
                if close.is_intentional() {
                    if let Some(url) = self.url.clone() {
                        let attempt = self.state.attempt();
                        self.set_state(ConnectionState::NotConnected { url, attempt });
                    }
                } else {
                    warn!("Connection closed ({}): {}", close.code, close.reason);
                    self.retry(&mut outcome.effects);
                }
            }
        }
        outcome
    }

    /// The reconnect timer scheduled for `generation` fired
    pub fn reconnect_due(&mut self, generation: Generation) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.reconnect_pending || generation != self.generation {
            debug!("Ignoring stale reconnect timer {}", generation.value());
            return effects;
        }
        self.reconnect_pending = false;

        if let ConnectionState::Connecting { url, attempt } = &self.state {
            let (url, attempt) = (url.clone(), *attempt);
            debug!("Reconnect attempt {} to {}", attempt, url);
            self.open(url, attempt, &mut effects);
        }
        effects
    }

    fn open(&mut self, url: String, attempt: u32, effects: &mut Vec<Effect>) {
        self.generation = self.generation.next();
        self.transport = Some(self.generation);
        self.set_state(ConnectionState::Connecting {
            url: url.clone(),
            attempt,
        });
        effects.push(Effect::OpenTransport {
            generation: self.generation,
            url,
        });
    }

    fn retry(&mut self, effects: &mut Vec<Effect>) {
        let Some(url) = self.url.clone() else {
            self.set_state(ConnectionState::NoUrl);
            return;
        };
        let attempt = match &self.state {
            ConnectionState::Connected { .. } => 1,
            state => state.attempt() + 1,
        };

        match self.policy.next_delay(attempt) {
            Some(delay) => {
                info!("Reconnecting to {} in {:?} (attempt {})", url, delay, attempt);
                self.reconnect_pending = true;
                self.set_state(ConnectionState::Connecting { url, attempt });
                effects.push(Effect::ScheduleReconnect {
                    generation: self.generation,
                    delay,
                });
            }
            None => {
                warn!("Giving up on {} after {} attempts", url, attempt);
                self.set_state(ConnectionState::MaxRetriesReached { url, attempt });
            }
        }
    }

    fn cancel_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if state == self.state {
            return;
        }
        debug!("Connection state {} -> {}", self.state, state);
        self.state = state;
        self.listeners.notify(&self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{LinearRetry, NoRetry};
    use crate::connection::ConnectionStateName;
    use std::sync::Mutex;

    const URL: &str = "ws://race.local/ws";

    fn machine(policy: Arc<dyn RetryPolicy>) -> ConnectionStateMachine {
        ConnectionStateMachine::new(Some(URL.to_string()), policy)
    }

    fn opened_generation(effects: &[Effect]) -> Generation {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::OpenTransport { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("open effect")
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(
            ConnectionStateMachine::new(None, Arc::new(NoRetry)).state(),
            ConnectionState::NoUrl
        );
        assert_eq!(
            machine(Arc::new(NoRetry)).state(),
            ConnectionState::NotConnected {
                url: URL.to_string(),
                attempt: 0
            }
        );
    }

    #[test]
    fn test_connect_then_open() {
        let mut m = machine(Arc::new(NoRetry));
        let effects = m.reconnect();
        let generation = opened_generation(&effects);
        assert_eq!(m.state().name(), ConnectionStateName::Connecting);
        assert_eq!(m.state().attempt(), 0);

        m.handle_transport(generation, TransportEvent::Opened);
        assert_eq!(
            m.state(),
            ConnectionState::Connected {
                url: URL.to_string(),
                attempt: 1
            }
        );
    }

    #[test]
    fn test_connect_without_url_settles_no_url() {
        let mut m = machine(Arc::new(NoRetry));
        let effects = m.connect(None);
        assert!(effects.is_empty());
        assert_eq!(m.state(), ConnectionState::NoUrl);
    }

    #[test]
    fn test_messages_only_routed_while_connected() {
        let mut m = machine(Arc::new(NoRetry));
        let generation = opened_generation(&m.reconnect());

        let early = m.handle_transport(generation, TransportEvent::Message("{}".into()));
        assert_eq!(early.payload, None);

        m.handle_transport(generation, TransportEvent::Opened);
        let routed = m.handle_transport(generation, TransportEvent::Message("{}".into()));
        assert_eq!(routed.payload.as_deref(), Some("{}"));
    }

    #[test]
    fn test_linear_policy_reaches_max_retries_on_third_failure() {
        let mut m = machine(Arc::new(LinearRetry::new(2, Duration::from_millis(1_000))));
        let generation = opened_generation(&m.reconnect());
        m.handle_transport(generation, TransportEvent::Opened);

        let first = m.handle_transport(generation, TransportEvent::Closed(CloseInfo::abnormal("x")));
        assert_eq!(
            first.effects,
            vec![Effect::ScheduleReconnect {
                generation,
                delay: Duration::from_millis(1_000)
            }]
        );
        assert_eq!(m.state().attempt(), 1);

        let generation = opened_generation(&m.reconnect_due(generation));
        let second = m.handle_transport(generation, TransportEvent::Closed(CloseInfo::abnormal("x")));
        assert!(matches!(
            second.effects.as_slice(),
            [Effect::ScheduleReconnect { delay, .. }] if *delay == Duration::from_millis(2_000)
        ));

        let generation = opened_generation(&m.reconnect_due(generation));
        let third = m.handle_transport(generation, TransportEvent::Closed(CloseInfo::abnormal("x")));
        assert!(third.effects.is_empty());
        assert_eq!(
            m.state(),
            ConnectionState::MaxRetriesReached {
                url: URL.to_string(),
                attempt: 3
            }
        );
    }

    #[test]
    fn test_disconnect_cancels_timer_and_closes() {
        let mut m = machine(Arc::new(LinearRetry::new(5, Duration::from_millis(10))));
        let generation = opened_generation(&m.reconnect());
        m.handle_transport(generation, TransportEvent::Opened);

        let effects = m.disconnect();
        assert_eq!(
            effects,
            vec![Effect::CloseTransport {
                generation,
                close: CloseInfo::intentional()
            }]
        );
        assert_eq!(m.state().name(), ConnectionStateName::NotConnected);

        let late = m.handle_transport(generation, TransportEvent::Closed(CloseInfo::abnormal("late")));
        assert!(late.effects.is_empty());
        assert_eq!(m.state().name(), ConnectionStateName::NotConnected);
    }

    #[test]
    fn test_disconnect_during_backoff_cancels_reconnect() {
        let mut m = machine(Arc::new(LinearRetry::new(5, Duration::from_millis(10))));
        let generation = opened_generation(&m.reconnect());
        m.handle_transport(generation, TransportEvent::Closed(CloseInfo::abnormal("refused")));
        assert!(m.reconnect_pending());

        let effects = m.disconnect();
        assert_eq!(effects, vec![Effect::CancelReconnect]);
        assert!(m.reconnect_due(generation).is_empty());
    }

    #[test]
    fn test_disconnect_is_noop_when_idle() {
        let mut m = machine(Arc::new(NoRetry));
        assert!(m.disconnect().is_empty());
    }

    #[test]
    fn test_stale_callbacks_after_reconnect_to_new_url() {
        let mut m = machine(Arc::new(NoRetry));
        let old = opened_generation(&m.reconnect());
        m.handle_transport(old, TransportEvent::Opened);

        let effects = m.connect(Some("ws://other/ws".to_string()));
        assert!(effects.contains(&Effect::CloseTransport {
            generation: old,
            close: CloseInfo::intentional()
        }));
        let new = opened_generation(&effects);
        assert_ne!(old, new);

        m.handle_transport(old, TransportEvent::Opened);
        let outcome = m.handle_transport(old, TransportEvent::Message("{}".into()));
        assert_eq!(outcome.payload, None);
        m.handle_transport(old, TransportEvent::Closed(CloseInfo::abnormal("gone")));
        assert_eq!(
            m.state(),
            ConnectionState::Connecting {
                url: "ws://other/ws".to_string(),
                attempt: 0
            }
        );
    }

    #[test]
    fn test_set_url_while_connected_reconnects() {
        let mut m = machine(Arc::new(NoRetry));
        let generation = opened_generation(&m.reconnect());
        m.handle_transport(generation, TransportEvent::Opened);

        let effects = m.set_url(Some("ws://next/ws".to_string()));
        assert!(matches!(effects.last(), Some(Effect::OpenTransport { url, .. }) if url == "ws://next/ws"));
        assert!(m.set_url(Some("ws://next/ws".to_string())).is_empty());
    }

    #[test]
    fn test_set_url_while_idle_only_records() {
        let mut m = ConnectionStateMachine::new(None, Arc::new(NoRetry));
        assert!(m.set_url(Some(URL.to_string())).is_empty());
        assert_eq!(m.state().name(), ConnectionStateName::NotConnected);

        m.set_url(None);
        assert_eq!(m.state(), ConnectionState::NoUrl);
    }

    #[test]
    fn test_listeners_observe_transitions_in_order() {
        let mut m = machine(Arc::new(NoRetry));
        let names = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let names = Arc::clone(&names);
            m.on_state_change(move |state| names.lock().unwrap().push(state.name()))
        };

        let generation = opened_generation(&m.reconnect());
        m.handle_transport(generation, TransportEvent::Opened);
        m.handle_transport(generation, TransportEvent::Closed(CloseInfo::abnormal("drop")));

        assert_eq!(
            *names.lock().unwrap(),
            vec![
                ConnectionStateName::Connecting,
                ConnectionStateName::Connected,
                ConnectionStateName::MaxRetriesReached,
            ]
        );
    }
}
