//! Live client handle
//!
//! [`LiveClient`] is the single entry point to the live feed. It is cheap to
//! clone; every clone talks to the same driver task. Commands return as soon
//! as they are queued and their outcome is observed through state listeners.

use std::sync::{Arc, Mutex, PoisonError};

use scoreapp_core::{
    BarrierId, ConnectionState, ConnectionStateMachine, FullRace, ListenerSet, LiveConfig,
    MessageRouter, RaceId, Subscription,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::driver::{Command, Driver};
use crate::error::{LiveError, Result};
use crate::transport::Connector;
use crate::ws::WsConnector;

struct ClientInner {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    state_listeners: ListenerSet<ConnectionState>,
    router: MessageRouter,
    driver: Mutex<Option<JoinHandle<()>>>,
    _state_mirror: Subscription,
}

#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<ClientInner>,
}

impl LiveClient {
    /// Start a client over websockets. Must be called within a tokio runtime.
    pub fn spawn(config: &LiveConfig) -> Result<Self> {
        Self::spawn_with(config, Arc::new(WsConnector))
    }

    /// Start a client over a custom transport
    pub fn spawn_with(config: &LiveConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let machine = ConnectionStateMachine::new(config.url.clone(), config.retry.build());
        let state_listeners = machine.listeners();
        let (state_tx, state_rx) = watch::channel(machine.state());
        let state_mirror = state_listeners.subscribe(move |state| {
            state_tx.send_replace(state.clone());
        });

        let router = MessageRouter::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(
            machine,
            router.clone(),
            connector,
            config.idle_timeout(),
            command_rx,
        );
        let task = tokio::spawn(driver.run());

        let client = Self {
            inner: Arc::new(ClientInner {
                commands,
                state: state_rx,
                state_listeners,
                router,
                driver: Mutex::new(Some(task)),
                _state_mirror: state_mirror,
            }),
        };

        if config.auto_connect && config.url.is_some() {
            info!("Auto-connecting live client");
            client.send(Command::Reconnect)?;
        }
        Ok(client)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| LiveError::ClientStopped)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Connect to `url`, closing any active connection first
    pub fn connect(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        scoreapp_core::validate_live_url(&url)?;
        self.send(Command::Connect(Some(url)))
    }

    /// Connect again to the configured URL
    pub fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Replace the configured URL; `None` settles into `NoUrl`
    pub fn set_url(&self, url: Option<String>) -> Result<()> {
        if let Some(url) = &url {
            scoreapp_core::validate_live_url(url)?;
        }
        self.send(Command::SetUrl(url))
    }

    /// Stop the driver, closing the connection, and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.inner.commands.send(Command::Shutdown);
        let task = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                debug!("Live driver ended abnormally: {}", err);
            }
        }
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver of the latest state; intermediate states may be skipped
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> Result<ConnectionState>
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut receiver = self.inner.state.clone();
        loop {
            {
                let state = receiver.borrow_and_update();
                if predicate(&state) {
                    return Ok(state.clone());
                }
            }
            receiver
                .changed()
                .await
                .map_err(|_| LiveError::ClientStopped)?;
        }
    }

    /// Observe every state transition, in order, on the driver task
    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.state_listeners.subscribe(callback)
    }

    // ------------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------------

    pub fn subscribe_race<F>(&self, race_id: RaceId, callback: F) -> Subscription
    where
        F: Fn(&Arc<FullRace>) + Send + Sync + 'static,
    {
        self.inner.router.subscribe_race(race_id, callback)
    }

    pub fn on_barriers<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<BarrierId>) + Send + Sync + 'static,
    {
        self.inner.router.on_barriers(callback)
    }

    pub fn on_current_race<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Option<RaceId>) + Send + Sync + 'static,
    {
        self.inner.router.on_current_race(callback)
    }

    pub fn online_barriers(&self) -> Vec<BarrierId> {
        self.inner.router.online_barriers()
    }

    pub fn current_race(&self) -> Option<RaceId> {
        self.inner.router.current_race()
    }

    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }
}
