//! Connection driver task
//!
//! Owns the [`ConnectionStateMachine`] and executes its effects: one spawned
//! task per transport generation and at most one reconnect timer. Commands
//! from [`crate::LiveClient`] and callbacks from connection tasks are
//! serialized through a single `select!` loop, so the machine, the router and
//! every listener run on this task only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scoreapp_core::connection::NORMAL_CLOSE_CODE;
use scoreapp_core::{
    CloseInfo, ConnectionStateMachine, Effect, Generation, MessageRouter, TransportEvent,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::transport::{Connection, Connector, Incoming};

/// Time allowed for connections to close when the driver shuts down
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum Command {
    Connect(Option<String>),
    Reconnect,
    Disconnect,
    SetUrl(Option<String>),
    Shutdown,
}

#[derive(Debug)]
enum DriverEvent {
    Transport(Generation, TransportEvent),
    ReconnectDue(Generation),
}

struct ConnectionHandle {
    close_tx: oneshot::Sender<CloseInfo>,
    task: JoinHandle<()>,
}

/// The single pending reconnect timer and the generation it fires for
struct ReconnectTimer {
    generation: Generation,
    task: JoinHandle<()>,
}

// ----------------------------------------------------------------------------
// Driver
// ----------------------------------------------------------------------------

pub(crate) struct Driver {
    machine: ConnectionStateMachine,
    router: MessageRouter,
    connector: Arc<dyn Connector>,
    idle_timeout: Option<Duration>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    connections: HashMap<Generation, ConnectionHandle>,
    reconnect_timer: Option<ReconnectTimer>,
}

enum Next {
    Command(Option<Command>),
    Event(DriverEvent),
}

impl Driver {
    pub(crate) fn new(
        machine: ConnectionStateMachine,
        router: MessageRouter,
        connector: Arc<dyn Connector>,
        idle_timeout: Option<Duration>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            machine,
            router,
            connector,
            idle_timeout,
            commands,
            events_tx,
            events_rx,
            connections: HashMap::new(),
            reconnect_timer: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Starting live connection driver");

        loop {
            let next = tokio::select! {
                command = self.commands.recv() => Next::Command(command),
                Some(event) = self.events_rx.recv() => Next::Event(event),
            };

            match next {
                Next::Command(None) | Next::Command(Some(Command::Shutdown)) => break,
                Next::Command(Some(command)) => self.handle_command(command),
                Next::Event(event) => self.handle_event(event),
            }
        }

        self.shutdown().await;
        info!("Live connection driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!("Driver command: {:?}", command);
        let effects = match command {
            Command::Connect(url) => self.machine.connect(url),
            Command::Reconnect => self.machine.reconnect(),
            Command::Disconnect => self.machine.disconnect(),
            Command::SetUrl(url) => self.machine.set_url(url),
            Command::Shutdown => Vec::new(),
        };
        self.apply(effects);
    }

    fn handle_event(&mut self, event: DriverEvent) {
        let effects = match event {
            DriverEvent::Transport(generation, event) => {
                if matches!(event, TransportEvent::Closed(_)) {
                    self.connections.remove(&generation);
                }
                let outcome = self.machine.handle_transport(generation, event);
                if let Some(payload) = outcome.payload {
                    self.router.handle_payload(&payload);
                }
                outcome.effects
            }
            DriverEvent::ReconnectDue(generation) => {
                if self
                    .reconnect_timer
                    .as_ref()
                    .is_some_and(|timer| timer.generation == generation)
                {
                    self.reconnect_timer = None;
                }
                self.machine.reconnect_due(generation)
            }
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenTransport { generation, url } => self.open(generation, url),
                Effect::CloseTransport { generation, close } => {
                    if let Some(handle) = self.connections.remove(&generation) {
                        if handle.close_tx.send(close).is_err() {
                            debug!("Connection {} already finished", generation.value());
                        }
                    }
                }
                Effect::ScheduleReconnect { generation, delay } => {
                    self.cancel_timer();
                    let events = self.events_tx.clone();
                    let task = tokio::spawn(async move {
                        sleep(delay).await;
                        let _ = events.send(DriverEvent::ReconnectDue(generation));
                    });
                    self.reconnect_timer = Some(ReconnectTimer { generation, task });
                }
                Effect::CancelReconnect => self.cancel_timer(),
            }
        }
    }

    fn open(&mut self, generation: Generation, url: String) {
        debug!("Opening connection {} to {}", generation.value(), url);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.connector),
            url,
            generation,
            self.events_tx.clone(),
            close_rx,
            self.idle_timeout,
        ));
        self.connections
            .insert(generation, ConnectionHandle { close_tx, task });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.task.abort();
        }
    }

    async fn shutdown(&mut self) {
        let mut closing = Vec::new();
        for effect in self.machine.disconnect() {
            if let Effect::CloseTransport { generation, close } = effect {
                if let Some(handle) = self.connections.remove(&generation) {
                    let _ = handle.close_tx.send(close);
                    closing.push((generation, handle.task));
                }
            }
        }
        self.cancel_timer();

        for (generation, handle) in self.connections.drain() {
            let _ = handle.close_tx.send(CloseInfo::intentional());
            closing.push((generation, handle.task));
        }
        for (generation, task) in closing {
            if timeout(CLOSE_GRACE, task).await.is_err() {
                warn!("Connection {} did not close in time", generation.value());
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Task
// ----------------------------------------------------------------------------

enum Step {
    Close(CloseInfo),
    Frame(Incoming),
    Failed(String),
    Ended,
    Idle,
}

async fn next_step(connection: &mut dyn Connection, idle_timeout: Option<Duration>) -> Step {
    let next = match idle_timeout {
        Some(limit) => match timeout(limit, connection.next_frame()).await {
            Ok(next) => next,
            Err(_) => return Step::Idle,
        },
        None => connection.next_frame().await,
    };
    match next {
        Some(Ok(incoming)) => Step::Frame(incoming),
        Some(Err(err)) => Step::Failed(err.to_string()),
        None => Step::Ended,
    }
}

async fn run_connection(
    connector: Arc<dyn Connector>,
    url: String,
    generation: Generation,
    events: mpsc::UnboundedSender<DriverEvent>,
    mut close_rx: oneshot::Receiver<CloseInfo>,
    idle_timeout: Option<Duration>,
) {
    let send = |event: TransportEvent| {
        let _ = events.send(DriverEvent::Transport(generation, event));
    };

    let connected = tokio::select! {
        result = connector.connect(&url) => Some(result),
        _ = &mut close_rx => None,
    };
    let mut connection = match connected {
        Some(Ok(connection)) => connection,
        Some(Err(err)) => {
            warn!("Connection attempt to {} failed: {}", url, err);
            send(TransportEvent::Error(err.to_string()));
            send(TransportEvent::Closed(CloseInfo::abnormal(err.to_string())));
            return;
        }
        None => {
            debug!("Connection attempt {} cancelled", generation.value());
            return;
        }
    };
    send(TransportEvent::Opened);

    loop {
        let step = tokio::select! {
            close = &mut close_rx => Step::Close(close.unwrap_or_else(|_| CloseInfo::intentional())),
            step = next_step(connection.as_mut(), idle_timeout) => step,
        };

        match step {
            Step::Frame(Incoming::Text(text)) => send(TransportEvent::Message(text)),
            Step::Frame(Incoming::Keepalive) => {}
            Step::Frame(Incoming::Closed(close)) => {
                send(TransportEvent::Closed(close));
                return;
            }
            Step::Close(close) => {
                if let Err(err) = connection.close(close).await {
                    debug!("Closing connection {} failed: {}", generation.value(), err);
                }
                return;
            }
            Step::Failed(reason) => {
                send(TransportEvent::Error(reason.clone()));
                send(TransportEvent::Closed(CloseInfo::abnormal(reason)));
                return;
            }
            Step::Ended => {
                send(TransportEvent::Closed(CloseInfo::abnormal("stream ended")));
                return;
            }
            Step::Idle => {
                warn!("No traffic from {} within {:?}", url, idle_timeout);
                let _ = connection
                    .close(CloseInfo::new(NORMAL_CLOSE_CODE, "idle timeout"))
                    .await;
                send(TransportEvent::Closed(CloseInfo::abnormal("idle timeout")));
                return;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
