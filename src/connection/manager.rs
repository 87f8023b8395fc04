//! Connection manager: one logical push connection per session.
//!
//! The manager spawns a driver task that owns the socket. The handle
//! talks to it over a command channel and reads published snapshots
//! from `watch` channels, so health checks never block on the network.
//!
//! Dropping the handle (or calling `shutdown`) ends the session: the
//! pending reconnect timer is cancelled and any live socket is closed.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::types::Session;
use crate::config::ConnectionConfig;
use crate::observability::metrics;

use super::events::{decode_push_event, Inbox, PushEvent};
use super::state::{ConnectionHealth, ConnectionState, ConnectionStatus, ReconnectPolicy};
use super::transport::{Connector, PushChannel};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Reconnect,
    Stop,
}

/// Handle to a running connection.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    inbox: watch::Receiver<Inbox>,
    events: broadcast::Sender<PushEvent>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Open the push connection for `session` and keep it alive.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<C: Connector>(session: Session, config: &ConnectionConfig, connector: C) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::default());
        let (inbox_tx, inbox) = watch::channel(Inbox::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let driver = Driver {
            session,
            connector: Arc::new(connector),
            policy: ReconnectPolicy::from_config(config),
            commands: command_rx,
            state: state_tx,
            inbox: inbox_tx,
            events: events.clone(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands,
            state,
            inbox,
            events,
            task: Some(task),
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.state.borrow().health()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn inbox(&self) -> Inbox {
        self.inbox.borrow().clone()
    }

    pub fn watch_inbox(&self) -> watch::Receiver<Inbox> {
        self.inbox.clone()
    }

    /// Stream of decoded push events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.events.subscribe()
    }

    /// Reset the attempt counter and connect again immediately, tearing
    /// down a live connection first.
    pub fn reconnect(&self) {
        if self.commands.send(Command::Reconnect).is_err() {
            tracing::debug!("Reconnect requested after connection manager stopped");
        }
    }

    /// End the session and wait for the socket to close.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Connection driver task failed");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Why the pump stopped reading.
enum PumpExit {
    Dropped(Option<String>),
    Reconnect,
    Stop,
}

/// What to do after a wait.
enum Next {
    Connect,
    Stop,
}

struct Driver<C> {
    session: Session,
    connector: Arc<C>,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    inbox: watch::Sender<Inbox>,
    events: broadcast::Sender<PushEvent>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut recovering = false;

        'session: loop {
            self.publish(ConnectionStatus::Connecting, attempt, recovering, None);

            let connector = Arc::clone(&self.connector);
            let connected = tokio::select! {
                result = connector.connect(&self.session) => result,
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => {
                        attempt = 0;
                        recovering = true;
                        continue 'session;
                    }
                    Some(Command::Stop) | None => break 'session,
                },
            };

            let last_error = match connected {
                Ok(mut channel) => {
                    attempt = 0;
                    recovering = false;
                    self.publish(ConnectionStatus::Connected, attempt, recovering, None);
                    tracing::info!(username = %self.session.username, "Notification channel connected");

                    match self.pump(channel.as_mut()).await {
                        PumpExit::Dropped(error) => {
                            tracing::warn!(
                                error = error.as_deref().unwrap_or("closed by peer"),
                                "Notification channel dropped"
                            );
                            error.unwrap_or_else(|| "connection closed".to_string())
                        }
                        PumpExit::Reconnect => {
                            channel.close().await;
                            tracing::info!("Manual reconnect, closing live channel");
                            attempt = 0;
                            recovering = true;
                            continue 'session;
                        }
                        PumpExit::Stop => {
                            channel.close().await;
                            break 'session;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Notification channel connect failed");
                    e.to_string()
                }
            };

            recovering = true;
            self.publish(
                ConnectionStatus::Disconnected,
                attempt,
                recovering,
                Some(last_error.clone()),
            );

            let next = match self.policy.delay_for(attempt) {
                Some(delay) => {
                    self.publish(
                        ConnectionStatus::Reconnecting,
                        attempt,
                        recovering,
                        Some(last_error),
                    );
                    tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            attempt += 1;
                            metrics::record_reconnect_attempt();
                            Next::Connect
                        }
                        command = self.commands.recv() => match command {
                            Some(Command::Reconnect) => {
                                attempt = 0;
                                Next::Connect
                            }
                            Some(Command::Stop) | None => Next::Stop,
                        },
                    }
                }
                None => {
                    let message = format!(
                        "Unable to connect to the notification service after {} attempts",
                        attempt
                    );
                    tracing::error!(attempts = attempt, "{}", message);
                    self.publish(ConnectionStatus::Exhausted, attempt, false, Some(message));

                    match self.commands.recv().await {
                        Some(Command::Reconnect) => {
                            attempt = 0;
                            recovering = true;
                            Next::Connect
                        }
                        Some(Command::Stop) | None => Next::Stop,
                    }
                }
            };

            if let Next::Stop = next {
                break 'session;
            }
        }

        self.publish(ConnectionStatus::Disconnected, attempt, false, None);
        tracing::info!(username = %self.session.username, "Notification channel stopped");
    }

    /// Read until the channel ends or a command interrupts.
    async fn pump(&mut self, channel: &mut dyn PushChannel) -> PumpExit {
        loop {
            tokio::select! {
                frame = channel.recv() => match frame {
                    Some(Ok(payload)) => self.dispatch(&payload),
                    Some(Err(e)) => return PumpExit::Dropped(Some(e.to_string())),
                    None => return PumpExit::Dropped(None),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => return PumpExit::Reconnect,
                    Some(Command::Stop) | None => return PumpExit::Stop,
                },
            }
        }
    }

    fn dispatch(&self, payload: &str) {
        let event = match decode_push_event(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping push payload");
                metrics::record_push_event("malformed");
                return;
            }
        };

        metrics::record_push_event(event.kind());
        self.inbox.send_modify(|inbox| inbox.apply(&event));
        // No subscribers is fine; the inbox snapshot still holds the event.
        let _ = self.events.send(event);
    }

    fn publish(
        &self,
        status: ConnectionStatus,
        attempt_count: u32,
        recovering: bool,
        last_error: Option<String>,
    ) {
        let next = ConnectionState {
            status,
            attempt_count,
            recovering,
            last_error,
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        metrics::record_connection_status(status.code());
    }
}
