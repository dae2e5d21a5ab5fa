//! Session driver and the client handle.

use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::events::SyncEvent;
use super::machine::{Next, SessionMachine};
use super::state::{AtomicConnectionState, ConnectionState};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::ClientMessage;
use crate::router::{MessageRouter, RouterStats};
use crate::subscriptions::{Subscription, SubscriptionRegistry};
use crate::view::ClusterView;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Open,
    Close,
}

#[derive(Debug)]
struct Shared {
    config: SyncConfig,
    view: ClusterView,
    state: AtomicConnectionState,
    subscriptions: Mutex<SubscriptionRegistry>,
    stats: Mutex<RouterStats>,
    events: broadcast::Sender<SyncEvent>,
}

/// Handle to one live-event session.
///
/// Cloning is cheap. When the last clone is dropped the driver closes the
/// session and exits.
#[derive(Debug, Clone)]
pub struct SyncClient {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    pending: Arc<Mutex<Option<mpsc::UnboundedReceiver<Command>>>>,
}

impl SyncClient {
    /// Create a client writing into `view`. Nothing connects until [`start`](Self::start).
    pub fn new(config: SyncConfig, view: ClusterView) -> SyncResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (commands, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                view,
                state: AtomicConnectionState::new(ConnectionState::Disconnected),
                subscriptions: Mutex::new(SubscriptionRegistry::new()),
                stats: Mutex::new(RouterStats::default()),
                events,
            }),
            commands,
            pending: Arc::new(Mutex::new(Some(receiver))),
        })
    }

    /// Spawn the session driver and open the first session.
    ///
    /// Must be called from within a tokio runtime, and only once.
    pub fn start(&self) -> SyncResult<JoinHandle<()>> {
        let commands = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| SyncError::Connection("client already started".to_string()))?;

        info!(url = %self.shared.config.ws_url, "Starting sync client");
        let driver = Driver::new(Arc::clone(&self.shared), commands);
        Ok(tokio::spawn(driver.run()))
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// The view this client writes into.
    #[must_use]
    pub fn view(&self) -> &ClusterView {
        &self.shared.view
    }

    /// Receive lifecycle events from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Router counters so far.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        *self.shared.stats.lock()
    }

    /// Registered subscriptions in registration order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.subscriptions.lock().entries().to_vec()
    }

    /// Register interest in a topic. Returns `false` if already registered.
    ///
    /// A new subscription is sent right away when connected, and replayed on
    /// every later session either way.
    pub fn subscribe(&self, topic: &str, scope: Option<&str>) -> bool {
        let subscription = Subscription::new(topic, scope);
        let mut subscriptions = self.shared.subscriptions.lock();
        let added = subscriptions.subscribe(subscription.clone());
        if added && self.shared.state.load() == ConnectionState::Connected {
            let _ = self.commands.send(Command::Send(subscription.to_message()));
        }
        debug!(topic, scope = ?subscription.scope, added, "Subscribe");
        added
    }

    /// Drop interest in a topic. Nothing is sent upstream.
    pub fn unsubscribe(&self, topic: &str, scope: Option<&str>) -> bool {
        let subscription = Subscription::new(topic, scope);
        let removed = self.shared.subscriptions.lock().unsubscribe(&subscription);
        debug!(topic, scope = ?subscription.scope, removed, "Unsubscribe");
        removed
    }

    /// Send a message on the live session.
    ///
    /// Returns `false` without queueing anything when not connected.
    pub fn send(&self, message: ClientMessage) -> bool {
        let state = self.shared.state.load();
        if state != ConnectionState::Connected {
            debug!(action = %message.action, state = %state, "Not connected, message dropped");
            return false;
        }
        self.commands.send(Command::Send(message)).is_ok()
    }

    /// Ask the backend for a metrics push.
    pub fn request_metrics(&self) -> bool {
        self.send(ClientMessage::get_metrics())
    }

    /// Open a session from `Disconnected` or `Failed`.
    pub fn open(&self) -> SyncResult<()> {
        self.commands
            .send(Command::Open)
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Close the session and cancel any pending retry.
    pub fn close(&self) -> SyncResult<()> {
        self.commands
            .send(Command::Close)
            .map_err(|_| SyncError::ChannelClosed)
    }
}

enum Flow {
    Continue,
    Shutdown,
}

enum Drained {
    Clean,
    Close,
    Shutdown,
}

struct Driver {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    machine: SessionMachine,
    router: MessageRouter,
    retry_at: Option<Instant>,
}

impl Driver {
    fn new(shared: Arc<Shared>, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        let machine = SessionMachine::new(shared.config.reconnect.clone());
        Self {
            shared,
            commands,
            machine,
            router: MessageRouter::new(),
            retry_at: None,
        }
    }

    async fn run(mut self) {
        if self.machine.begin_open() {
            self.publish_state();
        }

        loop {
            let flow = match self.machine.state() {
                ConnectionState::Connecting => self.connect().await,
                ConnectionState::Reconnecting => self.wait_for_retry().await,
                ConnectionState::Disconnected
                | ConnectionState::Failed
                | ConnectionState::Connected => self.idle().await,
            };
            if matches!(flow, Flow::Shutdown) {
                break;
            }
        }

        debug!("Sync driver stopped");
    }

    async fn connect(&mut self) -> Flow {
        let url = self.shared.config.ws_url.clone();
        debug!(url = %url, attempt = self.machine.failures() + 1, "Opening session");

        let attempt = tokio_tungstenite::connect_async(url.as_str());
        tokio::pin!(attempt);

        let result = loop {
            tokio::select! {
                result = &mut attempt => break result,
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => discard(&message),
                    Some(Command::Open) => {}
                    Some(Command::Close) => {
                        self.close_locally();
                        return Flow::Continue;
                    }
                    None => {
                        self.close_locally();
                        return Flow::Shutdown;
                    }
                },
            }
        };

        match result {
            Ok((stream, _)) => self.run_session(stream).await,
            Err(e) => {
                let error = e.to_string();
                warn!(url = %url, error = %error, "Failed to open session");
                let next = self.machine.on_open_failed();
                self.schedule(next, error);
                Flow::Continue
            }
        }
    }

    async fn run_session(&mut self, stream: WsStream) -> Flow {
        let (mut write, mut read) = stream.split();

        match self.drain_stale() {
            Drained::Clean => {}
            Drained::Close => {
                send_close(&mut write).await;
                self.close_locally();
                return Flow::Continue;
            }
            Drained::Shutdown => {
                send_close(&mut write).await;
                self.close_locally();
                return Flow::Shutdown;
            }
        }

        let replay = {
            let subscriptions = self.shared.subscriptions.lock();
            self.machine.on_connected();
            self.publish_state();
            subscriptions.replay()
        };

        info!(url = %self.shared.config.ws_url, subscriptions = replay.len(), "Session connected");
        for message in &replay {
            if let Err(reason) = write_message(&mut write, message).await {
                return self.lost(reason);
            }
        }
        self.emit(SyncEvent::Connected {
            replayed: replay.len(),
        });

        let reason = loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.route(text.as_str()),
                    Some(Ok(Message::Close(_))) => break "server closed connection".to_string(),
                    Some(Ok(Message::Binary(data))) => {
                        trace!(len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("websocket error: {e}"),
                    None => break "connection closed".to_string(),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        if let Err(reason) = write_message(&mut write, &message).await {
                            break reason;
                        }
                    }
                    Some(Command::Open) => {}
                    Some(Command::Close) => {
                        send_close(&mut write).await;
                        self.close_locally();
                        return Flow::Continue;
                    }
                    None => {
                        send_close(&mut write).await;
                        self.close_locally();
                        return Flow::Shutdown;
                    }
                },
            }
        };

        self.lost(reason)
    }

    async fn wait_for_retry(&mut self) -> Flow {
        let deadline = self.retry_at.unwrap_or_else(Instant::now);

        loop {
            tokio::select! {
                () = sleep_until(deadline) => break,
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => discard(&message),
                    Some(Command::Open) => break,
                    Some(Command::Close) => {
                        self.close_locally();
                        return Flow::Continue;
                    }
                    None => {
                        self.close_locally();
                        return Flow::Shutdown;
                    }
                },
            }
        }

        self.retry_at = None;
        if self.machine.begin_open() {
            self.publish_state();
        }
        Flow::Continue
    }

    async fn idle(&mut self) -> Flow {
        loop {
            match self.commands.recv().await {
                Some(Command::Open) => {
                    if self.machine.begin_open() {
                        info!(state = %self.shared.state.load(), "Reopening session");
                        self.publish_state();
                    }
                    return Flow::Continue;
                }
                Some(Command::Close) => {}
                Some(Command::Send(message)) => discard(&message),
                None => return Flow::Shutdown,
            }
        }
    }

    /// Discard commands queued against an earlier session.
    fn drain_stale(&mut self) -> Drained {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Send(message)) => discard(&message),
                Ok(Command::Open) => {}
                Ok(Command::Close) => return Drained::Close,
                Err(TryRecvError::Empty) => return Drained::Clean,
                Err(TryRecvError::Disconnected) => return Drained::Shutdown,
            }
        }
    }

    fn route(&mut self, frame: &str) {
        let shared = &self.shared;
        let router = &mut self.router;
        shared.view.write(|store| {
            let subscriptions = shared.subscriptions.lock();
            router.route_frame(frame, &subscriptions, store)
        });
        *shared.stats.lock() = router.stats();
    }

    fn lost(&mut self, reason: String) -> Flow {
        warn!(reason = %reason, "Session lost");
        self.emit(SyncEvent::Disconnected {
            reason: reason.clone(),
        });
        let next = self.machine.on_connection_lost();
        self.schedule(next, reason);
        Flow::Continue
    }

    fn schedule(&mut self, next: Next, last_error: String) {
        match next {
            Next::Retry { attempt, delay } => {
                self.retry_at = Some(Instant::now() + delay);
                info!(attempt, delay = ?delay, "Scheduling reconnect");
                self.publish_state();
                self.emit(SyncEvent::Reconnecting { attempt, delay });
            }
            Next::GiveUp { attempts } => {
                self.retry_at = None;
                warn!(attempts, last_error = %last_error, "Reconnect attempts exhausted");
                self.publish_state();
                self.emit(SyncEvent::ReconnectFailed {
                    attempts,
                    last_error,
                });
            }
        }
    }

    fn close_locally(&mut self) {
        self.retry_at = None;
        if self.machine.on_local_close() {
            self.publish_state();
        }
        info!("Session closed");
        self.emit(SyncEvent::Closed);
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        self.shared.state.store(state);
        debug!(state = %state, "Connection state changed");
        self.emit(SyncEvent::StateChanged(state));
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.shared.events.send(event);
    }
}

fn discard(message: &ClientMessage) {
    debug!(action = %message.action, "Discarding message queued for a previous session");
}

async fn write_message(write: &mut WsWrite, message: &ClientMessage) -> Result<(), String> {
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(action = %message.action, error = %e, "Failed to encode message");
            return Ok(());
        }
    };
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| format!("write failed: {e}"))
}

async fn send_close(write: &mut WsWrite) {
    if let Err(e) = write.send(Message::Close(None)).await {
        debug!(error = %e, "Close frame not delivered");
    }
    let _ = write.close().await;
}
