//! Live market-data connection manager
//!
//! One persistent WebSocket per connector. A spawned task owns the
//! socket; callers talk to it through control messages. The task is the
//! only writer of the connection status, which observers follow through
//! a watch channel.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::config::FeedConfig;
use super::errors::{FeedError, FeedResult};
use super::protocol::{self, InboundFrame, SubscribeFrame};
use super::reconnect::ReconnectPolicy;
use super::registry::{SubscriptionId, SubscriptionRegistry};
use super::types::{ConnectionStatus, PriceUpdate, Symbol};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug)]
enum ControlMessage {
    Subscribe(Symbol),
    Shutdown,
}

/// Connection manager for the push feed.
///
/// Constructed from an injected [`FeedConfig`] and shared by reference
/// (or `Arc`); all methods take `&self`.
pub struct MarketDataConnector {
    config: FeedConfig,
    registry: Arc<SubscriptionRegistry>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    updates: broadcast::Sender<PriceUpdate>,
    control_tx: Mutex<Option<mpsc::UnboundedSender<ControlMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MarketDataConnector {
    pub fn new(config: FeedConfig) -> FeedResult<Self> {
        Url::parse(&config.endpoint)
            .map_err(|e| FeedError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;

        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (updates, _) = broadcast::channel(config.buffer_size.max(1));

        Ok(Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            status: Arc::new(status),
            updates,
            control_tx: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Opens the feed connection. Idempotent: a no-op while the
    /// connection task is already connecting or connected. Starting a
    /// fresh cycle resets the retry counter, so this is also the manual
    /// recovery path out of the failed state.
    pub fn connect(&self) {
        let mut task_slot = self.task.lock();

        let running = task_slot
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);
        // disconnect() drops the control channel before the task winds
        // down; a pending shutdown must not make connect() a no-op just
        // because the status still reads connected
        let shutdown_pending = self.control_tx.lock().is_none();
        let status = *self.status.borrow();
        if running
            && !shutdown_pending
            && matches!(
                status,
                ConnectionStatus::Connecting | ConnectionStatus::Connected
            )
        {
            debug!(%status, "connect ignored, already active");
            return;
        }

        // a task waiting out a backoff (or already finished) is replaced
        if let Some(task) = task_slot.take() {
            task.abort();
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *self.control_tx.lock() = Some(control_tx);

        let worker = ConnectionTask {
            config: self.config.clone(),
            registry: self.registry.clone(),
            status: self.status.clone(),
            updates: self.updates.clone(),
        };
        *task_slot = Some(tokio::spawn(worker.run(control_rx)));
    }

    /// Closes the socket, clears every subscription, and disables
    /// auto-reconnect. Distinct from a transient drop: nothing happens
    /// until `connect()` is called again.
    pub fn disconnect(&self) {
        if let Some(tx) = self.control_tx.lock().take() {
            let _ = tx.send(ControlMessage::Shutdown);
        }
        self.registry.clear();

        // with no task alive to acknowledge the shutdown (never started,
        // or already failed), reflect the terminal state here
        let task_alive = self
            .task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);
        if !task_alive {
            set_status(&self.status, ConnectionStatus::Disconnected);
        }
    }

    /// Registers `callback` for updates on `symbol`. When connected, the
    /// subscribe frame goes out immediately; otherwise the symbol is
    /// replayed when the connection (re)opens.
    pub fn subscribe<F>(&self, symbol: Symbol, callback: F) -> FeedResult<SubscriptionId>
    where
        F: Fn(&PriceUpdate) + Send + Sync + 'static,
    {
        if !symbol.validate() {
            return Err(FeedError::InvalidSymbol(symbol.0));
        }

        let (id, first) = self.registry.insert(symbol.clone(), Arc::new(callback));
        debug!(%symbol, first, "subscription registered");

        if *self.status.borrow() == ConnectionStatus::Connected {
            if let Some(tx) = self.control_tx.lock().as_ref() {
                let _ = tx.send(ControlMessage::Subscribe(symbol));
            }
        }
        Ok(id)
    }

    /// Drops a single callback; the registry entry disappears with its
    /// last callback. No unsubscribe frame is sent to the remote feed --
    /// stale symbols fall off on the next reconnect replay. Returns
    /// false when the handle was already removed.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        match self.registry.remove(id) {
            Some((symbol, last)) => {
                debug!(%symbol, last, "subscription removed");
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Status broadcaster: observers see every lifecycle transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// General message observers: every update frame, regardless of
    /// whether any symbol subscription matched it.
    pub fn updates(&self) -> broadcast::Receiver<PriceUpdate> {
        self.updates.subscribe()
    }

    pub fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.registry.symbols()
    }
}

impl Drop for MarketDataConnector {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

fn set_status(status: &watch::Sender<ConnectionStatus>, next: ConnectionStatus) {
    status.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            info!(from = %current, to = %next, "feed status");
            *current = next;
            true
        }
    });
}

/// State owned by the spawned socket task.
struct ConnectionTask {
    config: FeedConfig,
    registry: Arc<SubscriptionRegistry>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    updates: broadcast::Sender<PriceUpdate>,
}

impl ConnectionTask {
    async fn run(self, mut control_rx: mpsc::UnboundedReceiver<ControlMessage>) {
        let mut policy = ReconnectPolicy::new(
            self.config.base_delay,
            self.config.max_reconnect_attempts,
        );

        loop {
            set_status(&self.status, ConnectionStatus::Connecting);

            let stream = match connect_async(self.config.endpoint.as_str()).await {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    warn!(error = %e, "feed connection attempt failed");
                    if self.backoff_or_give_up(&mut policy, &mut control_rx).await {
                        return;
                    }
                    continue;
                }
            };

            info!(endpoint = %self.config.endpoint, "feed connected");
            set_status(&self.status, ConnectionStatus::Connected);
            policy.reset();

            let (mut sink, mut reader) = stream.split();

            // replay every live symbol in one batched frame
            let symbols = self.registry.symbols();
            if !symbols.is_empty() {
                debug!(count = symbols.len(), "replaying subscriptions");
                let frame = SubscribeFrame::batch(&self.config.channel, symbols);
                if let Err(e) = send_frame(&mut sink, &frame).await {
                    warn!(error = %e, "subscription replay failed");
                }
            }

            let shutdown = loop {
                tokio::select! {
                    ctl = control_rx.recv() => match ctl {
                        Some(ControlMessage::Subscribe(symbol)) => {
                            let frame = SubscribeFrame::single(&self.config.channel, &symbol);
                            if let Err(e) = send_frame(&mut sink, &frame).await {
                                warn!(%symbol, error = %e, "subscribe frame failed");
                                break false;
                            }
                        }
                        Some(ControlMessage::Shutdown) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break true;
                        }
                    },
                    msg = reader.next() => match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "feed closed the connection");
                            break false;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary
                        Some(Err(e)) => {
                            // socket errors only log; the close path below
                            // owns the reconnect decision
                            error!(error = %e, "feed socket error");
                            break false;
                        }
                        None => {
                            warn!("feed stream ended");
                            break false;
                        }
                    },
                }
            };

            if shutdown {
                info!("feed shutdown requested");
                policy.exhaust();
                set_status(&self.status, ConnectionStatus::Disconnected);
                return;
            }

            set_status(&self.status, ConnectionStatus::Disconnected);
            if self.backoff_or_give_up(&mut policy, &mut control_rx).await {
                return;
            }
        }
    }

    /// Records one failure and waits out the backoff delay. Returns true
    /// when the task should exit: retries exhausted (status becomes
    /// failed) or a shutdown arrived mid-wait.
    async fn backoff_or_give_up(
        &self,
        policy: &mut ReconnectPolicy,
        control_rx: &mut mpsc::UnboundedReceiver<ControlMessage>,
    ) -> bool {
        let delay = match policy.record_failure() {
            Some(delay) => delay,
            None => {
                error!(
                    attempts = policy.attempts() - 1,
                    "reconnect attempts exhausted, giving up"
                );
                set_status(&self.status, ConnectionStatus::Failed);
                return true;
            }
        };

        debug!(attempt = policy.attempts(), ?delay, "scheduling reconnect");
        if self.wait_or_shutdown(control_rx, delay).await {
            set_status(&self.status, ConnectionStatus::Disconnected);
            return true;
        }
        false
    }

    /// Sleeps for `delay`, still honoring control messages. Subscribes
    /// arriving mid-wait are already in the registry and get replayed on
    /// the next open. Returns true on shutdown.
    async fn wait_or_shutdown(
        &self,
        control_rx: &mut mpsc::UnboundedReceiver<ControlMessage>,
        delay: Duration,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                ctl = control_rx.recv() => match ctl {
                    Some(ControlMessage::Subscribe(_)) => {}
                    Some(ControlMessage::Shutdown) | None => return true,
                },
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match protocol::parse_frame(text) {
            Ok(InboundFrame::Update(update)) => {
                let delivered = self.registry.dispatch(&update);
                debug!(symbol = %update.symbol, delivered, "update dispatched");
                // general observers see every update regardless of match
                let _ = self.updates.send(update);
            }
            Ok(InboundFrame::Ignored) => {
                debug!("ignoring non-update frame");
            }
            Err(e) => {
                // malformed frames are dropped with no effect on the
                // connection state
                warn!(error = %e, "dropping malformed frame");
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: &SubscribeFrame) -> FeedResult<()> {
    let text = frame.to_text()?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
