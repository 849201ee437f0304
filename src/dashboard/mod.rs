//! Push-notification listener
//!
//! Maintains exactly one live WebSocket connection to the review dashboard
//! feed. On connect it sends the fixed subscription handshake, then decodes
//! incoming frames into [`PushEvent`]s and publishes them on the bus as
//! `UserEnteredQueue`. Malformed or irrelevant frames are expected noise and
//! are dropped silently (trace-logged only).
//!
//! Two self-healing mechanisms keep the feed alive: transport errors and
//! closes trigger an immediate reconnect with bounded exponential backoff,
//! and a staleness watchdog forces a reconnect when no valid frame has been
//! decoded for longer than the configured threshold — this guards against
//! connections that stall silently without signalling closure.

pub mod decode;

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::events::{EventBus, ReviewEvent};

pub use decode::decode_frame;

const INITIAL_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Why a connection's read loop ended.
enum ReadOutcome {
    /// The watchdog declared the feed stale.
    Stale,
    /// The peer closed the stream.
    Closed,
    /// Transport error.
    Failed,
    /// Shutdown requested.
    Cancelled,
}

/// The single process-wide listener on the push feed.
///
/// Owned by the watcher: spawned on start, cancelled on shutdown.
pub struct DashboardListener {
    config: Arc<WatcherConfig>,
    bus: EventBus,
}

impl DashboardListener {
    /// Spawn the listener task. It runs until `cancel` fires.
    pub fn spawn(
        config: Arc<WatcherConfig>,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let listener = Self { config, bus };
        tokio::spawn(async move { listener.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        let mut backoff = INITIAL_RECONNECT_BACKOFF;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let url = self.config.dashboard_url();
            let connect = tokio::select! {
                _ = cancel.cancelled() => break,
                connect = connect_async(url) => connect,
            };

            let mut socket = match connect {
                Ok((socket, _response)) => socket,
                Err(err) => {
                    tracing::warn!(url, %err, "push feed connect failed");
                    if Self::wait_or_cancel(backoff, &cancel).await {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                    continue;
                }
            };

            let handshake = self.config.dashboard_handshake().to_string();
            if let Err(err) = socket.send(Message::Text(handshake.into())).await {
                tracing::warn!(%err, "push feed handshake failed");
                if Self::wait_or_cancel(backoff, &cancel).await {
                    break;
                }
                backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                continue;
            }

            tracing::debug!(url, "push feed connected");
            backoff = INITIAL_RECONNECT_BACKOFF;

            match self.read_frames(&mut socket, &cancel).await {
                ReadOutcome::Cancelled => {
                    let _ = socket.close(None).await;
                    break;
                }
                ReadOutcome::Stale => {
                    tracing::warn!(
                        threshold = ?self.config.stale_feed_threshold(),
                        "push feed stale, forcing reconnect"
                    );
                    let _ = socket.close(None).await;
                }
                ReadOutcome::Closed => {
                    tracing::debug!("push feed closed by peer, reconnecting");
                }
                ReadOutcome::Failed => {
                    if Self::wait_or_cancel(backoff, &cancel).await {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                }
            }
        }

        tracing::debug!("push feed listener stopped");
    }

    async fn read_frames<S>(
        &self,
        socket: &mut tokio_tungstenite::WebSocketStream<S>,
        cancel: &CancellationToken,
    ) -> ReadOutcome
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let mut last_decoded = Instant::now();
        let mut watchdog = tokio::time::interval(self.config.watchdog_interval());
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skim the immediate first tick.
        watchdog.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return ReadOutcome::Cancelled,

                _ = watchdog.tick() => {
                    if last_decoded.elapsed() > self.config.stale_feed_threshold() {
                        return ReadOutcome::Stale;
                    }
                }

                message = socket.next() => match message {
                    None => return ReadOutcome::Closed,
                    Some(Err(err)) => {
                        tracing::warn!(%err, "push feed transport error");
                        return ReadOutcome::Failed;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match decode_frame(text.as_str()) {
                            Some(event) => {
                                last_decoded = Instant::now();
                                self.bus.publish(ReviewEvent::UserEnteredQueue {
                                    queue: event.queue,
                                    account_id: event.account_id,
                                    arrived_at: event.arrived_at,
                                });
                            }
                            None => {
                                tracing::trace!("dropping undecodable push frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => return ReadOutcome::Closed,
                    // Pings are answered by tungstenite; binary frames are
                    // not part of the wire contract.
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Sleep for `delay`, returning true if cancelled first.
    async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
