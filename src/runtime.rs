//! Client runtime
//!
//! Owns every stateful component and drives them from a single `select!`
//! loop: channel events, user actions, the tracker's outbound frames and
//! the attribute poll tick all funnel through one task, so no two
//! handlers ever run concurrently and no mutation needs a lock.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::book::{OrderBookAggregator, OrderBookView};
use crate::config::ClientConfig;
use crate::connection::{
    AttributeUpdate, ClientEvent, ClientFrame, ConnectionManager, ServerEvent, Side,
};
use crate::error::Result;
use crate::orders::OrderLifecycleTracker;
use crate::session::{
    self, Decision, RouteMeta, SessionState, SessionStore,
};
use crate::trader::TraderAttributes;

// ============================================================================
// Actions and handle
// ============================================================================

#[derive(Debug, Clone)]
pub enum UserAction {
    Submit { side: Side, price: f64, quantity: u32 },
    Cancel { id: String },
    /// Explicit restart signal after a hold or connectivity loss
    Reconnect,
}

/// Cheap clonable handle for feeding actions into the runtime loop.
#[derive(Clone)]
pub struct RuntimeHandle {
    actions: mpsc::UnboundedSender<UserAction>,
    shutdown: CancellationToken,
}

impl RuntimeHandle {
    pub fn submit(&self, side: Side, price: f64, quantity: u32) {
        let _ = self.actions.send(UserAction::Submit { side, price, quantity });
    }

    pub fn cancel(&self, id: String) {
        let _ = self.actions.send(UserAction::Cancel { id });
    }

    pub fn reconnect(&self) {
        let _ = self.actions.send(UserAction::Reconnect);
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

// ============================================================================
// Runtime
// ============================================================================

pub struct ClientRuntime {
    config: ClientConfig,
    participant_id: String,
    connection: ConnectionManager,
    api: ApiClient,
    pub book: OrderBookAggregator,
    /// Latest derived display view, rebuilt on every depth snapshot
    pub book_view: OrderBookView,
    pub tracker: OrderLifecycleTracker,
    pub session: SessionState,
    pub attributes: TraderAttributes,
    /// Reason for the server-side hold, while one is in effect
    pub held_reason: Option<String>,
    /// Set when the reconnect budget was exhausted; cleared on the next
    /// successful handshake
    pub connectivity_lost: bool,
    store: SessionStore,
    outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
    actions_rx: mpsc::UnboundedReceiver<UserAction>,
    shutdown: CancellationToken,
}

impl ClientRuntime {
    pub fn new(
        config: ClientConfig,
        participant_id: impl Into<String>,
        connection: ConnectionManager,
    ) -> (Self, RuntimeHandle) {
        let participant_id = participant_id.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let handle = RuntimeHandle {
            actions: actions_tx,
            shutdown: shutdown.clone(),
        };
        let runtime = Self {
            api: ApiClient::new(config.http_url.clone()),
            book: OrderBookAggregator::new(config.book.clone()),
            book_view: OrderBookView::default(),
            tracker: OrderLifecycleTracker::new(outbound_tx),
            session: SessionState::new(config.max_markets),
            attributes: TraderAttributes::default(),
            held_reason: None,
            connectivity_lost: false,
            store: SessionStore::new(config.state_dir.clone()),
            config,
            participant_id,
            connection,
            outbound_rx,
            actions_rx,
            shutdown,
        };
        (runtime, handle)
    }

    /// Connect, restore any persisted session, then run the event loop
    /// until shutdown or an intentional close.
    pub async fn run(&mut self) -> Result<()> {
        if let Some(saved) = self.store.load(&self.participant_id)? {
            tracing::info!(status = ?saved.status, "restored persisted session");
            self.session = saved;
        }

        let mut events = self.connection.subscribe();
        self.connection.connect(&self.participant_id).await?;

        let mut poll = tokio::time::interval(std::time::Duration::from_secs(
            self.config.attribute_poll_secs,
        ));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested");
                    self.connection.disconnect().await;
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(ClientEvent::Closed) => break,
                        Ok(event) => self.handle_event(event)?,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "event receiver lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(action) = self.actions_rx.recv() => self.handle_action(action).await,
                Some(frame) = self.outbound_rx.recv() => {
                    if let Err(err) = self.connection.send(&frame).await {
                        tracing::warn!(%err, "dropped outbound frame");
                    }
                }
                _ = poll.tick() => {
                    self.poll_attributes().await;
                    self.resume_if_held().await;
                }
            }
        }
        Ok(())
    }

    async fn handle_action(&mut self, action: UserAction) {
        match action {
            UserAction::Submit { side, price, quantity } => {
                self.tracker.submit(side, price, quantity);
            }
            UserAction::Cancel { id } => self.tracker.cancel(&id),
            UserAction::Reconnect => {
                if let Err(err) = self.connection.connect(&self.participant_id).await {
                    tracing::warn!(%err, "requested reconnect failed");
                }
            }
        }
    }

    fn handle_event(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Ready => {
                self.held_reason = None;
                self.connectivity_lost = false;
                tracing::info!("channel ready");
            }
            ClientEvent::SessionHeld { reason } => {
                tracing::info!(reason, "session held by server, polling for resumption");
                self.held_reason = Some(reason);
            }
            ClientEvent::ConnectivityLost => {
                tracing::error!("connectivity lost after exhausting reconnect attempts");
                self.connectivity_lost = true;
            }
            ClientEvent::Closed => {}
            ClientEvent::Server(event) => self.handle_server_event(event)?,
        }
        Ok(())
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::Book(snapshot) => {
                self.book_view = self.book.apply_snapshot(&snapshot);
            }
            ServerEvent::OrderStatus(update) => self.tracker.on_order_status(&update),
            ServerEvent::Transactions(batch) => {
                self.tracker.on_transactions(&batch.transactions);
            }
            ServerEvent::MarketStarted(started) => {
                self.reset_for_market(started.market_id);
                self.store.save(&self.participant_id, &self.session)?;
            }
            ServerEvent::MarketEnded => {
                self.session.market_ended();
                self.store.save(&self.participant_id, &self.session)?;
            }
            ServerEvent::Attributes(update) => {
                self.attributes.apply_live(&update, now_ms());
            }
            ServerEvent::TraderIdConfirmed(confirmation) => {
                tracing::info!(trader_id = %confirmation.trader_id, "trader id confirmed");
            }
            ServerEvent::TraderCount(count) => {
                tracing::debug!(
                    current = count.current,
                    expected = count.expected,
                    "waiting room count"
                );
            }
            ServerEvent::MarketStatus(status) | ServerEvent::TraderStatus(status) => {
                tracing::debug!(status, "status update");
            }
            ServerEvent::Time(_) | ServerEvent::Advice(_) => {}
        }
        Ok(())
    }

    /// Per-market reset: book, tracker and per-market session fields clear
    /// together before any event from the new market is admitted.
    fn reset_for_market(&mut self, market_id: Option<String>) {
        self.book.reset();
        self.book_view = OrderBookView::default();
        self.tracker.reset();
        self.session.market_started(market_id);
        tracing::info!(market_id = ?self.session.market_id, "market started, state reset");
    }

    async fn poll_attributes(&mut self) {
        match self.api.trader_info(&self.participant_id).await {
            Ok(info) => {
                let snapshot = AttributeUpdate {
                    goal: info.goal,
                    goal_progress: info.goal_progress,
                    shares: info.shares,
                    cash: info.cash,
                };
                let effective_ms = info.as_of_ms.unwrap_or_else(now_ms);
                self.attributes.apply_poll(&snapshot, effective_ms);
            }
            Err(err) => tracing::warn!(%err, "attribute poll failed"),
        }
    }

    /// While the server holds the session, poll its status over HTTP and
    /// reopen the channel once the hold has resolved. The `Ready` event of
    /// the new channel clears the hold flag.
    async fn resume_if_held(&mut self) {
        if self.held_reason.is_none() {
            return;
        }
        match self.api.session_status(&self.participant_id).await {
            Ok(status) => {
                let resumable = status.market_id.is_some()
                    || matches!(
                        status.status,
                        crate::session::SessionStatus::Trading
                            | crate::session::SessionStatus::Summary
                    );
                if !resumable {
                    tracing::debug!(status = ?status.status, "session still held");
                    return;
                }
                self.session.status = status.status;
                self.session.market_id = status.market_id;
                if let Err(err) = self.connection.connect(&self.participant_id).await {
                    tracing::warn!(%err, "resume connect failed, will retry on next poll");
                }
            }
            Err(err) => tracing::warn!(%err, "hold status poll failed"),
        }
    }

    /// Navigation with the guard's one-shot resync: when local state may
    /// lag the server, refresh it once over HTTP and decide again.
    pub async fn navigate(&mut self, route: &RouteMeta) -> Result<Decision> {
        match session::decide(route, &self.session, false) {
            Decision::Resync => {
                match self.api.session_status(&self.participant_id).await {
                    Ok(status) => {
                        self.session.status = status.status;
                        self.session.market_id = status.market_id;
                    }
                    Err(err) => tracing::warn!(%err, "status resync failed"),
                }
                Ok(session::decide(route, &self.session, true))
            }
            decision => Ok(decision),
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
