//! Order lifecycle tracking and reconciliation
//!
//! Owns the participant's own order set. Submissions and cancellations are
//! optimistic: the local view changes immediately and the action frame is
//! fired over the channel without waiting for acknowledgment. Server
//! events then reconcile, idempotently and in any arrival order, because
//! the channel may drop or replay frames across reconnects.
//!
//! Status is monotonic toward its terminal value: once an order is
//! `Executed`, `Cancelled` or `Rejected` nothing moves it again. A fill
//! arriving for a locally-cancelled order is ignored outright.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::{
    ClientFrame, OrderStatusUpdate, Side, TransactionWire, WireOrderStatus,
};

/// Prefix of client-generated temporary ids
const LOCAL_ID_PREFIX: &str = "local-";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Active,
    Executed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses never regress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Executed | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub price: f64,
    pub quantity: u32,
    pub status: OrderStatus,
}

/// A recorded trade, immutable once stored. `(bid_order_id, ask_order_id)`
/// is the uniqueness key.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub bid_order_id: String,
    pub ask_order_id: String,
    pub price: f64,
    pub quantity: u32,
    pub initiator_side: Side,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Fill notification for the view layer. Only aggressive fills queue one;
/// passive (resting) fills update order status silently.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionNotice {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub quantity: u32,
}

// ============================================================================
// Tracker
// ============================================================================

pub struct OrderLifecycleTracker {
    /// Own orders keyed by their current id (temporary until acked)
    orders: HashMap<String, Order>,
    /// Dedup set over `(bid_order_id, ask_order_id)`
    seen_transactions: HashSet<(String, String)>,
    transactions: Vec<Transaction>,
    notices: Vec<ExecutionNotice>,
    /// Signed progress toward the session goal: +qty buys, -qty sells
    goal_progress: i64,
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

impl OrderLifecycleTracker {
    /// `outbound` is the sink toward the connection manager; sends are
    /// fire-and-forget, reconciliation handles whatever comes back.
    pub fn new(outbound: mpsc::UnboundedSender<ClientFrame>) -> Self {
        Self {
            orders: HashMap::new(),
            seen_transactions: HashSet::new(),
            transactions: Vec::new(),
            notices: Vec::new(),
            goal_progress: 0,
            outbound,
        }
    }

    // ------------------------------------------------------------------
    // User actions (optimistic)
    // ------------------------------------------------------------------

    /// Submit a new order. The order appears in the active view as
    /// `Pending` immediately; the server sees it whenever the frame lands.
    pub fn submit(&mut self, side: Side, price: f64, quantity: u32) -> String {
        let local_id = format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4());
        self.orders.insert(
            local_id.clone(),
            Order {
                id: local_id.clone(),
                side,
                price,
                quantity,
                status: OrderStatus::Pending,
            },
        );
        self.send(ClientFrame::AddOrder {
            side,
            price,
            amount: quantity,
        });
        tracing::info!(order_id = %local_id, ?side, price, quantity, "order submitted");
        local_id
    }

    /// Cancel by local or server id. The order leaves the active view
    /// immediately; an unknown id is an expected race and ignored.
    pub fn cancel(&mut self, id: &str) {
        let Some(order) = self.orders.get_mut(id) else {
            // Stale action: the id was already reconciled away
            tracing::debug!(order_id = id, "cancel for untracked order ignored");
            return;
        };
        if order.status.is_terminal() {
            tracing::debug!(order_id = id, status = ?order.status, "cancel on terminal order ignored");
            return;
        }

        let was_pending = order.status == OrderStatus::Pending;
        order.status = OrderStatus::Cancelled;
        tracing::info!(order_id = id, "order cancelled locally");

        // A still-pending order has no server id yet; the cancel frame for
        // it is issued when the ack arrives (see on_order_status).
        if !was_pending {
            self.send(ClientFrame::CancelOrder { id: id.to_string() });
        }
    }

    // ------------------------------------------------------------------
    // Server reconciliation
    // ------------------------------------------------------------------

    pub fn on_order_status(&mut self, update: &OrderStatusUpdate) {
        match update.status {
            WireOrderStatus::Active => self.on_ack(update),
            WireOrderStatus::Rejected => self.on_reject(update),
            WireOrderStatus::Cancelled => self.on_cancel_ack(&update.order_id),
        }
    }

    /// Server acknowledged a submission: promote the pending order to
    /// `Active` under its server-assigned id. Exactly one promotion ever
    /// happens per local id; duplicates are no-ops.
    fn on_ack(&mut self, update: &OrderStatusUpdate) {
        let Some(local_id) = update.client_order_id.as_deref() else {
            tracing::debug!(order_id = %update.order_id, "ack without client id ignored");
            return;
        };

        let Some(mut order) = self.orders.remove(local_id) else {
            // Already promoted (replayed ack) or never ours
            tracing::debug!(order_id = %update.order_id, local_id, "ack for untracked order ignored");
            return;
        };

        order.id = update.order_id.clone();
        match order.status {
            OrderStatus::Pending => {
                order.status = OrderStatus::Active;
                tracing::info!(order_id = %update.order_id, local_id, "order active");
            }
            OrderStatus::Cancelled => {
                // Cancelled while pending: the ack must not resurrect it.
                // Now that the server id is known, ask the server to drop it.
                tracing::info!(order_id = %update.order_id, local_id, "ack for locally cancelled order, issuing cancel");
                self.send(ClientFrame::CancelOrder {
                    id: update.order_id.clone(),
                });
            }
            _ => {}
        }
        self.orders.insert(order.id.clone(), order);
    }

    fn on_reject(&mut self, update: &OrderStatusUpdate) {
        let key = update
            .client_order_id
            .as_deref()
            .filter(|id| self.orders.contains_key(*id))
            .unwrap_or(&update.order_id)
            .to_string();
        match self.orders.get_mut(&key) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Rejected;
                tracing::warn!(order_id = %key, "order rejected by server");
            }
            _ => {}
        }
    }

    fn on_cancel_ack(&mut self, order_id: &str) {
        match self.orders.get_mut(order_id) {
            // Executed is terminal: a cancel-ack crossing a fill loses
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Cancelled;
            }
            _ => {}
        }
    }

    /// Record transactions, deduplicated on `(bid_order_id, ask_order_id)`.
    pub fn on_transactions(&mut self, transactions: &[TransactionWire]) {
        for tx in transactions {
            let key = (tx.bid_order_id.clone(), tx.ask_order_id.clone());
            if !self.seen_transactions.insert(key) {
                tracing::debug!(
                    bid_order_id = %tx.bid_order_id,
                    ask_order_id = %tx.ask_order_id,
                    "duplicate transaction dropped"
                );
                continue;
            }

            self.transactions.push(Transaction {
                bid_order_id: tx.bid_order_id.clone(),
                ask_order_id: tx.ask_order_id.clone(),
                price: tx.price,
                quantity: tx.amount,
                initiator_side: tx.initiator_side,
                timestamp: tx.timestamp,
            });

            self.apply_fill(&tx.bid_order_id, Side::Buy, tx);
            self.apply_fill(&tx.ask_order_id, Side::Sell, tx);
        }
    }

    /// Apply one side of a transaction to our order set, if that side is
    /// ours. `my_side` is the side our order would have been on.
    fn apply_fill(&mut self, order_id: &str, my_side: Side, tx: &TransactionWire) {
        let Some(order) = self.orders.get_mut(order_id) else {
            return;
        };
        if order.status.is_terminal() {
            // Includes the cancelled-then-filled race: the local cancel
            // won, the fill is ignored entirely.
            tracing::debug!(order_id, status = ?order.status, "fill for terminal order ignored");
            return;
        }

        order.status = OrderStatus::Executed;
        self.goal_progress += match my_side {
            Side::Buy => i64::from(tx.amount),
            Side::Sell => -i64::from(tx.amount),
        };

        // Passive when the other side initiated: our order was resting in
        // the book. Passive fills change status without queuing a notice.
        let passive = tx.initiator_side != my_side;
        tracing::info!(order_id, ?my_side, passive, price = tx.price, "order executed");
        if !passive {
            self.notices.push(ExecutionNotice {
                order_id: order_id.to_string(),
                side: my_side,
                price: tx.price,
                quantity: tx.amount,
            });
        }
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    /// Orders still live from the participant's point of view.
    pub fn active_orders(&self) -> Vec<&Order> {
        let mut out: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn goal_progress(&self) -> i64 {
        self.goal_progress
    }

    /// Drain pending execution notices for the view layer.
    pub fn take_notices(&mut self) -> Vec<ExecutionNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Atomic per-market reset: orders, transactions, dedup set and
    /// progress are cleared together.
    pub fn reset(&mut self) {
        self.orders.clear();
        self.seen_transactions.clear();
        self.transactions.clear();
        self.notices.clear();
        self.goal_progress = 0;
    }

    fn send(&self, frame: ClientFrame) {
        // Fire-and-forget; a closed sink means the channel is down and
        // reconciliation will sort the rest out after reconnect.
        if self.outbound.send(frame).is_err() {
            tracing::warn!("outbound sink closed, action frame dropped");
        }
    }
}
