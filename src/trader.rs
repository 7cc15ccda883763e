//! Trader attributes with a freshness overlay
//!
//! Two sources feed the same fields: live channel pushes and the periodic
//! HTTP poll. A live update always wins and stamps its arrival time; a
//! polled snapshot only applies when its effective time is newer than the
//! last live stamp. Freshness, not arrival order, decides.

use serde::Serialize;

use crate::connection::AttributeUpdate;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraderAttributes {
    pub goal: Option<i64>,
    pub goal_progress: Option<i64>,
    pub initial_shares: Option<f64>,
    pub initial_cash: Option<f64>,
    /// Wall-clock ms of the last live update, 0 before any
    pub last_live_ms: u64,
}

impl TraderAttributes {
    /// Overlay a live channel update. Only fields the update carries
    /// change; everything else keeps its current value.
    pub fn apply_live(&mut self, update: &AttributeUpdate, now_ms: u64) {
        self.overlay(update);
        self.last_live_ms = now_ms;
        tracing::debug!(now_ms, "live attribute update applied");
    }

    /// Overlay a polled snapshot, but only if it is fresher than the last
    /// live update. Returns whether it applied.
    pub fn apply_poll(&mut self, snapshot: &AttributeUpdate, effective_ms: u64) -> bool {
        if effective_ms <= self.last_live_ms {
            tracing::debug!(
                effective_ms,
                last_live_ms = self.last_live_ms,
                "stale polled snapshot discarded"
            );
            return false;
        }
        self.overlay(snapshot);
        true
    }

    fn overlay(&mut self, update: &AttributeUpdate) {
        if let Some(goal) = update.goal {
            self.goal = Some(goal);
        }
        if let Some(progress) = update.goal_progress {
            self.goal_progress = Some(progress);
        }
        if let Some(shares) = update.shares {
            self.initial_shares = Some(shares);
        }
        if let Some(cash) = update.cash {
            self.initial_cash = Some(cash);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
