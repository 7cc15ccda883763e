//! Participant session state machine
//!
//! Linear flow: unauthenticated -> authenticated -> onboarding (steps
//! 0..=7) -> waiting -> trading -> summary, looping back through waiting
//! for each additional market until the budget is spent, then complete.
//! Transitions are defensive: out-of-order inputs clamp rather than panic.

use serde::{Deserialize, Serialize};

/// Final onboarding step, "ready to trade"
pub const READY_STEP: u8 = 7;

/// Markets per session unless configured otherwise
pub const DEFAULT_MAX_MARKETS: u32 = 4;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    Onboarding,
    Waiting,
    Trading,
    Summary,
    Complete,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Unauthenticated
    }
}

/// Recruitment-platform passthrough parameters, captured at entry and
/// echoed back on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitmentParams {
    #[serde(default)]
    pub participant_code: Option<String>,
    #[serde(default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub submission_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Current onboarding step, 0..=READY_STEP
    pub onboarding_step: u8,
    /// High-water mark over every step ever reached; never decreases
    pub furthest_step: u8,
    pub is_admin: bool,
    #[serde(default)]
    pub market_id: Option<String>,
    pub markets_completed: u32,
    #[serde(default = "default_max_markets")]
    pub max_markets: u32,
    #[serde(default)]
    pub recruitment: RecruitmentParams,
}

fn default_max_markets() -> u32 {
    DEFAULT_MAX_MARKETS
}

// ============================================================================
// Transitions
// ============================================================================

impl SessionState {
    pub fn new(max_markets: u32) -> Self {
        Self {
            max_markets,
            ..Self::default()
        }
    }

    /// Credentials accepted. Admins skip onboarding entirely and land in
    /// the waiting room at the ready step.
    pub fn authenticated(&mut self, is_admin: bool) {
        self.is_admin = is_admin;
        if is_admin {
            self.onboarding_step = READY_STEP;
            self.furthest_step = READY_STEP;
            self.status = SessionStatus::Waiting;
            tracing::info!("admin authenticated, onboarding bypassed");
        } else {
            self.status = SessionStatus::Authenticated;
        }
    }

    pub fn begin_onboarding(&mut self) {
        if self.status == SessionStatus::Authenticated {
            self.status = SessionStatus::Onboarding;
        }
    }

    /// Move one step forward, capped at the ready step. Reaching the cap
    /// transitions to the waiting room.
    pub fn advance_step(&mut self) {
        if self.status != SessionStatus::Onboarding {
            tracing::debug!(status = ?self.status, "advance_step outside onboarding ignored");
            return;
        }
        self.onboarding_step = (self.onboarding_step + 1).min(READY_STEP);
        self.furthest_step = self.furthest_step.max(self.onboarding_step);
        if self.onboarding_step == READY_STEP {
            self.status = SessionStatus::Waiting;
            tracing::info!("onboarding finished, entering waiting room");
        }
    }

    /// Jump to an already-visited step. The target clamps to one past the
    /// furthest step reached; the high-water mark never lowers.
    pub fn go_to_step(&mut self, step: u8) {
        if self.status != SessionStatus::Onboarding {
            return;
        }
        self.onboarding_step = step
            .min(self.furthest_step.saturating_add(1))
            .min(READY_STEP);
        self.furthest_step = self.furthest_step.max(self.onboarding_step);
    }

    pub fn market_started(&mut self, market_id: Option<String>) {
        if !matches!(self.status, SessionStatus::Waiting | SessionStatus::Trading) {
            tracing::warn!(status = ?self.status, "market start while not waiting");
        }
        self.market_id = market_id;
        self.status = SessionStatus::Trading;
    }

    pub fn market_ended(&mut self) {
        if self.status != SessionStatus::Trading {
            return;
        }
        self.markets_completed += 1;
        self.status = SessionStatus::Summary;
        tracing::info!(
            markets_completed = self.markets_completed,
            max_markets = self.max_markets,
            "market ended"
        );
    }

    pub fn has_budget_remaining(&self) -> bool {
        self.markets_completed < self.max_markets
    }

    /// From the summary screen, re-enter the waiting room for the next
    /// market. Refused once the market budget is spent; `Complete` is only
    /// ever reached through the explicit [`complete_study`] action.
    ///
    /// [`complete_study`]: SessionState::complete_study
    pub fn start_next_market(&mut self) {
        if self.status != SessionStatus::Summary {
            return;
        }
        if !self.has_budget_remaining() {
            tracing::debug!(
                markets_completed = self.markets_completed,
                max_markets = self.max_markets,
                "market budget spent, staying in summary"
            );
            return;
        }
        self.market_id = None;
        self.status = SessionStatus::Waiting;
    }

    pub fn complete_study(&mut self) {
        self.status = SessionStatus::Complete;
        self.market_id = None;
    }

    /// Back to a blank slate, keeping only configuration.
    pub fn reset(&mut self) {
        *self = Self::new(self.max_markets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onboarding_state() -> SessionState {
        let mut state = SessionState::new(DEFAULT_MAX_MARKETS);
        state.authenticated(false);
        state.begin_onboarding();
        state
    }

    #[test]
    fn test_admin_bypasses_onboarding() {
        let mut state = SessionState::new(DEFAULT_MAX_MARKETS);
        state.authenticated(true);
        assert_eq!(state.status, SessionStatus::Waiting);
        assert_eq!(state.onboarding_step, READY_STEP);
        assert_eq!(state.furthest_step, READY_STEP);
    }

    #[test]
    fn test_advance_caps_at_ready_and_enters_waiting() {
        let mut state = onboarding_state();
        for _ in 0..20 {
            state.advance_step();
        }
        assert_eq!(state.onboarding_step, READY_STEP);
        assert_eq!(state.status, SessionStatus::Waiting);
    }

    #[test]
    fn test_furthest_step_is_monotonic() {
        let mut state = onboarding_state();
        state.advance_step();
        state.advance_step();
        state.advance_step();
        assert_eq!(state.furthest_step, 3);

        state.go_to_step(1);
        assert_eq!(state.onboarding_step, 1);
        assert_eq!(state.furthest_step, 3);
    }

    #[test]
    fn test_go_to_step_clamps_forward_jump() {
        let mut state = onboarding_state();
        state.advance_step();
        assert_eq!(state.furthest_step, 1);

        state.go_to_step(6);
        assert_eq!(state.onboarding_step, 2);
        assert_eq!(state.furthest_step, 2);
    }

    #[test]
    fn test_market_cycle_and_budget() {
        let mut state = SessionState::new(2);
        state.authenticated(true);

        state.market_started(Some("m1".to_string()));
        assert_eq!(state.status, SessionStatus::Trading);
        state.market_ended();
        assert_eq!(state.status, SessionStatus::Summary);
        assert_eq!(state.markets_completed, 1);

        state.start_next_market();
        assert_eq!(state.status, SessionStatus::Waiting);
        assert!(state.market_id.is_none());

        state.market_started(Some("m2".to_string()));
        state.market_ended();
        // Budget spent: another market is refused, summary holds
        state.start_next_market();
        assert_eq!(state.status, SessionStatus::Summary);
        assert!(!state.has_budget_remaining());
    }

    #[test]
    fn test_complete_only_via_explicit_action() {
        let mut state = SessionState::new(1);
        state.authenticated(true);
        state.market_started(None);
        state.market_ended();

        state.start_next_market();
        assert_eq!(state.status, SessionStatus::Summary);

        state.complete_study();
        assert_eq!(state.status, SessionStatus::Complete);
    }

    #[test]
    fn test_market_ended_outside_trading_is_ignored() {
        let mut state = onboarding_state();
        state.market_ended();
        assert_eq!(state.markets_completed, 0);
        assert_eq!(state.status, SessionStatus::Onboarding);
    }

    #[test]
    fn test_reset_keeps_configuration() {
        let mut state = SessionState::new(3);
        state.authenticated(true);
        state.market_started(None);
        state.reset();
        assert_eq!(state.status, SessionStatus::Unauthenticated);
        assert_eq!(state.max_markets, 3);
        assert_eq!(state.markets_completed, 0);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = SessionState::new(DEFAULT_MAX_MARKETS);
        state.authenticated(false);
        state.begin_onboarding();
        state.advance_step();
        state.recruitment.participant_code = Some("P123".to_string());

        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
