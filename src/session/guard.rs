//! Navigation guard
//!
//! A single pure decision function over route metadata and session state,
//! evaluated in a fixed order. Side effects (the one-shot status resync,
//! the actual redirect) belong to the caller; keeping `decide` pure makes
//! every branch table-testable.

use serde::Serialize;

use crate::session::{SessionState, SessionStatus, READY_STEP};

// ============================================================================
// Types
// ============================================================================

/// Destinations the guard can send a participant to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "route")]
pub enum Route {
    /// Login / entry page; `return_to` preserves the originally requested
    /// path so it can resume after authentication.
    Entry { return_to: Option<String> },
    Consent,
    OnboardingStep { step: u8 },
    Ready,
    Trading,
    Summary,
}

/// Metadata of the route being navigated to.
#[derive(Debug, Clone, Default)]
pub struct RouteMeta {
    pub path: String,
    /// Only reachable while logged out (entry page itself)
    pub guest_only: bool,
    pub requires_auth: bool,
    pub requires_admin: bool,
    /// Only meaningful while a market is live
    pub requires_active_market: bool,
    /// Set when the route is a specific onboarding step
    pub onboarding_step: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(Route),
    /// Local state may be stale; the caller refreshes it from the server
    /// once and re-invokes `decide`.
    Resync,
}

// ============================================================================
// Decision
// ============================================================================

/// Where a participant with the given status belongs.
pub fn redirect_for_status(state: &SessionState) -> Route {
    match state.status {
        SessionStatus::Unauthenticated => Route::Entry { return_to: None },
        SessionStatus::Authenticated | SessionStatus::Onboarding => Route::Consent,
        SessionStatus::Waiting => Route::Ready,
        SessionStatus::Trading => Route::Trading,
        SessionStatus::Summary | SessionStatus::Complete => Route::Summary,
    }
}

/// Evaluate a navigation attempt. Checks run in order; the first one that
/// fires decides.
pub fn decide(route: &RouteMeta, state: &SessionState, resync_attempted: bool) -> Decision {
    let authed = state.status != SessionStatus::Unauthenticated;

    // Entry page is pointless once logged in
    if route.guest_only && authed {
        return Decision::Redirect(redirect_for_status(state));
    }

    if route.requires_auth && !authed {
        return Decision::Redirect(Route::Entry {
            return_to: Some(route.path.clone()),
        });
    }

    if route.requires_admin && !state.is_admin {
        return Decision::Redirect(Route::Entry { return_to: None });
    }

    // Market routes while we think no market is live: our state may lag
    // the server, so resync exactly once before giving up.
    if route.requires_active_market && state.status != SessionStatus::Trading {
        if !resync_attempted {
            return Decision::Resync;
        }
        return Decision::Redirect(redirect_for_status(state));
    }

    if let Some(step) = route.onboarding_step {
        // Finished onboarding: the steps are read-only history
        if state.furthest_step >= READY_STEP && step < READY_STEP {
            return Decision::Redirect(Route::Ready);
        }
        // Never skip ahead more than one past the high-water mark
        let limit = state.furthest_step.saturating_add(1).min(READY_STEP);
        if step > limit {
            return Decision::Redirect(Route::OnboardingStep { step: limit });
        }
    }

    Decision::Allow
}
