//! Session lifecycle: state machine, navigation guard, persistence

pub mod guard;
pub mod state;
pub mod store;

pub use guard::{decide, redirect_for_status, Decision, Route, RouteMeta};
pub use state::{
    RecruitmentParams, SessionState, SessionStatus, DEFAULT_MAX_MARKETS, READY_STEP,
};
pub use store::SessionStore;
