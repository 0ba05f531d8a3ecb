//! Placement prediction, proxy objectives and host scoring

mod hosts;
mod objectives;
mod placement;

pub use hosts::{score_hosts, ScoredHost};
pub use objectives::{compute_objectives, validate_weights};
pub use placement::predict;
