// Package rollout hot-swaps staged (`*.new`) worker binaries at controller start-up.

pub mod rollout;
pub mod staged;

mod rollout_test;

pub use rollout::{apply, reconcile, Outcome, RolloutError};
pub use staged::StagedUpdate;
