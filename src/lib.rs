//! Reconciles an external speedrun leaderboard (speedrun.com) into the
//! site's own leaderboard database.

pub mod import;
pub mod model;
pub mod providers;
pub mod scoring;
pub mod store;
pub mod tracing;

pub mod normalization {
    pub mod name;
    pub mod time;
}

pub mod util {
    pub mod env;
}

pub use import::{import, ImportError, ImportOptions, ImportSession};
pub use model::ImportResult;
