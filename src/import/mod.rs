//! speedrun.com -> local leaderboard reconciliation.

pub mod dedup;
pub mod error;
pub mod ports;
pub mod session;
pub mod taxonomy;
pub mod translate;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ImportError;
pub use ports::{ExternalSource, LocalStore};
pub use session::{import, ImportOptions, ImportSession};
pub use taxonomy::TaxonomyMapping;
