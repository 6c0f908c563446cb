//! Seams between the import pipeline and the outside world.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{ExternalRun, LocalRun, Taxon};

/// Read-only view of the external leaderboard.
#[async_trait]
pub trait ExternalSource: Send + Sync {
    /// Resolve an id or abbreviation to the source's canonical game id.
    /// `Ok(None)` means the source answered but knows no such game.
    async fn resolve_game(&self, game: &str) -> Result<Option<String>>;

    async fn list_runs(&self, game_id: &str) -> Result<Vec<ExternalRun>>;

    async fn list_categories(&self, game_id: &str) -> Result<Vec<Taxon>>;

    async fn list_levels(&self, game_id: &str) -> Result<Vec<Taxon>>;

    async fn platform_name(&self, platform_id: &str) -> Result<Option<String>>;

    async fn player_name(&self, player_id: &str) -> Result<Option<String>>;
}

/// The local leaderboard store. Append-only from the importer's side.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Taxon>>;

    async fn list_platforms(&self) -> Result<Vec<Taxon>>;

    async fn list_levels(&self) -> Result<Vec<Taxon>>;

    /// Verified entries only; these seed the content dedup set.
    async fn list_verified_runs(&self) -> Result<Vec<LocalRun>>;

    /// Every `src_run_id` already stored, verified or not.
    async fn list_imported_src_run_ids(&self) -> Result<Vec<String>>;

    /// Local player id for a display name (case-insensitive).
    async fn find_player_by_name(&self, name: &str) -> Result<Option<String>>;

    /// Insert one entry and return its new id.
    async fn insert_run(&self, run: &LocalRun) -> Result<String>;
}
