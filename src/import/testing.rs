//! In-memory source/store doubles for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::import::ports::{ExternalSource, LocalStore};
use crate::model::{ExternalPlayer, ExternalRef, ExternalRun, LocalRun, Taxon};

#[derive(Default)]
pub struct FakeSource {
    pub game_id: Option<String>,
    pub fail_resolve: bool,
    pub runs: Vec<ExternalRun>,
    pub categories: Vec<Taxon>,
    pub levels: Vec<Taxon>,
    pub platforms: HashMap<String, String>,
    pub failing_platforms: Vec<String>,
    pub players: HashMap<String, String>,
    pub platform_calls: AtomicUsize,
    pub player_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(game_id: &str) -> Self {
        Self {
            game_id: Some(game_id.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExternalSource for FakeSource {
    async fn resolve_game(&self, _game: &str) -> Result<Option<String>> {
        if self.fail_resolve {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.game_id.clone())
    }

    async fn list_runs(&self, _game_id: &str) -> Result<Vec<ExternalRun>> {
        Ok(self.runs.clone())
    }

    async fn list_categories(&self, _game_id: &str) -> Result<Vec<Taxon>> {
        Ok(self.categories.clone())
    }

    async fn list_levels(&self, _game_id: &str) -> Result<Vec<Taxon>> {
        Ok(self.levels.clone())
    }

    async fn platform_name(&self, platform_id: &str) -> Result<Option<String>> {
        self.platform_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_platforms.iter().any(|p| p == platform_id) {
            return Err(anyhow!("HTTP 503 for platform {platform_id}"));
        }
        Ok(self.platforms.get(platform_id).cloned())
    }

    async fn player_name(&self, player_id: &str) -> Result<Option<String>> {
        self.player_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.players.get(player_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub categories: Vec<Taxon>,
    pub platforms: Vec<Taxon>,
    pub levels: Vec<Taxon>,
    pub known_players: Vec<String>,
    pub fail_taxonomy: bool,
    /// Fail the existing-record listings used to seed dedup.
    pub fail_existing: bool,
    /// Inserts for these external run ids are rejected.
    pub reject_src_ids: Vec<String>,
    pub rows: Mutex<Vec<(String, LocalRun)>>,
}

impl FakeStore {
    pub fn stored(&self) -> Vec<(String, LocalRun)> {
        self.rows.lock().unwrap().clone()
    }

    /// Add an already-reviewed row, as if a moderator had verified it.
    pub fn seed_verified(&self, mut run: LocalRun) {
        run.verified = true;
        let mut rows = self.rows.lock().unwrap();
        let id = format!("seed-{}", rows.len() + 1);
        rows.push((id, run));
    }
}

#[async_trait]
impl LocalStore for FakeStore {
    async fn list_categories(&self) -> Result<Vec<Taxon>> {
        if self.fail_taxonomy {
            return Err(anyhow!("store unavailable"));
        }
        Ok(self.categories.clone())
    }

    async fn list_platforms(&self) -> Result<Vec<Taxon>> {
        Ok(self.platforms.clone())
    }

    async fn list_levels(&self) -> Result<Vec<Taxon>> {
        Ok(self.levels.clone())
    }

    async fn list_verified_runs(&self) -> Result<Vec<LocalRun>> {
        if self.fail_existing {
            return Err(anyhow!("statement timeout"));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.verified)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn list_imported_src_run_ids(&self) -> Result<Vec<String>> {
        if self.fail_existing {
            return Err(anyhow!("statement timeout"));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, r)| r.src_run_id.clone())
            .collect())
    }

    async fn find_player_by_name(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .known_players
            .iter()
            .position(|p| p.eq_ignore_ascii_case(name.trim()))
            .map(|i| format!("player-{i}")))
    }

    async fn insert_run(&self, run: &LocalRun) -> Result<String> {
        if let Some(src) = &run.src_run_id {
            if self.reject_src_ids.contains(src) {
                return Err(anyhow!("permission denied for table leaderboard_entries"));
            }
        }
        let mut rows = self.rows.lock().unwrap();
        let id = format!("local-{}", rows.len() + 1);
        rows.push((id.clone(), run.clone()));
        Ok(id)
    }
}

pub fn user(id: &str, name: &str) -> ExternalPlayer {
    ExternalPlayer::User {
        id: id.to_string(),
        name: Some(name.to_string()),
    }
}

pub fn embedded(id: &str, name: &str) -> ExternalRef {
    ExternalRef::Embedded {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// A complete, valid solo run on category `c1` / platform `p1`.
pub fn solo_run(id: &str, player: &str, time: &str) -> ExternalRun {
    let mut run = ExternalRun::new(id, embedded("c1", "Any%"));
    run.platform = Some(embedded("p1", "PC"));
    run.players = vec![user(&format!("u-{player}"), player)];
    run.time = Some(time.to_string());
    run.date = Some("2024-03-01".to_string());
    run
}

/// A complete, valid co-op run with two named players.
pub fn coop_run(id: &str, p1: &str, p2: &str, time: &str) -> ExternalRun {
    let mut run = solo_run(id, p1, time);
    run.players.push(user(&format!("u-{p2}"), p2));
    run.run_type = Some("co-op".to_string());
    run
}

pub fn local_taxonomy_store() -> FakeStore {
    FakeStore {
        categories: vec![Taxon::new("cat-any", "Any%"), Taxon::new("cat-100", "100%")],
        platforms: vec![Taxon::new("plat-pc", "PC")],
        levels: vec![Taxon::new("lvl-1", "Negotiations")],
        ..Default::default()
    }
}

pub fn source_with_taxonomy(runs: Vec<ExternalRun>) -> FakeSource {
    FakeSource {
        runs,
        categories: vec![Taxon::new("c1", "Any%"), Taxon::new("c9", "Glitchless")],
        levels: vec![Taxon::new("l1", "negotiations"), Taxon::new("l2", "Droid Factory")],
        ..FakeSource::new("g1")
    }
}
