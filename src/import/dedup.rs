//! Content identity for leaderboard entries.
//!
//! Two records are the same submission when players, taxonomy, run type, time,
//! board and level all agree. Co-op records also match with the players
//! swapped.

use std::collections::HashSet;

use crate::model::{LocalRun, RunType};
use crate::normalization::name::normalize;
use crate::normalization::time::normalize_run_time;

/// Local id, or the normalized foreign label when the taxonomy was unmapped.
fn taxon_part(local_id: Option<&str>, foreign: Option<&str>) -> String {
    match (local_id.map(str::trim).filter(|s| !s.is_empty()), foreign) {
        (Some(id), _) => id.to_string(),
        (None, Some(name)) if !name.trim().is_empty() => format!("src:{}", normalize(name)),
        _ => String::new(),
    }
}

/// `HH:MM:SS` when the time parses, so `1:00:00` and `01:00:00` agree.
fn time_part(raw: &str) -> String {
    normalize_run_time(raw).unwrap_or_else(|| raw.trim().to_string())
}

fn key_with_players(run: &LocalRun, p1: &str, p2: &str) -> String {
    [
        normalize(p1),
        normalize(p2),
        taxon_part(Some(&run.category_id), run.src_category_name.as_deref()),
        taxon_part(Some(&run.platform_id), run.src_platform_name.as_deref()),
        run.run_type.as_str().to_string(),
        time_part(&run.time),
        run.leaderboard_type.as_str().to_string(),
        taxon_part(run.level_id.as_deref(), run.src_level_name.as_deref()),
    ]
    .join("|")
}

pub fn identity_key(run: &LocalRun) -> String {
    key_with_players(
        run,
        &run.player_name,
        run.player2_name.as_deref().unwrap_or(""),
    )
}

/// The player-swapped key for co-op records; `None` for solo.
pub fn swapped_identity_key(run: &LocalRun) -> Option<String> {
    match run.run_type {
        RunType::CoOp => Some(key_with_players(
            run,
            run.player2_name.as_deref().unwrap_or(""),
            &run.player_name,
        )),
        RunType::Solo => None,
    }
}

/// Identity keys seen so far in one batch: stored verified records first,
/// then every record this batch imports.
#[derive(Debug, Default)]
pub struct DedupSet {
    keys: HashSet<String>,
}

impl DedupSet {
    pub fn seeded<'a>(runs: impl IntoIterator<Item = &'a LocalRun>) -> Self {
        let mut set = Self::default();
        for run in runs {
            set.insert(run);
        }
        set
    }

    pub fn is_duplicate(&self, run: &LocalRun) -> bool {
        if self.keys.contains(&identity_key(run)) {
            return true;
        }
        swapped_identity_key(run).is_some_and(|k| self.keys.contains(&k))
    }

    pub fn insert(&mut self, run: &LocalRun) {
        self.keys.insert(identity_key(run));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
