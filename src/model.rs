//! Record shapes shared by the import pipeline, the store and the scoring code.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder written when a player name cannot be resolved.
pub const UNKNOWN_PLAYER: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    #[default]
    Solo,
    CoOp,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Solo => "solo",
            RunType::CoOp => "co-op",
        }
    }

    /// Case-insensitive parse; `None` for anything outside `solo`/`co-op`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "solo" => Some(RunType::Solo),
            "co-op" | "coop" => Some(RunType::CoOp),
            _ => None,
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderboardType {
    #[default]
    Regular,
    IndividualLevel,
    CommunityGolds,
}

impl LeaderboardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardType::Regular => "regular",
            LeaderboardType::IndividualLevel => "individual-level",
            LeaderboardType::CommunityGolds => "community-golds",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "regular" => Some(LeaderboardType::Regular),
            "individual-level" => Some(LeaderboardType::IndividualLevel),
            "community-golds" => Some(LeaderboardType::CommunityGolds),
            _ => None,
        }
    }

    /// IL and community-golds boards are keyed by level.
    pub fn requires_level(&self) -> bool {
        !matches!(self, LeaderboardType::Regular)
    }
}

impl fmt::Display for LeaderboardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A taxonomy reference as served by the external source: either a bare id or
/// an embedded object that already carries the display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalRef {
    ById(String),
    Embedded { id: String, name: String },
}

impl ExternalRef {
    pub fn id(&self) -> &str {
        match self {
            ExternalRef::ById(id) => id,
            ExternalRef::Embedded { id, .. } => id,
        }
    }

    pub fn embedded_name(&self) -> Option<&str> {
        match self {
            ExternalRef::ById(_) => None,
            ExternalRef::Embedded { name, .. } => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalPlayer {
    /// Registered account; `name` is present only when the source embedded it.
    User { id: String, name: Option<String> },
    Guest { name: String },
}

/// One run record from the external leaderboard. Read-only to the importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRun {
    pub id: String,
    pub category: ExternalRef,
    pub platform: Option<ExternalRef>,
    pub level: Option<ExternalRef>,
    pub players: Vec<ExternalPlayer>,
    pub time: Option<String>,
    pub date: Option<String>,
    pub submitted: Option<String>,
    pub video_url: Option<String>,
    pub comment: Option<String>,
    pub run_type: Option<String>,
    pub leaderboard_type: Option<String>,
}

impl ExternalRun {
    /// Minimal record with only the required references set.
    pub fn new(id: impl Into<String>, category: ExternalRef) -> Self {
        Self {
            id: id.into(),
            category,
            platform: None,
            level: None,
            players: Vec::new(),
            time: None,
            date: None,
            submitted: None,
            video_url: None,
            comment: None,
            run_type: None,
            leaderboard_type: None,
        }
    }
}

/// A category, platform or level: local, or as listed by the external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: String,
    pub name: String,
}

impl Taxon {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Canonical leaderboard entry.
///
/// Local ids are empty strings when the external taxonomy had no local match;
/// the matching `src_*_name` field then carries the foreign label.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRun {
    pub player_name: String,
    pub player2_name: Option<String>,
    pub category_id: String,
    pub src_category_name: Option<String>,
    pub platform_id: String,
    pub src_platform_name: Option<String>,
    pub level_id: Option<String>,
    pub src_level_name: Option<String>,
    pub run_type: RunType,
    pub leaderboard_type: LeaderboardType,
    pub time: String,
    pub date: String,
    pub video_url: Option<String>,
    pub comment: Option<String>,
    pub verified: bool,
    #[serde(rename = "importedFromSRC")]
    pub imported_from_src: bool,
    pub src_run_id: Option<String>,
}

/// Player names on a freshly imported record that matched no local player.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedPlayers {
    pub player1: Option<String>,
    pub player2: Option<String>,
}

impl UnmatchedPlayers {
    pub fn is_empty(&self) -> bool {
        self.player1.is_none() && self.player2.is_none()
    }
}

/// Outcome of one import batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    /// New local record id -> players that need manual linking.
    pub unmatched_players: BTreeMap<String, UnmatchedPlayers>,
    /// `"<external run id>: <message>"`, in processing order.
    pub errors: Vec<String>,
}
