//! External run -> candidate local run.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::import::error::ImportError;
use crate::import::ports::ExternalSource;
use crate::import::taxonomy::{Resolution, TaxonomyKind, TaxonomyMapping};
use crate::model::{
    ExternalPlayer, ExternalRef, ExternalRun, LeaderboardType, LocalRun, RunType, UNKNOWN_PLAYER,
};
use crate::normalization::time::{extract_run_date, normalize_run_time};

const UNKNOWN_CATEGORY: &str = "Unknown Category";
const UNKNOWN_PLATFORM: &str = "Unknown Platform";
const UNKNOWN_LEVEL: &str = "Unknown Level";

/// Names looked up from the external source during one batch, keyed by
/// external id. Misses are cached too so a failing id costs one call.
#[derive(Debug, Default)]
pub struct NameCache {
    players: HashMap<String, Option<String>>,
    platforms: HashMap<String, Option<String>>,
}

impl NameCache {
    pub async fn player_name(&mut self, source: &dyn ExternalSource, id: &str) -> Option<String> {
        if let Some(hit) = self.players.get(id) {
            return hit.clone();
        }
        let name = match source.player_name(id).await {
            Ok(Some(n)) if !n.trim().is_empty() => Some(n.trim().to_string()),
            Ok(_) => {
                warn!(target = "translate", player = id, "player has no display name upstream");
                None
            }
            Err(e) => {
                warn!(target = "translate", player = id, error = %e, "player name fetch failed");
                None
            }
        };
        self.players.insert(id.to_string(), name.clone());
        name
    }

    pub async fn platform_name(
        &mut self,
        source: &dyn ExternalSource,
        id: &str,
    ) -> Option<String> {
        if let Some(hit) = self.platforms.get(id) {
            return hit.clone();
        }
        let name = match source.platform_name(id).await {
            Ok(Some(n)) if !n.trim().is_empty() => Some(n),
            Ok(_) => None,
            Err(e) => {
                warn!(target = "translate", platform = id, error = %e, "platform name fetch failed");
                None
            }
        };
        self.platforms.insert(id.to_string(), name.clone());
        name
    }
}

/// Turn one external run into a candidate record. The result is neither
/// validated nor persisted.
pub async fn translate_run(
    source: &dyn ExternalSource,
    mapping: &TaxonomyMapping,
    cache: &mut NameCache,
    run: &ExternalRun,
) -> Result<LocalRun, ImportError> {
    check_ref("category", &run.category)?;
    if let Some(p) = &run.platform {
        check_ref("platform", p)?;
    }
    if let Some(l) = &run.level {
        check_ref("level", l)?;
    }

    let mut out = LocalRun {
        verified: false,
        imported_from_src: true,
        src_run_id: Some(run.id.clone()),
        ..Default::default()
    };

    match mapping.resolve(TaxonomyKind::Category, &run.category) {
        Resolution::Local(id) => out.category_id = id,
        Resolution::Foreign(name) => out.src_category_name = Some(name),
        Resolution::Unknown => out.src_category_name = Some(UNKNOWN_CATEGORY.to_string()),
    }

    if let Some(platform) = run.platform.as_ref().filter(|p| !p.id().is_empty()) {
        match mapping.resolve(TaxonomyKind::Platform, platform) {
            Resolution::Local(id) => out.platform_id = id,
            Resolution::Foreign(name) => out.src_platform_name = Some(name),
            Resolution::Unknown => {
                let fetched = if mapping.unresolved_platforms.contains(platform.id()) {
                    None
                } else {
                    cache.platform_name(source, platform.id()).await
                };
                out.src_platform_name =
                    Some(fetched.unwrap_or_else(|| UNKNOWN_PLATFORM.to_string()));
            }
        }
    }

    if let Some(level) = &run.level {
        match mapping.resolve(TaxonomyKind::Level, level) {
            Resolution::Local(id) => out.level_id = Some(id),
            Resolution::Foreign(name) => out.src_level_name = Some(name),
            Resolution::Unknown => out.src_level_name = Some(UNKNOWN_LEVEL.to_string()),
        }
    }

    out.leaderboard_type = match run.leaderboard_type.as_deref() {
        Some(raw) => LeaderboardType::parse(raw).unwrap_or_default(),
        None if run.level.is_some() => LeaderboardType::IndividualLevel,
        None => LeaderboardType::Regular,
    };
    out.run_type = match run.run_type.as_deref() {
        Some(raw) => RunType::parse(raw).unwrap_or_default(),
        None if run.players.len() >= 2 => RunType::CoOp,
        None => RunType::Solo,
    };

    if run.players.len() > 2 {
        warn!(
            target = "translate",
            run = %run.id,
            players = run.players.len(),
            "more than two players; keeping the first two"
        );
    }
    let mut names = Vec::with_capacity(2);
    for player in run.players.iter().take(2) {
        names.push(player_name(source, cache, &run.id, player).await?);
    }
    let mut names = names.into_iter();
    out.player_name = names
        .next()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_PLAYER.to_string());
    out.player2_name = match out.run_type {
        RunType::CoOp => Some(
            names
                .next()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_PLAYER.to_string()),
        ),
        RunType::Solo => None,
    };

    out.time = run
        .time
        .as_deref()
        .and_then(normalize_run_time)
        .unwrap_or_default();
    out.date = extract_run_date(run.date.as_deref(), run.submitted.as_deref()).unwrap_or_default();
    out.video_url = non_blank(run.video_url.as_deref());
    out.comment = non_blank(run.comment.as_deref());

    debug!(
        target = "translate",
        run = %run.id,
        category = %out.category_id,
        platform = %out.platform_id,
        run_type = %out.run_type,
        leaderboard = %out.leaderboard_type,
        "translated"
    );
    Ok(out)
}

fn check_ref(field: &str, r: &ExternalRef) -> Result<(), ImportError> {
    match r {
        ExternalRef::Embedded { id, .. } if id.trim().is_empty() => Err(ImportError::Translation(
            format!("embedded {field} object has no id"),
        )),
        _ => Ok(()),
    }
}

async fn player_name(
    source: &dyn ExternalSource,
    cache: &mut NameCache,
    run_id: &str,
    player: &ExternalPlayer,
) -> Result<String, ImportError> {
    match player {
        ExternalPlayer::Guest { name } => Ok(name.trim().to_string()),
        ExternalPlayer::User { name: Some(n), .. } if !n.trim().is_empty() => {
            Ok(n.trim().to_string())
        }
        ExternalPlayer::User { id, .. } if !id.trim().is_empty() => Ok(cache
            .player_name(source, id)
            .await
            .unwrap_or_else(|| UNKNOWN_PLAYER.to_string())),
        ExternalPlayer::User { .. } => Err(ImportError::Translation(format!(
            "player reference on run {run_id} has neither id nor name"
        ))),
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
