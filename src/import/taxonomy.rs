//! Translation tables between the external source's taxonomy and ours.
//!
//! Built once per batch from the runs actually being imported. Nothing here
//! survives past the batch that built it.

use std::collections::{BTreeSet, HashMap, HashSet};

use futures::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::import::error::ImportError;
use crate::import::ports::{ExternalSource, LocalStore};
use crate::model::{ExternalRef, ExternalRun, Taxon};
use crate::normalization::name::NameKey;

#[derive(Debug, Clone, Default)]
pub struct TaxonomyMapping {
    pub game_id: String,
    /// External id -> local id, only for name matches.
    pub category_mapping: HashMap<String, String>,
    pub platform_mapping: HashMap<String, String>,
    pub level_mapping: HashMap<String, String>,
    /// Normalized external name -> local id.
    pub category_name_mapping: HashMap<NameKey, String>,
    pub platform_name_mapping: HashMap<NameKey, String>,
    pub level_name_mapping: HashMap<NameKey, String>,
    /// External id -> external display name, matched locally or not.
    pub src_category_id_to_name: HashMap<String, String>,
    pub src_platform_id_to_name: HashMap<String, String>,
    pub src_level_id_to_name: HashMap<String, String>,
    /// Platform ids whose name backfill failed; not retried within the batch.
    pub unresolved_platforms: HashSet<String>,
}

/// Which taxonomy family a lookup concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyKind {
    Category,
    Platform,
    Level,
}

impl TaxonomyKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyKind::Category => "category",
            TaxonomyKind::Platform => "platform",
            TaxonomyKind::Level => "level",
        }
    }
}

/// How one external reference resolved against the local taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Local(String),
    /// No local match; carry the external label.
    Foreign(String),
    /// No local match and no known label either.
    Unknown,
}

impl TaxonomyMapping {
    fn tables(
        &self,
        kind: TaxonomyKind,
    ) -> (
        &HashMap<String, String>,
        &HashMap<NameKey, String>,
        &HashMap<String, String>,
    ) {
        match kind {
            TaxonomyKind::Category => (
                &self.category_mapping,
                &self.category_name_mapping,
                &self.src_category_id_to_name,
            ),
            TaxonomyKind::Platform => (
                &self.platform_mapping,
                &self.platform_name_mapping,
                &self.src_platform_id_to_name,
            ),
            TaxonomyKind::Level => (
                &self.level_mapping,
                &self.level_name_mapping,
                &self.src_level_id_to_name,
            ),
        }
    }

    /// Resolve by id mapping, then by normalized name, then fall back to the
    /// foreign label.
    pub fn resolve(&self, kind: TaxonomyKind, reference: &ExternalRef) -> Resolution {
        let (by_id, by_name, id_to_name) = self.tables(kind);
        if let Some(local) = by_id.get(reference.id()) {
            return Resolution::Local(local.clone());
        }
        let name = reference
            .embedded_name()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| id_to_name.get(reference.id()).map(String::as_str));
        match name {
            Some(name) => match by_name.get(&NameKey::new(name)) {
                Some(local) => Resolution::Local(local.clone()),
                None => Resolution::Foreign(name.to_string()),
            },
            None => Resolution::Unknown,
        }
    }

    pub fn foreign_name(&self, kind: TaxonomyKind, external_id: &str) -> Option<&str> {
        self.tables(kind).2.get(external_id).map(String::as_str)
    }
}

/// Resolve the configured game to the source's id.
///
/// An unknown game is a configuration problem; an unreachable source is a
/// fetch problem. Both abort the batch.
pub async fn resolve_game(
    source: &dyn ExternalSource,
    game: &str,
) -> Result<String, ImportError> {
    let game = game.trim();
    if game.is_empty() {
        return Err(ImportError::Configuration(
            "no external game configured".into(),
        ));
    }
    match source.resolve_game(game).await {
        Ok(Some(id)) if !id.trim().is_empty() => Ok(id),
        Ok(_) => Err(ImportError::Configuration(format!(
            "external game '{game}' could not be resolved"
        ))),
        Err(e) => Err(ImportError::fetch("resolve external game", e)),
    }
}

/// Build the per-batch mapping for `runs`.
///
/// `concurrency` bounds the platform-name backfill fan-out.
pub async fn build_mapping(
    source: &dyn ExternalSource,
    store: &dyn LocalStore,
    game_id: &str,
    runs: &[ExternalRun],
    concurrency: usize,
) -> Result<TaxonomyMapping, ImportError> {
    let (local_categories, local_platforms, local_levels, src_categories, src_levels) =
        futures::try_join!(
            async {
                store
                    .list_categories()
                    .await
                    .map_err(|e| ImportError::fetch("list local categories", e))
            },
            async {
                store
                    .list_platforms()
                    .await
                    .map_err(|e| ImportError::fetch("list local platforms", e))
            },
            async {
                store
                    .list_levels()
                    .await
                    .map_err(|e| ImportError::fetch("list local levels", e))
            },
            async {
                source
                    .list_categories(game_id)
                    .await
                    .map_err(|e| ImportError::fetch("list external categories", e))
            },
            async {
                source
                    .list_levels(game_id)
                    .await
                    .map_err(|e| ImportError::fetch("list external levels", e))
            },
        )?;

    let mut mapping = TaxonomyMapping {
        game_id: game_id.to_string(),
        ..Default::default()
    };

    let platform_names = collect_platform_names(source, runs, concurrency).await;
    mapping.unresolved_platforms = platform_names.unresolved;

    let local_category_index = index_by_name(&local_categories);
    let local_platform_index = index_by_name(&local_platforms);
    let local_level_index = index_by_name(&local_levels);

    let embedded_categories = runs.iter().map(|r| &r.category);
    let categories = merge_listing(&src_categories, embedded_categories);
    for (id, name) in categories {
        match_into(
            &id,
            &name,
            &local_category_index,
            &mut mapping.category_mapping,
            &mut mapping.category_name_mapping,
        );
        mapping.src_category_id_to_name.insert(id, name);
    }

    let embedded_levels = runs.iter().filter_map(|r| r.level.as_ref());
    let levels = merge_listing(&src_levels, embedded_levels);
    for (id, name) in levels {
        match_into(
            &id,
            &name,
            &local_level_index,
            &mut mapping.level_mapping,
            &mut mapping.level_name_mapping,
        );
        mapping.src_level_id_to_name.insert(id, name);
    }

    for (id, name) in platform_names.resolved {
        match_into(
            &id,
            &name,
            &local_platform_index,
            &mut mapping.platform_mapping,
            &mut mapping.platform_name_mapping,
        );
        mapping.src_platform_id_to_name.insert(id, name);
    }

    for run in runs {
        if !mapping.src_category_id_to_name.contains_key(run.category.id()) {
            warn!(
                target = "taxonomy",
                run = %run.id,
                category = run.category.id(),
                "category not listed for game and not embedded; no label available"
            );
        }
    }

    info!(
        target = "taxonomy",
        game = game_id,
        categories = mapping.src_category_id_to_name.len(),
        categories_matched = mapping.category_mapping.len(),
        platforms = mapping.src_platform_id_to_name.len(),
        platforms_matched = mapping.platform_mapping.len(),
        platforms_unresolved = mapping.unresolved_platforms.len(),
        levels = mapping.src_level_id_to_name.len(),
        levels_matched = mapping.level_mapping.len(),
        "taxonomy mapping built"
    );
    Ok(mapping)
}

fn index_by_name(local: &[Taxon]) -> HashMap<NameKey, String> {
    let mut out = HashMap::with_capacity(local.len());
    for t in local {
        let key = NameKey::new(&t.name);
        if key.is_empty() {
            continue;
        }
        // First local row wins on duplicate names.
        out.entry(key).or_insert_with(|| t.id.clone());
    }
    out
}

/// Listing entries plus any embedded references the listing missed.
fn merge_listing<'a>(
    listing: &[Taxon],
    embedded: impl Iterator<Item = &'a ExternalRef>,
) -> Vec<(String, String)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(listing.len());
    for t in listing {
        if !t.id.is_empty() && seen.insert(t.id.clone()) {
            out.push((t.id.clone(), t.name.clone()));
        }
    }
    for r in embedded {
        if let ExternalRef::Embedded { id, name } = r {
            if !id.is_empty() && seen.insert(id.clone()) {
                out.push((id.clone(), name.clone()));
            }
        }
    }
    out
}

fn match_into(
    external_id: &str,
    external_name: &str,
    local_index: &HashMap<NameKey, String>,
    id_map: &mut HashMap<String, String>,
    name_map: &mut HashMap<NameKey, String>,
) {
    let key = NameKey::new(external_name);
    match local_index.get(&key) {
        Some(local_id) => {
            id_map.insert(external_id.to_string(), local_id.clone());
            name_map.insert(key, local_id.clone());
        }
        None => {
            debug!(
                target = "taxonomy",
                external_id,
                name = external_name,
                "no local match; will import under foreign label"
            );
        }
    }
}

struct PlatformNames {
    resolved: Vec<(String, String)>,
    unresolved: HashSet<String>,
}

/// Gather names for every platform referenced by `runs`. Embedded names are
/// taken as-is; bare ids are fetched once each, concurrently.
async fn collect_platform_names(
    source: &dyn ExternalSource,
    runs: &[ExternalRun],
    concurrency: usize,
) -> PlatformNames {
    let mut cache: HashMap<String, String> = HashMap::new();
    let mut pending: BTreeSet<String> = BTreeSet::new();
    for run in runs {
        match &run.platform {
            Some(ExternalRef::Embedded { id, name }) if !id.is_empty() => {
                cache.insert(id.clone(), name.clone());
            }
            Some(ExternalRef::ById(id)) if !id.is_empty() => {
                pending.insert(id.clone());
            }
            _ => {}
        }
    }
    pending.retain(|id| !cache.contains_key(id));

    let mut unresolved = HashSet::new();
    if !pending.is_empty() {
        debug!(
            target = "taxonomy",
            count = pending.len(),
            "fetching platform names"
        );
        let fetched: Vec<(String, anyhow::Result<Option<String>>)> = stream::iter(pending)
            .map(|id| async move {
                let res = source.platform_name(&id).await;
                (id, res)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        for (id, res) in fetched {
            match res {
                Ok(Some(name)) if !name.trim().is_empty() => {
                    cache.insert(id, name);
                }
                Ok(_) => {
                    warn!(target = "taxonomy", platform = %id, "platform has no name upstream");
                    unresolved.insert(id);
                }
                Err(e) => {
                    warn!(target = "taxonomy", platform = %id, error = %e, "platform name fetch failed");
                    unresolved.insert(id);
                }
            }
        }
    }

    let mut resolved: Vec<(String, String)> = cache.into_iter().collect();
    resolved.sort();
    PlatformNames {
        resolved,
        unresolved,
    }
}
