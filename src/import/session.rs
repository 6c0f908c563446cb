//! One import batch, start to finish.
//!
//! `ResolveSource -> BuildMappings -> LoadExistingKeys -> per record -> Done`.
//! Setup failures end the batch with zero imports. After setup, a failing
//! record is logged, recorded and skipped; the loop always reaches the end.

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::import::dedup::DedupSet;
use crate::import::error::ImportError;
use crate::import::ports::{ExternalSource, LocalStore};
use crate::import::taxonomy::{build_mapping, resolve_game, TaxonomyMapping};
use crate::import::translate::{translate_run, NameCache};
use crate::import::validate::validate_run;
use crate::model::{ExternalRun, ImportResult, LocalRun, UnmatchedPlayers};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// External game id or abbreviation.
    pub game: String,
    /// Run the whole pipeline but skip the insert.
    pub dry_run: bool,
    /// Upper bound on concurrent name backfill fetches.
    pub concurrency: usize,
}

impl ImportOptions {
    pub fn new(game: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            dry_run: false,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ResolveSource,
    BuildMappings,
    LoadExistingKeys,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::ResolveSource => "resolve-source",
            Stage::BuildMappings => "build-mappings",
            Stage::LoadExistingKeys => "load-existing-keys",
        })
    }
}

enum Outcome {
    Imported {
        local_id: String,
        unmatched: UnmatchedPlayers,
    },
    /// `srcRunId` already stored (or seen earlier in this batch).
    AlreadyImported,
    /// Content identity matches a stored or already-imported record.
    Duplicate,
}

/// Everything a batch needs that survives between records. Owned by one
/// `run` call; nothing is shared with other batches.
struct BatchState {
    mapping: TaxonomyMapping,
    names: NameCache,
    seen_src_ids: HashSet<String>,
    dedup: DedupSet,
}

pub struct ImportSession<'a> {
    source: &'a dyn ExternalSource,
    store: &'a dyn LocalStore,
    options: ImportOptions,
}

impl<'a> ImportSession<'a> {
    pub fn new(
        source: &'a dyn ExternalSource,
        store: &'a dyn LocalStore,
        options: ImportOptions,
    ) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    /// Run the batch. `progress(total, imported, skipped)` fires after every
    /// external record, whatever happened to it.
    pub async fn run<F>(self, mut progress: F) -> ImportResult
    where
        F: FnMut(usize, usize, usize),
    {
        let started = Instant::now();
        let mut result = ImportResult::default();

        let (runs, mut state) = match self.setup().await {
            Ok(ok) => ok,
            Err((stage, err)) => {
                warn!(target = "import", %stage, error = %err, "batch aborted during setup");
                result.errors.push(format!("{stage}: {err}"));
                return result;
            }
        };

        let total = runs.len();
        info!(
            target = "import",
            game = %state.mapping.game_id,
            total,
            dry_run = self.options.dry_run,
            "processing external runs"
        );

        for run in &runs {
            match self.process(run, &mut state).await {
                Ok(Outcome::Imported {
                    local_id,
                    unmatched,
                }) => {
                    result.imported += 1;
                    if !unmatched.is_empty() {
                        result.unmatched_players.insert(local_id, unmatched);
                    }
                }
                Ok(Outcome::AlreadyImported) => {
                    debug!(target = "import", run = %run.id, "already imported; skipped");
                    result.skipped += 1;
                }
                Ok(Outcome::Duplicate) => {
                    debug!(target = "import", run = %run.id, "duplicate content; skipped");
                    result.skipped += 1;
                }
                Err(err) => {
                    warn!(target = "import", run = %run.id, error = %err, "run skipped");
                    result.skipped += 1;
                    result.errors.push(format!("{}: {err}", run.id));
                }
            }
            progress(total, result.imported, result.skipped);
        }

        info!(
            target = "import",
            total,
            imported = result.imported,
            skipped = result.skipped,
            errors = result.errors.len(),
            unmatched_players = result.unmatched_players.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "import batch finished"
        );
        result
    }

    async fn setup(&self) -> Result<(Vec<ExternalRun>, BatchState), (Stage, ImportError)> {
        let game_id = resolve_game(self.source, &self.options.game)
            .await
            .map_err(|e| (Stage::ResolveSource, e))?;
        let runs = self
            .source
            .list_runs(&game_id)
            .await
            .map_err(|e| (Stage::ResolveSource, ImportError::fetch("list external runs", e)))?;

        let mapping = build_mapping(
            self.source,
            self.store,
            &game_id,
            &runs,
            self.options.concurrency,
        )
        .await
        .map_err(|e| (Stage::BuildMappings, e))?;

        let (verified, imported_ids) = futures::try_join!(
            self.store.list_verified_runs(),
            self.store.list_imported_src_run_ids()
        )
        .map_err(|e| {
            (
                Stage::LoadExistingKeys,
                ImportError::fetch("load existing records", e),
            )
        })?;
        let dedup = DedupSet::seeded(verified.iter());
        debug!(
            target = "import",
            identity_keys = dedup.len(),
            src_run_ids = imported_ids.len(),
            "existing keys loaded"
        );

        Ok((
            runs,
            BatchState {
                mapping,
                names: NameCache::default(),
                seen_src_ids: imported_ids.into_iter().collect(),
                dedup,
            },
        ))
    }

    async fn process(
        &self,
        run: &ExternalRun,
        state: &mut BatchState,
    ) -> Result<Outcome, ImportError> {
        if state.seen_src_ids.contains(&run.id) {
            return Ok(Outcome::AlreadyImported);
        }

        let candidate = translate_run(self.source, &state.mapping, &mut state.names, run).await?;

        let problems = validate_run(&candidate);
        if !problems.is_empty() {
            return Err(ImportError::Validation(problems));
        }

        if state.dedup.is_duplicate(&candidate) {
            return Ok(Outcome::Duplicate);
        }

        let unmatched = self.unmatched_players(&candidate).await;

        let local_id = if self.options.dry_run {
            format!("dry-run:{}", run.id)
        } else {
            self.store
                .insert_run(&candidate)
                .await
                .map_err(|e| ImportError::Persistence(format!("{e:#}")))?
        };

        state.dedup.insert(&candidate);
        state.seen_src_ids.insert(run.id.clone());
        debug!(target = "import", run = %run.id, %local_id, "imported");
        Ok(Outcome::Imported {
            local_id,
            unmatched,
        })
    }

    /// Players with no local account. Lookup failures are logged and do not
    /// count as unmatched.
    async fn unmatched_players(&self, run: &LocalRun) -> UnmatchedPlayers {
        let player1 = self.unmatched(&run.player_name).await;
        let player2 = match run.player2_name.as_deref() {
            Some(p2) => self.unmatched(p2).await,
            None => None,
        };
        UnmatchedPlayers { player1, player2 }
    }

    async fn unmatched(&self, name: &str) -> Option<String> {
        match self.store.find_player_by_name(name).await {
            Ok(Some(_)) => None,
            Ok(None) => Some(name.to_string()),
            Err(e) => {
                warn!(target = "import", player = name, error = %e, "player lookup failed");
                None
            }
        }
    }
}

/// Convenience entry point: one fresh session per call.
pub async fn import<F>(
    source: &dyn ExternalSource,
    store: &dyn LocalStore,
    options: ImportOptions,
    progress: F,
) -> ImportResult
where
    F: FnMut(usize, usize, usize),
{
    ImportSession::new(source, store, options).run(progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::testing::*;
    use crate::model::{ExternalRef, RunType};

    async fn run_batch(source: &FakeSource, store: &FakeStore) -> ImportResult {
        import(source, store, ImportOptions::new("lsw"), |_, _, _| {}).await
    }

    #[tokio::test]
    async fn imports_valid_runs_and_reports_progress() {
        let source = source_with_taxonomy(vec![
            solo_run("r1", "amy", "PT1H"),
            solo_run("r2", "bob", "PT1H1S"),
        ]);
        let store = local_taxonomy_store();
        let mut ticks = Vec::new();

        let result = import(&source, &store, ImportOptions::new("lsw"), |t, i, s| {
            ticks.push((t, i, s))
        })
        .await;

        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 0);
        assert!(result.errors.is_empty());
        assert_eq!(ticks, vec![(2, 1, 0), (2, 2, 0)]);
        let stored = store.stored();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|(_, r)| !r.verified && r.imported_from_src));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let source = source_with_taxonomy(vec![
            solo_run("r1", "amy", "PT1H"),
            coop_run("r2", "amy", "bob", "PT2H"),
            solo_run("r3", "cid", "PT3H"),
        ]);
        let store = local_taxonomy_store();

        let first = run_batch(&source, &store).await;
        assert_eq!(first.imported, 3);

        let second = run_batch(&source, &store).await;
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 3);
        assert!(second.errors.is_empty());
        assert_eq!(store.stored().len(), 3);
    }

    #[tokio::test]
    async fn coop_duplicate_detected_in_either_order() {
        let store = local_taxonomy_store();
        let existing = LocalRun {
            player_name: "Bob".into(),
            player2_name: Some("Amy".into()),
            category_id: "cat-any".into(),
            platform_id: "plat-pc".into(),
            run_type: RunType::CoOp,
            time: "02:00:00".into(),
            date: "2023-01-01".into(),
            ..Default::default()
        };
        store.seed_verified(existing);

        let source = source_with_taxonomy(vec![
            coop_run("r1", "amy", "bob", "PT2H"),
            coop_run("r2", "bob", "amy", "PT2H"),
        ]);
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 0);
        assert_eq!(result.skipped, 2);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn same_content_twice_in_one_batch_imports_once() {
        let source = source_with_taxonomy(vec![
            solo_run("r1", "amy", "PT1H"),
            solo_run("r1-mirror", "AMY", "PT1H"),
            solo_run("r1", "amy", "PT1H"),
        ]);
        let store = local_taxonomy_store();
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 2);
    }

    #[tokio::test]
    async fn missing_time_and_date_reported_together() {
        let mut bad = solo_run("r-bad", "amy", "PT1H");
        bad.time = None;
        bad.date = None;
        let source = source_with_taxonomy(vec![bad, solo_run("r-ok", "bob", "PT1H")]);
        let store = local_taxonomy_store();

        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
        let msg = &result.errors[0];
        assert!(msg.starts_with("r-bad: "));
        assert!(msg.contains("time is missing"));
        assert!(msg.contains("date is missing"));
    }

    #[tokio::test]
    async fn unmapped_category_is_never_imported() {
        let mut run = solo_run("r1", "amy", "PT1H");
        run.category = ExternalRef::ById("c9".into());
        let source = source_with_taxonomy(vec![run]);
        let store = local_taxonomy_store();

        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 0);
        assert_eq!(result.skipped, 1);
        assert!(result.errors[0].contains("Glitchless"));
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn unmapped_platform_imports_with_foreign_label() {
        let mut run = solo_run("r1", "amy", "PT1H");
        run.platform = Some(ExternalRef::ById("p-gc".into()));
        let mut source = source_with_taxonomy(vec![run]);
        source.platforms.insert("p-gc".into(), "GameCube".into());
        let store = local_taxonomy_store();

        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 1);
        let (_, stored) = &store.stored()[0];
        assert_eq!(stored.platform_id, "");
        assert_eq!(stored.src_platform_name.as_deref(), Some("GameCube"));
    }

    #[tokio::test]
    async fn persistence_failure_skips_only_that_record() {
        let source = source_with_taxonomy(vec![
            solo_run("r1", "amy", "PT1H"),
            solo_run("r2", "bob", "PT1H"),
            solo_run("r3", "cid", "PT1H"),
        ]);
        let store = FakeStore {
            reject_src_ids: vec!["r2".into()],
            ..local_taxonomy_store()
        };
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 1);
        assert!(result.errors[0].starts_with("r2: store rejected record"));
    }

    #[tokio::test]
    async fn translation_failure_is_contained() {
        let mut broken = solo_run("r1", "amy", "PT1H");
        broken.platform = Some(embedded("", "PC"));
        let source = source_with_taxonomy(vec![broken, solo_run("r2", "bob", "PT1H")]);
        let store = local_taxonomy_store();
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert!(result.errors[0].contains("translation failed"));
    }

    #[tokio::test]
    async fn unresolvable_game_aborts_batch() {
        let source = FakeSource {
            runs: vec![solo_run("r1", "amy", "PT1H")],
            ..FakeSource::default()
        };
        let store = local_taxonomy_store();
        let mut calls = 0;
        let result = import(&source, &store, ImportOptions::new("lsw"), |_, _, _| {
            calls += 1
        })
        .await;
        assert_eq!(result.imported, 0);
        assert_eq!(calls, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("resolve-source: configuration error"));
    }

    #[tokio::test]
    async fn mapping_failure_aborts_batch() {
        let source = source_with_taxonomy(vec![solo_run("r1", "amy", "PT1H")]);
        let store = FakeStore {
            fail_taxonomy: true,
            ..local_taxonomy_store()
        };
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 0);
        assert!(result.errors[0].starts_with("build-mappings: fetch failed"));
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn existing_key_load_failure_aborts_batch() {
        let source = source_with_taxonomy(vec![solo_run("r1", "amy", "PT1H")]);
        let store = FakeStore {
            fail_existing: true,
            ..local_taxonomy_store()
        };
        let mut calls = 0;
        let result = import(&source, &store, ImportOptions::new("lsw"), |_, _, _| {
            calls += 1
        })
        .await;
        assert_eq!(result.imported, 0);
        assert_eq!(calls, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("load-existing-keys: fetch failed"));
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn overflowing_clock_time_skips_only_that_record() {
        let source = source_with_taxonomy(vec![
            solo_run("r-huge", "amy", "5124095576030432:00:00"),
            solo_run("r-ok", "bob", "PT1H"),
        ]);
        let store = local_taxonomy_store();
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors, vec!["r-huge: time is missing".to_string()]);
        assert_eq!(store.stored()[0].1.src_run_id.as_deref(), Some("r-ok"));
    }

    #[tokio::test]
    async fn verified_row_with_unpadded_time_blocks_import() {
        let store = local_taxonomy_store();
        store.seed_verified(LocalRun {
            player_name: "amy".into(),
            category_id: "cat-any".into(),
            platform_id: "plat-pc".into(),
            time: "1:00:00".into(),
            date: "2023-12-01".into(),
            ..Default::default()
        });
        let source = source_with_taxonomy(vec![solo_run("r1", "amy", "PT1H")]);
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 0);
        assert_eq!(result.skipped, 1);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn unmatched_players_are_reported_by_new_id() {
        let source = source_with_taxonomy(vec![coop_run("r1", "amy", "newcomer", "PT1H")]);
        let store = FakeStore {
            known_players: vec!["Amy".into()],
            ..local_taxonomy_store()
        };
        let result = run_batch(&source, &store).await;
        assert_eq!(result.imported, 1);
        let warning = result.unmatched_players.get("local-1").unwrap();
        assert_eq!(warning.player1, None);
        assert_eq!(warning.player2.as_deref(), Some("newcomer"));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let source = source_with_taxonomy(vec![
            solo_run("r1", "amy", "PT1H"),
            solo_run("r2", "amy", "PT1H"),
        ]);
        let store = local_taxonomy_store();
        let mut options = ImportOptions::new("lsw");
        options.dry_run = true;
        let result = import(&source, &store, options, |_, _, _| {}).await;
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn unverified_matches_are_not_content_duplicates() {
        // Pending rows only block by srcRunId, not by content.
        let store = local_taxonomy_store();
        let source = source_with_taxonomy(vec![solo_run("r1", "amy", "PT1H")]);
        run_batch(&source, &store).await;

        let rekeyed = source_with_taxonomy(vec![solo_run("r1-rekeyed", "amy", "PT1H")]);
        let result = run_batch(&rekeyed, &store).await;
        assert_eq!(result.imported, 1);
        assert_eq!(store.stored().len(), 2);
    }
}
