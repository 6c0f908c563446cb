use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::import::ports::ExternalSource;
use crate::model::{ExternalPlayer, ExternalRef, ExternalRun, Taxon};

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// speedrun.com REST API (v1) client.
/// Public API (base): https://www.speedrun.com/api/v1
///
/// Endpoints used (all GET, read-only):
/// - /games/{id-or-abbreviation}
/// - /games/{id}/categories, /games/{id}/levels
/// - /runs?game={id}&status=...&embed=category,level,platform,players
/// - /platforms/{id}, /users/{id}
///
/// Every request gets one attempt bounded by the client timeout.
#[derive(Debug, Clone)]
pub struct SrcClient {
    base_url: String,
    http: Client,
    page_size: u32,
    max_pages: u32,
    run_status: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RunPage {
    #[serde(default)]
    data: Vec<Value>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    size: u32,
    #[serde(default)]
    links: Vec<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    rel: String,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NameOnly {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Names {
    international: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResource {
    names: Option<Names>,
}

/// A taxonomy field on a run: a bare id, or `{"data": ...}` when embedded.
/// speedrun.com embeds a missing level/platform as `{"data": []}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRef {
    Bare(String),
    Wrapped { data: WireRefData },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRefData {
    Empty(Vec<Value>),
    One(WireTaxon),
}

#[derive(Debug, Deserialize)]
struct WireTaxon {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl WireRef {
    fn into_ref(self) -> Option<ExternalRef> {
        match self {
            WireRef::Bare(id) => Some(ExternalRef::ById(id)),
            WireRef::Wrapped {
                data: WireRefData::Empty(_),
            } => None,
            WireRef::Wrapped {
                data: WireRefData::One(t),
            } => Some(ExternalRef::Embedded {
                id: t.id.unwrap_or_default(),
                name: t.name.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePlayers {
    Embedded { data: Vec<WirePlayer> },
    Bare(Vec<WirePlayer>),
}

#[derive(Debug, Deserialize)]
struct WirePlayer {
    rel: Option<String>,
    id: Option<String>,
    name: Option<String>,
    names: Option<Names>,
}

impl WirePlayer {
    fn into_player(self) -> ExternalPlayer {
        let is_guest = self.rel.as_deref() == Some("guest") || self.id.is_none();
        if is_guest {
            return ExternalPlayer::Guest {
                name: self.name.unwrap_or_default(),
            };
        }
        ExternalPlayer::User {
            id: self.id.unwrap_or_default(),
            name: self
                .names
                .and_then(|n| n.international)
                .filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSystem {
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTimes {
    primary: Option<String>,
    primary_t: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireVideos {
    links: Option<Vec<WireLink>>,
}

#[derive(Debug, Deserialize)]
struct WireLink {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    category: Option<WireRef>,
    level: Option<WireRef>,
    platform: Option<WireRef>,
    system: Option<WireSystem>,
    players: Option<WirePlayers>,
    date: Option<String>,
    submitted: Option<String>,
    times: Option<WireTimes>,
    videos: Option<WireVideos>,
    comment: Option<String>,
}

fn looks_coop(category_name: &str) -> bool {
    let n = category_name.to_ascii_lowercase();
    n.contains("co-op") || n.contains("coop") || n.contains("2 player")
}

impl WireRun {
    fn into_external(self) -> Result<ExternalRun> {
        let category = self
            .category
            .and_then(WireRef::into_ref)
            .ok_or_else(|| anyhow!("run {} has no category", self.id))?;

        let mut run = ExternalRun::new(self.id, category);
        run.level = self.level.and_then(WireRef::into_ref);
        run.platform = self.platform.and_then(WireRef::into_ref).or_else(|| {
            self.system
                .and_then(|s| s.platform)
                .filter(|p| !p.is_empty())
                .map(ExternalRef::ById)
        });
        run.players = match self.players {
            Some(WirePlayers::Embedded { data }) | Some(WirePlayers::Bare(data)) => {
                data.into_iter().map(WirePlayer::into_player).collect()
            }
            None => Vec::new(),
        };
        run.time = self.times.and_then(|t| {
            t.primary
                .filter(|p| !p.is_empty())
                .or_else(|| t.primary_t.map(|secs| secs.to_string()))
        });
        run.date = self.date;
        run.submitted = self.submitted;
        run.video_url = self
            .videos
            .and_then(|v| v.links)
            .and_then(|links| links.into_iter().next())
            .map(|l| l.uri);
        run.comment = self.comment;

        let coop_category = run
            .category
            .embedded_name()
            .is_some_and(looks_coop);
        if run.players.len() >= 2 || coop_category {
            run.run_type = Some("co-op".to_string());
        }
        Ok(run)
    }
}

impl SrcClient {
    pub fn new(base_url: Option<&str>, timeout_secs: Option<u64>) -> Result<Self> {
        let base_url = base_url
            .unwrap_or("https://www.speedrun.com/api/v1")
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = timeout_secs.unwrap_or(15);
        let http = Client::builder()
            .user_agent(concat!("src-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            http,
            page_size: 200,
            max_pages: 50,
            run_status: "verified".to_string(),
        })
    }

    /// Page size for run listings; the API caps it at 200.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 200);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_run_status(mut self, status: impl Into<String>) -> Self {
        let status = status.into();
        if !status.trim().is_empty() {
            self.run_status = status.trim().to_string();
        }
        self
    }

    /// GET `path` and decode the body. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(target = "speedrun", %url, "not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
            return Err(anyhow!("speedrun.com request failed: {status} url={url} body={body}"));
        }
        let body = resp
            .json::<T>()
            .await
            .with_context(|| format!("decode response from {url}"))?;
        Ok(Some(body))
    }

    async fn list_taxa(&self, path: &str) -> Result<Vec<Taxon>> {
        let Some(env) = self.get_json::<Envelope<Vec<WireTaxon>>>(path, &[]).await? else {
            return Err(anyhow!("speedrun.com returned 404 for {path}"));
        };
        Ok(env
            .data
            .into_iter()
            .filter_map(|t| match (t.id, t.name) {
                (Some(id), Some(name)) if !id.is_empty() => Some(Taxon::new(id, name)),
                _ => None,
            })
            .collect())
    }
}

fn seg(raw: &str) -> String {
    urlencoding::encode(raw.trim()).into_owned()
}

#[async_trait]
impl ExternalSource for SrcClient {
    async fn resolve_game(&self, game: &str) -> Result<Option<String>> {
        let path = format!("/games/{}", seg(game));
        let game = self.get_json::<Envelope<IdOnly>>(&path, &[]).await?;
        Ok(game.map(|g| g.data.id).filter(|id| !id.is_empty()))
    }

    async fn list_runs(&self, game_id: &str) -> Result<Vec<ExternalRun>> {
        let mut out = Vec::new();
        let mut offset: u32 = 0;
        let mut dropped = 0usize;
        for page in 0..self.max_pages {
            let query = [
                ("game", game_id.to_string()),
                ("status", self.run_status.clone()),
                ("embed", "category,level,platform,players".to_string()),
                ("orderby", "submitted".to_string()),
                ("direction", "asc".to_string()),
                ("max", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            let Some(body) = self.get_json::<RunPage>("/runs", &query).await? else {
                return Err(anyhow!("speedrun.com returned 404 listing runs for {game_id}"));
            };
            let fetched = body.data.len();
            for raw in body.data {
                let decoded = serde_json::from_value::<WireRun>(raw)
                    .map_err(anyhow::Error::from)
                    .and_then(WireRun::into_external);
                match decoded {
                    Ok(run) => out.push(run),
                    Err(e) => {
                        dropped += 1;
                        warn!(target = "speedrun", page, error = %e, "undecodable run dropped");
                    }
                }
            }
            let has_next = body
                .pagination
                .as_ref()
                .is_some_and(|p| p.links.iter().any(|l| l.rel == "next"));
            if !has_next || fetched == 0 {
                break;
            }
            let step = body
                .pagination
                .map(|p| p.size)
                .filter(|s| *s > 0)
                .unwrap_or(fetched as u32);
            offset += step;
            if page + 1 == self.max_pages {
                warn!(
                    target = "speedrun",
                    max_pages = self.max_pages,
                    "run listing truncated at page limit"
                );
            }
        }
        info!(target = "speedrun", game = game_id, runs = out.len(), dropped, "runs listed");
        Ok(out)
    }

    async fn list_categories(&self, game_id: &str) -> Result<Vec<Taxon>> {
        self.list_taxa(&format!("/games/{}/categories", seg(game_id)))
            .await
    }

    async fn list_levels(&self, game_id: &str) -> Result<Vec<Taxon>> {
        self.list_taxa(&format!("/games/{}/levels", seg(game_id)))
            .await
    }

    async fn platform_name(&self, platform_id: &str) -> Result<Option<String>> {
        let path = format!("/platforms/{}", seg(platform_id));
        let platform = self.get_json::<Envelope<NameOnly>>(&path, &[]).await?;
        Ok(platform.and_then(|p| p.data.name))
    }

    async fn player_name(&self, player_id: &str) -> Result<Option<String>> {
        let path = format!("/users/{}", seg(player_id));
        let user = self.get_json::<Envelope<UserResource>>(&path, &[]).await?;
        Ok(user.and_then(|u| u.data.names).and_then(|n| n.international))
    }
}
