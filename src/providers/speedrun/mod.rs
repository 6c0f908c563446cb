pub mod provider;

pub use provider::SrcClient;

use anyhow::Result;

use crate::util::env::{env_opt, env_parse};

/// Build a client from `SRC_*` environment settings.
pub fn client_from_env() -> Result<SrcClient> {
    let base = env_opt("SRC_API_BASE");
    let timeout: u64 = env_parse("SRC_TIMEOUT_SECS", 15u64);
    let client = SrcClient::new(base.as_deref(), Some(timeout))?
        .with_page_size(env_parse("SRC_PAGE_SIZE", 200u32))
        .with_max_pages(env_parse("SRC_MAX_PAGES", 50u32))
        .with_run_status(env_opt("SRC_RUN_STATUS").unwrap_or_else(|| "verified".into()));
    Ok(client)
}
