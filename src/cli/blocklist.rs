use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use url::Url;

use crate::{
    host::storage::kv_store::{JsonFileStore, KeyValueStore, BLOCKED_DOMAINS_KEY},
    utils::dir::create_application_default_path,
};

/// Adds a domain to the block list. The host picks the change up on the
/// next navigation; no restart needed.
pub async fn process_block_command(domain: &str) -> Result<()> {
    let domain = normalize_domain(domain)?;
    let store = open_store()?;

    let mut blocked = load_blocked(&store).await?;
    if blocked.insert(domain.clone()) {
        store.set(BLOCKED_DOMAINS_KEY, &blocked).await?;
        println!("Blocked {domain}");
    } else {
        println!("{domain} is already blocked");
    }
    Ok(())
}

pub async fn process_unblock_command(domain: &str) -> Result<()> {
    let domain = normalize_domain(domain)?;
    let store = open_store()?;

    let mut blocked = load_blocked(&store).await?;
    if blocked.remove(&domain) {
        store.set(BLOCKED_DOMAINS_KEY, &blocked).await?;
        println!("Unblocked {domain}");
    } else {
        println!("{domain} was not blocked");
    }
    Ok(())
}

pub async fn process_blocked_command() -> Result<()> {
    let blocked = load_blocked(&open_store()?).await?;
    if blocked.is_empty() {
        println!("No blocked domains.");
        return Ok(());
    }
    for domain in blocked {
        println!("{domain}");
    }
    Ok(())
}

fn open_store() -> Result<JsonFileStore> {
    Ok(JsonFileStore::new(
        create_application_default_path()?.join("store"),
    )?)
}

async fn load_blocked(store: &JsonFileStore) -> Result<BTreeSet<Arc<str>>> {
    Ok(store
        .get::<BTreeSet<Arc<str>>>(BLOCKED_DOMAINS_KEY)
        .await?
        .unwrap_or_default())
}

/// Accepts a bare hostname or a full URL and reduces both to the lowercase
/// hostname the tracker attributes time to.
fn normalize_domain(input: &str) -> Result<Arc<str>> {
    let input = input.trim();
    if let Ok(url) = Url::parse(input) {
        if let Some(host) = url.host_str() {
            return Ok(host.to_lowercase().into());
        }
    }
    if input.is_empty() || input.contains('/') || input.contains(char::is_whitespace) {
        bail!("{input:?} is not a domain");
    }
    Ok(input.to_lowercase().into())
}
