use crate::app::{parse_repo, watchlist_id, App};
use repowatch_core::types::{WatchStatus, WatchlistEntry, WatchlistFilter};

pub fn add(app: &App, repo: &str, branch: &str, status: &str) -> anyhow::Result<()> {
    let (owner, name) = parse_repo(repo)?;
    let status = WatchStatus::parse(status)
        .ok_or_else(|| anyhow::anyhow!("unknown status {status:?} (ready, pending, disabled)"))?;
    let entry = WatchlistEntry {
        id: watchlist_id(&owner, &name),
        owner,
        name,
        branch: branch.to_string(),
        status,
    };
    app.store().upsert_watchlist_entry(&entry)?;
    println!(
        "Watching {} ({}) [{}]",
        entry.full_name(),
        entry.branch,
        entry.status.as_str()
    );
    Ok(())
}

pub fn list(app: &App, json: bool) -> anyhow::Result<()> {
    let entries = app.store().find_watchlist_entries(&WatchlistFilter::default())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Watchlist is empty.");
        return Ok(());
    }
    for e in &entries {
        println!("{:<40} {:<16} {}", e.full_name(), e.branch, e.status.as_str());
    }
    Ok(())
}
