use crate::app::App;
use repowatch_aggregate::Aggregator;

/// Refresh the working copy, log new commits and recompute statistics.
pub async fn execute(app: &App, repo: &str) -> anyhow::Result<()> {
    let entry = app.entry(repo)?;
    let pipeline = app.pipeline()?;
    let copies = pipeline.working_copies();
    let _lock = copies.lock(&entry.owner, &entry.name)?;

    let (commits, append) = pipeline.ingest(&entry).await?;
    let recompute = Aggregator::new(app.store()).recompute(&entry.id)?;
    if app.config.clone.cleanup_after_run {
        copies.cleanup(&entry.owner, &entry.name).await;
    }

    println!("{}:", entry.full_name());
    println!("  extracted     {}", commits.len());
    println!("  appended      {}", append.appended);
    println!("  already known {}", append.skipped);
    if append.invalid_dates > 0 {
        println!("  bad dates     {}", append.invalid_dates);
    }
    println!("  contributors  {}", recompute.contributors);
    Ok(())
}
