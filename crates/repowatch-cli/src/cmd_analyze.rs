use crate::app::App;
use repowatch_conductor::pipeline::commits_from_log;
use repowatch_core::types::{CommitRecord, HealthAnalysisResult, SamplingPoint};
use time::UtcOffset;

/// Score the logged timeline of a repository, or only its newest commit.
pub async fn execute(app: &App, repo: &str, current: bool) -> anyhow::Result<()> {
    let entry = app.entry(repo)?;
    let commits = commits_from_log(app.store(), &entry.id)?;
    if commits.is_empty() {
        anyhow::bail!(
            "no commits logged for {}; run `repowatch ingest {}` first",
            entry.full_name(),
            entry.full_name()
        );
    }
    let analyzer = app.analyzer()?;
    let source = app.pipeline()?.source_location(&entry);

    if current {
        let head = newest_commit(&commits)
            .ok_or_else(|| anyhow::anyhow!("no logged commit of {} has a usable date", entry.full_name()))?;
        let result = analyzer.analyze_current(&entry, &head, &source).await?;
        print_result(&result);
        return Ok(());
    }

    let run = analyzer.analyze(&entry, &commits, &source).await?;
    println!("{}: {} samples", entry.full_name(), run.samples.len());
    for r in &run.samples {
        print_result(r);
    }
    if let Some(current) = &run.current {
        println!("current: {} ({})", current.health_score, short(&current.commit_sha));
    }
    if run.fallbacks > 0 {
        println!("{} sample(s) used the fallback score", run.fallbacks);
    }
    Ok(())
}

/// The commit with the latest author date.
fn newest_commit(commits: &[CommitRecord]) -> Option<SamplingPoint> {
    commits
        .iter()
        .filter_map(|c| {
            c.parsed_date().map(|d| SamplingPoint {
                sha: c.sha.clone(),
                date: d.to_offset(UtcOffset::UTC),
            })
        })
        .max_by_key(|p| p.date)
}

fn print_result(r: &HealthAnalysisResult) {
    println!(
        "  {}  {}  {:>3}  {}",
        short(&r.commit_sha),
        r.commit_date,
        r.health_score,
        r.source.as_str()
    );
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(10)]
}
