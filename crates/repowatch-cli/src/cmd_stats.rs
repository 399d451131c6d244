use crate::app::App;
use repowatch_aggregate::Aggregator;
use repowatch_core::types::CommitAggregates;

pub fn execute(app: &App, repo: &str, top: usize, json: bool) -> anyhow::Result<()> {
    let entry = app.entry(repo)?;
    Aggregator::new(app.store()).ensure_exists(&entry.id)?;
    let repo_stats = app
        .store()
        .find_repo_stats(&entry.id)?
        .ok_or_else(|| anyhow::anyhow!("no statistics for {}", entry.full_name()))?;
    let mut contributors = app.store().contributor_stats(&entry.id)?;
    contributors.sort_by(|a, b| {
        b.aggregates
            .total_commits
            .cmp(&a.aggregates.total_commits)
            .then_with(|| a.author_email.cmp(&b.author_email))
    });
    contributors.truncate(top);

    if json {
        let out = serde_json::json!({
            "repo": repo_stats,
            "contributors": contributors,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{}: {} commits by {} contributors (computed {})",
        entry.full_name(),
        repo_stats.aggregates.total_commits,
        repo_stats.total_contributors,
        repo_stats.computed_at
    );
    print_aggregates(&repo_stats.aggregates, "  ");
    for c in &contributors {
        println!();
        println!("  {} <{}>: {} commits", c.author_name, c.author_email, c.aggregates.total_commits);
        print_aggregates(&c.aggregates, "    ");
    }
    Ok(())
}

fn print_aggregates(a: &CommitAggregates, indent: &str) {
    println!(
        "{indent}lines +{:.1} (sd {:.1}) / -{:.1} (sd {:.1}), files {:.1} (sd {:.1})",
        a.lines_added.mean,
        a.lines_added.std_dev,
        a.lines_deleted.mean,
        a.lines_deleted.std_dev,
        a.files_changed.mean,
        a.files_changed.std_dev
    );
    if let Some((hour, _)) = a
        .commit_hours
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        .max_by_key(|(_, n)| **n)
    {
        println!("{indent}busiest hour {hour:02}:00 UTC");
    }
    if !a.typical_days_active.is_empty() {
        println!("{indent}active on {}", a.typical_days_active.join(", "));
    }
    if let Some(last) = &a.last_commit_at {
        println!("{indent}last commit {last}");
    }
}
