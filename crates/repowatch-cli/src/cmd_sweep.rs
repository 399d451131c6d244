use crate::app::App;
use repowatch_conductor::{Job, JobOutcome, SweepOutcome};

pub async fn execute(app: &App) -> anyhow::Result<()> {
    let coordinator = app.coordinator()?;
    match coordinator.try_sweep().await? {
        SweepOutcome::AlreadyRunning => println!("A sweep is already running."),
        SweepOutcome::Completed(summary) => {
            println!(
                "Sweep {}: {} passed, {} failed",
                summary.sweep_id,
                summary.passed.len(),
                summary.failed.len()
            );
            for f in &summary.failed {
                let hint = if f.retryable { " (retryable)" } else { "" };
                println!("  FAILED {}{hint}: {}", f.repo, f.error);
            }
            if !summary.next_enqueued {
                println!("warning: next sweep could not be scheduled");
            }
        }
    }
    Ok(())
}

/// Run the full pipeline for one repository now.
pub async fn check(app: &App, repo: &str) -> anyhow::Result<()> {
    let entry = app.entry(repo)?;
    let coordinator = app.coordinator()?;
    let job = Job::SingleCheck {
        watchlist_id: entry.id.clone(),
    };
    if let JobOutcome::Checked(report) = coordinator.handle(job).await? {
        println!(
            "{}: {} commits extracted, {} appended, current score {}",
            entry.full_name(),
            report.extracted,
            report.append.appended,
            report
                .current_score()
                .map_or_else(|| "n/a".to_string(), |s| s.to_string())
        );
    }
    Ok(())
}
