use crate::app::App;
use repowatch_core::event::verify_chain;

pub fn execute(app: &App, repo: &str) -> anyhow::Result<()> {
    let entry = app.entry(repo)?;
    let entries = app.store().log_entries(&entry.id, None)?;
    match verify_chain(&entries)? {
        Ok(()) => {
            println!("{}: {} entries, chain intact", entry.full_name(), entries.len());
            Ok(())
        }
        Err(brk) => anyhow::bail!("{}: {brk}", entry.full_name()),
    }
}
