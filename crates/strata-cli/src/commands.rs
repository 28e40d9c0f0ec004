use std::process::ExitCode;

use anyhow::{Context, Result};
use strata_common::{Direction, RevisionId, marker_label};
use strata_config::AppConfig;
use strata_db::{SqliteStore, StoreOptions};
use strata_migrate::{
    Descriptor, GraphOptions, HistoryEntry, Migrator, RevisionGraph, RunOutcome, RunReport,
    Target, loader, offline, scaffold,
};
use tracing::warn;

/// Exit code for a run stopped by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

fn graph_options(config: &AppConfig) -> GraphOptions {
    GraphOptions {
        linear: config.migrations.linear_history,
    }
}

fn load_graph(config: &AppConfig) -> Result<RevisionGraph> {
    let dir = &config.migrations.directory;
    let descriptors = loader::load_dir(dir).with_context(|| {
        format!(
            "failed to load revisions (run `strata init` to create {})",
            dir.display()
        )
    })?;
    RevisionGraph::build(descriptors, graph_options(config)).context("invalid revision history")
}

fn open_migrator(config: &AppConfig) -> Result<Migrator> {
    let graph = load_graph(config)?;
    let path = &config.database.path;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let store = SqliteStore::open(path, &store_options(config))
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Migrator::new(graph, store))
}

/// A migrator over a read-only store, for `--sql`. Leaves the database file
/// exactly as it was, or absent.
fn open_offline_migrator(config: &AppConfig) -> Result<Migrator> {
    let graph = load_graph(config)?;
    let path = &config.database.path;
    let store = SqliteStore::open_read_only(path, &store_options(config))
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Migrator::new(graph, store))
}

fn store_options(config: &AppConfig) -> StoreOptions {
    StoreOptions {
        version_table: config.migrations.version_table.clone(),
        busy_timeout: config.database.busy_timeout(),
    }
}

pub fn revision(config: &AppConfig, message: &str, id: Option<String>) -> Result<()> {
    let graph = load_graph(config)?;
    let id = id.map(RevisionId::parse).transpose()?;
    let path = scaffold::new_revision(&config.migrations.directory, &graph, message, id)?;
    println!("Created {}", path.display());
    Ok(())
}

/// Upgrade or downgrade. The run happens on a blocking thread while Ctrl-C
/// trips the cancel token, so the current step still finishes.
pub async fn migrate(
    config: &AppConfig,
    direction: Direction,
    target: Target,
    sql: bool,
) -> Result<ExitCode> {
    if sql {
        print!("{}", render_offline(config, direction, &target)?);
        return Ok(ExitCode::SUCCESS);
    }

    let migrator = open_migrator(config)?;
    let cancel = migrator.cancel_token();
    let mut task = tokio::task::spawn_blocking(move || match direction {
        Direction::Upgrade => migrator.upgrade(&target),
        Direction::Downgrade => migrator.downgrade(&target),
    });

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, stopping after the current step");
            cancel.cancel();
            task.await
        }
    };
    let report = joined.context("migration task failed")??;
    print_report(&report);

    Ok(match report.outcome {
        RunOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        RunOutcome::Completed | RunOutcome::NoOp => ExitCode::SUCCESS,
    })
}

fn render_offline(config: &AppConfig, direction: Direction, target: &Target) -> Result<String> {
    let migrator = open_offline_migrator(config)?;
    let plan = migrator.plan_for(direction, target)?;
    Ok(offline::render_plan(&plan, migrator.store().version_table())?)
}

fn print_report(report: &RunReport) {
    let marker = marker_label(report.marker.as_ref());
    match report.outcome {
        RunOutcome::NoOp => println!("Already at {marker}"),
        RunOutcome::Completed => println!(
            "{} to {marker} ({} step{})",
            match report.direction {
                Direction::Upgrade => "Upgraded",
                Direction::Downgrade => "Downgraded",
            },
            report.applied.len(),
            if report.applied.len() == 1 { "" } else { "s" }
        ),
        RunOutcome::Cancelled => println!(
            "Cancelled after {} step(s), database at {marker}",
            report.applied.len()
        ),
    }
}

pub fn current(config: &AppConfig, verbose: bool) -> Result<()> {
    let migrator = open_migrator(config)?;
    let current = migrator.current()?;
    match &current {
        None => println!("base"),
        Some(id) => {
            let graph = migrator.graph();
            let head = if graph.contains(id) && graph.children(id).is_empty() {
                " (head)"
            } else {
                ""
            };
            println!("{id}{head}");
            if verbose {
                let descriptor = migrator
                    .show(id)
                    .context("database is at a revision missing from the versions directory")?;
                print_descriptor_summary(descriptor);
            }
        }
    }
    if let Some(lock) = migrator.lock_info()? {
        println!(
            "locked by {} since {}",
            lock.holder,
            lock.acquired_at.to_rfc3339()
        );
    }
    Ok(())
}

pub fn history(config: &AppConfig, verbose: bool) -> Result<()> {
    let migrator = open_migrator(config)?;
    let entries = migrator.history()?;
    for entry in entries.iter().rev() {
        println!("{}", history_line(entry));
        if verbose {
            print_descriptor_summary(entry.descriptor);
            println!();
        }
    }
    Ok(())
}

fn history_line(entry: &HistoryEntry<'_>) -> String {
    let d = entry.descriptor;
    let mut line = format!("{} -> {}", marker_label(d.parent()), d.id());
    if entry.is_head {
        line.push_str(" (head)");
    }
    if entry.is_current {
        line.push_str(" (current)");
    } else if !entry.is_applied {
        line.push_str(" (pending)");
    }
    if !d.message().is_empty() {
        line.push_str(", ");
        line.push_str(d.message());
    }
    line
}

fn print_descriptor_summary(d: &Descriptor) {
    println!("    Revision: {}", d.id());
    println!("    Parent:   {}", marker_label(d.parent()));
    if let Some(created) = d.created_at() {
        println!("    Created:  {}", created.to_rfc3339());
    }
    println!(
        "    Upgrade:  {} operation(s)",
        d.upgrade().operations().len()
    );
    println!(
        "    Downgrade: {} operation(s)",
        d.downgrade().operations().len()
    );
}

pub fn heads(config: &AppConfig) -> Result<()> {
    let migrator = open_migrator(config)?;
    let current = migrator.current()?;
    for head in migrator.heads() {
        if current.as_ref() == Some(head) {
            println!("{head} (current)");
        } else {
            println!("{head}");
        }
    }
    Ok(())
}

pub fn show(config: &AppConfig, revision: &str) -> Result<()> {
    let graph = load_graph(config)?;
    let id = RevisionId::parse(revision)?;
    let descriptor = graph.get(&id)?;
    let yaml = serde_yaml::to_string(descriptor).context("failed to render descriptor")?;
    print!("{yaml}");
    Ok(())
}

pub fn stamp(config: &AppConfig, target: &Target) -> Result<()> {
    let migrator = open_migrator(config)?;
    let marker = migrator.stamp(target)?;
    println!("Stamped {}", marker_label(marker.as_ref()));
    Ok(())
}

pub fn journal(config: &AppConfig, limit: usize) -> Result<()> {
    let migrator = open_migrator(config)?;
    for entry in migrator.journal(limit)? {
        println!(
            "{:>5}  {}  {:<9}  {:<12}  {} -> {}",
            entry.seq,
            entry.applied_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action.to_string(),
            entry.revision.as_ref().map(|r| r.as_str()).unwrap_or("-"),
            marker_label(entry.marker_before.as_ref()),
            marker_label(entry.marker_after.as_ref()),
        );
    }
    Ok(())
}

pub fn unlock(config: &AppConfig) -> Result<()> {
    let migrator = open_migrator(config)?;
    if migrator.force_unlock()? {
        println!("Run lock cleared");
    } else {
        println!("No run lock held");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = r#"
id: "001"
message: initial schema
upgrade:
  - op: create_table
    table: users
    columns:
      - { name: id, type: integer, primary_key: true }
downgrade:
  - op: drop_table
    table: users
"#;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.path = dir.join("data/strata.db");
        config.migrations.directory = dir.join("versions");
        std::fs::create_dir_all(&config.migrations.directory).unwrap();
        std::fs::write(config.migrations.directory.join("001_initial.yml"), ROOT).unwrap();
        config
    }

    #[test]
    fn offline_render_leaves_no_database_behind() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let sql = render_offline(&config, Direction::Upgrade, &Target::Head).unwrap();
        assert!(sql.contains("CREATE TABLE \"users\""));
        assert!(sql.contains("INSERT INTO \"strata_version\" (version_num) VALUES ('001');"));

        assert!(!config.database.path.exists());
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn offline_render_starts_from_the_stored_marker() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        open_migrator(&config).unwrap().upgrade(&Target::Head).unwrap();

        let sql = render_offline(&config, Direction::Downgrade, &Target::Base).unwrap();
        assert!(sql.starts_with("-- downgrade 001 -> base"), "{sql}");
        assert!(sql.contains("DROP TABLE \"users\";"));
        assert!(render_offline(&config, Direction::Upgrade, &Target::Base).is_err());
    }
}
