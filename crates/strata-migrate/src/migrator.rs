use std::path::Path;

use strata_common::{Direction, Error, Result, RevisionId, marker_label};
use strata_db::{JournalEntry, LockInfo, SqliteStore};
use tracing::info;

use crate::descriptor::Descriptor;
use crate::executor::{CancelToken, Executor, RunReport};
use crate::graph::{GraphOptions, RevisionGraph};
use crate::loader;
use crate::offline;
use crate::planner::{Plan, Planner, Target};

/// One row of `history`.
#[derive(Debug, Clone)]
pub struct HistoryEntry<'a> {
    pub descriptor: &'a Descriptor,
    /// The store's marker points here.
    pub is_current: bool,
    /// On the lineage of the current marker.
    pub is_applied: bool,
    pub is_head: bool,
}

/// A revision graph bound to the store it migrates.
pub struct Migrator {
    graph: RevisionGraph,
    store: SqliteStore,
    cancel: CancelToken,
}

impl Migrator {
    pub fn new(graph: RevisionGraph, store: SqliteStore) -> Self {
        Self {
            graph,
            store,
            cancel: CancelToken::new(),
        }
    }

    /// Load descriptors from `dir` and build the graph.
    pub fn from_dir(dir: &Path, options: GraphOptions, store: SqliteStore) -> Result<Self> {
        let graph = RevisionGraph::build(loader::load_dir(dir)?, options)?;
        Ok(Self::new(graph, store))
    }

    pub fn graph(&self) -> &RevisionGraph {
        &self.graph
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Handle for cancelling a run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn current(&self) -> Result<Option<RevisionId>> {
        self.store.current()
    }

    /// Plan from the current marker to `target` without running anything.
    pub fn plan(&self, target: &Target) -> Result<Plan> {
        let current = self.store.current()?;
        Planner::new(&self.graph).plan_to(current.as_ref(), target)
    }

    pub fn upgrade(&self, target: &Target) -> Result<RunReport> {
        self.run(target, Direction::Upgrade)
    }

    pub fn downgrade(&self, target: &Target) -> Result<RunReport> {
        self.run(target, Direction::Downgrade)
    }

    /// Like `plan`, but refuses a target that lies the other way.
    pub fn plan_for(&self, direction: Direction, target: &Target) -> Result<Plan> {
        let plan = self.plan(target)?;
        if !plan.is_empty() && plan.direction != direction {
            return Err(Error::InvalidTarget(format!(
                "{target} resolves to {}, which needs a {} from {}",
                marker_label(plan.to.as_ref()),
                plan.direction,
                marker_label(plan.from.as_ref())
            )));
        }
        Ok(plan)
    }

    /// A cancellation only stops the run in flight. The token is cleared
    /// once the run ends so the next one starts fresh.
    fn run(&self, target: &Target, direction: Direction) -> Result<RunReport> {
        let executor = Executor::with_cancel(&self.store, self.cancel.clone());
        let result = self
            .plan_for(direction, target)
            .and_then(|plan| executor.apply(&plan));
        self.cancel.reset();
        result
    }

    /// Every revision, root first, flagged against the current marker.
    pub fn history(&self) -> Result<Vec<HistoryEntry<'_>>> {
        let current = self.store.current()?;
        let applied = match &current {
            Some(id) => self.graph.lineage(id)?,
            None => Vec::new(),
        };
        Ok(self
            .graph
            .ordered()
            .into_iter()
            .map(|descriptor| {
                let id = descriptor.id();
                HistoryEntry {
                    descriptor,
                    is_current: current.as_ref() == Some(id),
                    is_applied: applied.contains(&id),
                    is_head: self.graph.children(id).is_empty(),
                }
            })
            .collect())
    }

    pub fn heads(&self) -> Vec<&RevisionId> {
        self.graph.heads()
    }

    pub fn show(&self, id: &RevisionId) -> Result<&Descriptor> {
        self.graph.get(id)
    }

    /// Point the marker at `target` without running any action. Returns the
    /// new marker.
    pub fn stamp(&self, target: &Target) -> Result<Option<RevisionId>> {
        let _lock = self.store.lock()?;
        // Only relative targets depend on the marker, which may predate the
        // graph when adopting an existing database.
        let current = match target {
            Target::Relative(_) => self.store.current()?,
            _ => None,
        };
        let marker = Planner::new(&self.graph).resolve(current.as_ref(), target)?;
        self.store.stamp(marker.as_ref())?;
        Ok(marker)
    }

    /// The SQL a run to `target` would execute, including marker updates.
    pub fn render_sql(&self, target: &Target) -> Result<String> {
        let plan = self.plan(target)?;
        info!(
            "rendering {} step(s) from {} to {}",
            plan.len(),
            marker_label(plan.from.as_ref()),
            marker_label(plan.to.as_ref())
        );
        offline::render_plan(&plan, self.store.version_table())
    }

    pub fn journal(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        self.store.journal(limit)
    }

    pub fn lock_info(&self) -> Result<Option<LockInfo>> {
        self.store.lock_info()
    }

    pub fn force_unlock(&self) -> Result<bool> {
        self.store.force_unlock()
    }
}
