//! Applies a plan to a store, one transaction per step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use strata_common::{Direction, Error, Result, RevisionId, marker_label};
use strata_db::SqliteStore;
use tracing::{error, info, warn};

use crate::planner::{Plan, Step};

/// Cooperative cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the token can guard another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step committed.
    Completed,
    /// Already at the target.
    NoOp,
    /// Stopped at a step boundary before the plan finished.
    Cancelled,
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub direction: Direction,
    pub applied: Vec<RevisionId>,
    pub marker: Option<RevisionId>,
}

pub struct Executor<'s> {
    store: &'s SqliteStore,
    cancel: CancelToken,
    observer: Option<Box<dyn Fn(&Step) + Send + 's>>,
}

impl<'s> Executor<'s> {
    pub fn new(store: &'s SqliteStore) -> Self {
        Self::with_cancel(store, CancelToken::new())
    }

    pub fn with_cancel(store: &'s SqliteStore, cancel: CancelToken) -> Self {
        Self {
            store,
            cancel,
            observer: None,
        }
    }

    /// Call `observer` after each step commits, before the cancel check for
    /// the next one.
    pub fn with_observer(mut self, observer: impl Fn(&Step) + Send + 's) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Run `plan` under the store's run lock.
    ///
    /// Each step commits on its own, so a failure leaves the marker at the
    /// last committed step and returns the step's error.
    pub fn apply(&self, plan: &Plan) -> Result<RunReport> {
        let _lock = self.store.lock()?;

        let current = self.store.current()?;
        if current != plan.from {
            return Err(Error::MarkerMismatch {
                expected: marker_label(plan.from.as_ref()),
                found: marker_label(current.as_ref()),
            });
        }

        if plan.is_empty() {
            info!("already at {}, nothing to do", marker_label(current.as_ref()));
            return Ok(RunReport {
                outcome: RunOutcome::NoOp,
                direction: plan.direction,
                applied: Vec::new(),
                marker: current,
            });
        }

        info!(
            "{} from {} to {}: {} step(s)",
            plan.direction,
            marker_label(plan.from.as_ref()),
            marker_label(plan.to.as_ref()),
            plan.len()
        );

        let mut applied = Vec::with_capacity(plan.len());
        let mut marker = current;
        for step in &plan.steps {
            if self.cancel.is_cancelled() {
                warn!(
                    "run cancelled after {} of {} step(s), marker at {}",
                    applied.len(),
                    plan.len(),
                    marker_label(marker.as_ref())
                );
                return Ok(RunReport {
                    outcome: RunOutcome::Cancelled,
                    direction: plan.direction,
                    applied,
                    marker,
                });
            }

            if let Err(e) = self.store.apply_step(&step.commit()) {
                error!(
                    "{} {} failed, marker left at {}: {e}",
                    step.direction,
                    step.revision,
                    marker_label(marker.as_ref())
                );
                return Err(e);
            }
            info!(
                "{} {} -> {}{}",
                step.direction,
                marker_label(step.marker_before.as_ref()),
                marker_label(step.marker_after.as_ref()),
                if step.message.is_empty() {
                    String::new()
                } else {
                    format!(", {}", step.message)
                }
            );
            applied.push(step.revision.clone());
            marker = step.marker_after.clone();
            if let Some(observer) = &self.observer {
                observer(step);
            }
        }

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            direction: plan.direction,
            applied,
            marker,
        })
    }
}
