//! Offline mode: render a plan as a SQL script instead of running it.

use std::fmt::Write as _;

use strata_common::{Result, marker_label};
use strata_db::{SqliteStore, ddl, version_table};

use crate::planner::Plan;

/// Render `plan` as one transaction per step, each ending with the marker
/// update that an online run would commit alongside it.
pub fn render_plan(plan: &Plan, version_table: &str) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "-- {} {} -> {}",
        plan.direction,
        marker_label(plan.from.as_ref()),
        marker_label(plan.to.as_ref())
    );
    if plan.is_empty() {
        out.push_str("-- nothing to do\n");
        return Ok(out);
    }

    for step in &plan.steps {
        out.push('\n');
        let _ = writeln!(out, "-- Running {} {}", step.direction, step.revision);
        if !step.message.is_empty() {
            let _ = writeln!(out, "-- {}", step.message);
        }
        out.push_str("BEGIN;\n");
        for op in &step.operations {
            if op.applies_to(SqliteStore::DIALECT) {
                let _ = writeln!(out, "{}", ddl::render(op)?);
            } else {
                let _ = writeln!(out, "-- skipped: {}", op.describe());
            }
        }
        for stmt in version_table::write_sql(version_table, step.marker_after.as_ref()) {
            let _ = writeln!(out, "{stmt}");
        }
        out.push_str("COMMIT;\n");
    }
    Ok(out)
}
