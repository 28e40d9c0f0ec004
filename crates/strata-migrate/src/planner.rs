use std::fmt;
use std::str::FromStr;

use strata_common::{Direction, Error, Operation, Result, RevisionId, marker_label};
use strata_db::StepCommit;

use crate::graph::RevisionGraph;

/// Where a run should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The single head of the graph.
    Head,
    /// The empty store.
    Base,
    Revision(RevisionId),
    /// Steps relative to the current marker: `+2`, `-1`.
    Relative(i64),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "head" | "heads" => return Ok(Target::Head),
            "base" => return Ok(Target::Base),
            _ => {}
        }
        if let Some(rest) = s.strip_prefix('+').or_else(|| s.strip_prefix('-')) {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                let n: i64 = rest.parse().map_err(|_| {
                    Error::InvalidTarget(format!("relative target {s} is too large"))
                })?;
                return Ok(Target::Relative(if s.starts_with('-') { -n } else { n }));
            }
        }
        RevisionId::parse(s)
            .map(Target::Revision)
            .map_err(|e| Error::InvalidTarget(format!("{s}: {e}")))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Head => f.write_str("head"),
            Target::Base => f.write_str("base"),
            Target::Revision(id) => write!(f, "{id}"),
            Target::Relative(n) => write!(f, "{n:+}"),
        }
    }
}

/// One revision's action, with the markers it moves between.
#[derive(Debug, Clone)]
pub struct Step {
    pub revision: RevisionId,
    pub direction: Direction,
    pub message: String,
    pub operations: Vec<Operation>,
    pub marker_before: Option<RevisionId>,
    pub marker_after: Option<RevisionId>,
}

impl Step {
    pub fn commit(&self) -> StepCommit<'_> {
        StepCommit {
            revision: &self.revision,
            direction: self.direction,
            operations: &self.operations,
            marker_before: self.marker_before.as_ref(),
            marker_after: self.marker_after.as_ref(),
        }
    }
}

/// Ordered steps connecting two revisions.
#[derive(Debug, Clone)]
pub struct Plan {
    pub from: Option<RevisionId>,
    pub to: Option<RevisionId>,
    pub direction: Direction,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn revisions(&self) -> Vec<&RevisionId> {
        self.steps.iter().map(|s| &s.revision).collect()
    }
}

pub struct Planner<'g> {
    graph: &'g RevisionGraph,
}

impl<'g> Planner<'g> {
    pub fn new(graph: &'g RevisionGraph) -> Self {
        Self { graph }
    }

    /// Resolve a target against the current marker.
    pub fn resolve(
        &self,
        current: Option<&RevisionId>,
        target: &Target,
    ) -> Result<Option<RevisionId>> {
        if let Some(id) = current {
            self.graph.get(id)?;
        }
        match target {
            Target::Base => Ok(None),
            Target::Revision(id) => {
                self.graph.get(id)?;
                Ok(Some(id.clone()))
            }
            Target::Head => {
                let heads = self.graph.heads();
                match heads.as_slice() {
                    [] => Ok(None),
                    [head] => Ok(Some((*head).clone())),
                    _ => Err(Error::AmbiguousHistory {
                        at: "head".into(),
                        candidates: heads.iter().map(|h| h.to_string()).collect(),
                    }),
                }
            }
            Target::Relative(n) if *n >= 0 => self.walk_forward(current, *n as u64),
            Target::Relative(n) => self.walk_back(current, n.unsigned_abs()),
        }
    }

    fn walk_forward(&self, current: Option<&RevisionId>, n: u64) -> Result<Option<RevisionId>> {
        let mut cursor = current.cloned();
        for taken in 0..n {
            let candidates = match &cursor {
                None => self.graph.roots(),
                Some(id) => self.graph.children(id),
            };
            match candidates {
                [] => {
                    return Err(Error::InvalidTarget(format!(
                        "+{n} walks past head {} after {taken} step(s)",
                        marker_label(cursor.as_ref())
                    )));
                }
                [next] => cursor = Some(next.clone()),
                _ => {
                    return Err(Error::AmbiguousHistory {
                        at: marker_label(cursor.as_ref()),
                        candidates: candidates.iter().map(|c| c.to_string()).collect(),
                    });
                }
            }
        }
        Ok(cursor)
    }

    fn walk_back(&self, current: Option<&RevisionId>, n: u64) -> Result<Option<RevisionId>> {
        let mut cursor = current.cloned();
        for taken in 0..n {
            match cursor {
                None => {
                    return Err(Error::InvalidTarget(format!(
                        "-{n} walks past base after {taken} step(s)"
                    )));
                }
                Some(id) => cursor = self.graph.parent(&id).cloned(),
            }
        }
        Ok(cursor)
    }

    /// Steps leading from `from` to `to`. Either end may be `None` (base).
    pub fn plan(&self, from: Option<&RevisionId>, to: Option<&RevisionId>) -> Result<Plan> {
        for id in [from, to].into_iter().flatten() {
            self.graph.get(id)?;
        }

        let empty = |direction| Plan {
            from: from.cloned(),
            to: to.cloned(),
            direction,
            steps: Vec::new(),
        };

        if from == to {
            return Ok(empty(Direction::Upgrade));
        }

        match (from, to) {
            (None, Some(t)) => {
                let mut chain = self.graph.lineage(t)?;
                chain.reverse();
                self.build(from, to, Direction::Upgrade, &chain)
            }
            (Some(f), None) => {
                let chain = self.graph.lineage(f)?;
                self.build(from, to, Direction::Downgrade, &chain)
            }
            (Some(f), Some(t)) => {
                let up = self.graph.lineage(t)?;
                if let Some(pos) = up.iter().position(|r| *r == f) {
                    let mut chain = up[..pos].to_vec();
                    chain.reverse();
                    return self.build(from, to, Direction::Upgrade, &chain);
                }
                let down = self.graph.lineage(f)?;
                if let Some(pos) = down.iter().position(|r| *r == t) {
                    return self.build(from, to, Direction::Downgrade, &down[..pos]);
                }
                Err(Error::NoPath {
                    from: f.to_string(),
                    to: t.to_string(),
                })
            }
            (None, None) => Ok(empty(Direction::Upgrade)),
        }
    }

    /// Resolve `target` from `current` and plan the way there.
    pub fn plan_to(&self, current: Option<&RevisionId>, target: &Target) -> Result<Plan> {
        let to = self.resolve(current, target)?;
        self.plan(current, to.as_ref())
    }

    fn build(
        &self,
        from: Option<&RevisionId>,
        to: Option<&RevisionId>,
        direction: Direction,
        chain: &[&RevisionId],
    ) -> Result<Plan> {
        let mut steps = Vec::with_capacity(chain.len());
        for id in chain {
            let descriptor = self.graph.get(id)?;
            let parent = descriptor.parent().cloned();
            let (before, after) = match direction {
                Direction::Upgrade => (parent, Some(descriptor.id().clone())),
                Direction::Downgrade => (Some(descriptor.id().clone()), parent),
            };
            steps.push(Step {
                revision: descriptor.id().clone(),
                direction,
                message: descriptor.message().to_string(),
                operations: descriptor.action(direction).operations().to_vec(),
                marker_before: before,
                marker_after: after,
            });
        }
        Ok(Plan {
            from: from.cloned(),
            to: to.cloned(),
            direction,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::graph::GraphOptions;

    fn rev(s: &str) -> RevisionId {
        RevisionId::parse(s).unwrap()
    }

    fn graph(edges: &[(&str, Option<&str>)]) -> RevisionGraph {
        let descriptors = edges
            .iter()
            .map(|(id, parent)| Descriptor::new(rev(id), parent.map(rev)));
        RevisionGraph::build(descriptors, GraphOptions::default()).unwrap()
    }

    fn linear() -> RevisionGraph {
        graph(&[
            ("001", None),
            ("002", Some("001")),
            ("006", Some("002")),
            ("010", Some("006")),
        ])
    }

    fn ids(plan: &Plan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.revision.as_str()).collect()
    }

    #[test]
    fn parses_targets() {
        assert_eq!("head".parse::<Target>().unwrap(), Target::Head);
        assert_eq!("heads".parse::<Target>().unwrap(), Target::Head);
        assert_eq!("base".parse::<Target>().unwrap(), Target::Base);
        assert_eq!("+2".parse::<Target>().unwrap(), Target::Relative(2));
        assert_eq!("-1".parse::<Target>().unwrap(), Target::Relative(-1));
        assert_eq!(
            "012".parse::<Target>().unwrap(),
            Target::Revision(rev("012"))
        );
        assert!("no such".parse::<Target>().is_err());
        assert_eq!(Target::Relative(-3).to_string(), "-3");
        assert_eq!(Target::Relative(2).to_string(), "+2");
    }

    #[test]
    fn same_revision_plans_nothing() {
        let g = linear();
        let planner = Planner::new(&g);
        for id in ["001", "006", "010"] {
            let r = rev(id);
            assert!(planner.plan(Some(&r), Some(&r)).unwrap().is_empty());
        }
        assert!(planner.plan(None, None).unwrap().is_empty());
    }

    #[test]
    fn upgrade_from_base_runs_every_revision_in_order() {
        let g = linear();
        let plan = Planner::new(&g).plan(None, Some(&rev("010"))).unwrap();
        assert_eq!(plan.direction, Direction::Upgrade);
        assert_eq!(ids(&plan), vec!["001", "002", "006", "010"]);
        assert_eq!(plan.steps[0].marker_before, None);
        assert_eq!(plan.steps[0].marker_after, Some(rev("001")));
        assert_eq!(plan.steps[3].marker_before, Some(rev("006")));
    }

    #[test]
    fn upgrade_between_revisions_excludes_start() {
        let g = linear();
        let plan = Planner::new(&g)
            .plan(Some(&rev("002")), Some(&rev("010")))
            .unwrap();
        assert_eq!(ids(&plan), vec!["006", "010"]);
    }

    #[test]
    fn downgrade_runs_newest_first_and_stops_above_target() {
        let g = linear();
        let plan = Planner::new(&g)
            .plan(Some(&rev("010")), Some(&rev("001")))
            .unwrap();
        assert_eq!(plan.direction, Direction::Downgrade);
        assert_eq!(ids(&plan), vec!["010", "006", "002"]);
        assert_eq!(plan.steps[2].marker_before, Some(rev("002")));
        assert_eq!(plan.steps[2].marker_after, Some(rev("001")));
    }

    #[test]
    fn downgrade_to_base_includes_root() {
        let g = linear();
        let plan = Planner::new(&g).plan(Some(&rev("006")), None).unwrap();
        assert_eq!(ids(&plan), vec!["006", "002", "001"]);
        assert_eq!(plan.steps.last().unwrap().marker_after, None);
    }

    #[test]
    fn sibling_branches_have_no_path() {
        let g = graph(&[
            ("001", None),
            ("002a", Some("001")),
            ("002b", Some("001")),
        ]);
        let err = Planner::new(&g)
            .plan(Some(&rev("002a")), Some(&rev("002b")))
            .unwrap_err();
        assert!(matches!(err, Error::NoPath { .. }));
    }

    #[test]
    fn explicit_target_on_branching_history_is_planned() {
        let g = graph(&[
            ("001", None),
            ("002a", Some("001")),
            ("002b", Some("001")),
            ("003", Some("002b")),
        ]);
        let plan = Planner::new(&g).plan(None, Some(&rev("003"))).unwrap();
        assert_eq!(ids(&plan), vec!["001", "002b", "003"]);
    }

    #[test]
    fn head_target_on_branching_history_is_ambiguous() {
        let g = graph(&[
            ("001", None),
            ("002a", Some("001")),
            ("002b", Some("001")),
        ]);
        let err = Planner::new(&g)
            .plan_to(Some(&rev("001")), &Target::Head)
            .unwrap_err();
        match err {
            Error::AmbiguousHistory { candidates, .. } => {
                assert_eq!(candidates, vec!["002a", "002b"])
            }
            other => panic!("expected AmbiguousHistory, got {other:?}"),
        }
    }

    #[test]
    fn relative_targets_walk_the_chain() {
        let g = linear();
        let planner = Planner::new(&g);
        assert_eq!(
            planner.resolve(None, &Target::Relative(2)).unwrap(),
            Some(rev("002"))
        );
        assert_eq!(
            planner
                .resolve(Some(&rev("006")), &Target::Relative(-2))
                .unwrap(),
            Some(rev("001"))
        );
        assert_eq!(
            planner
                .resolve(Some(&rev("002")), &Target::Relative(-2))
                .unwrap(),
            None
        );
        assert!(matches!(
            planner.resolve(Some(&rev("002")), &Target::Relative(-3)),
            Err(Error::InvalidTarget(_))
        ));
        assert!(matches!(
            planner.resolve(Some(&rev("006")), &Target::Relative(5)),
            Err(Error::InvalidTarget(_))
        ));
    }

    #[test]
    fn relative_upgrade_through_a_fork_is_ambiguous() {
        let g = graph(&[
            ("001", None),
            ("002a", Some("001")),
            ("002b", Some("001")),
        ]);
        assert!(matches!(
            Planner::new(&g).resolve(Some(&rev("001")), &Target::Relative(1)),
            Err(Error::AmbiguousHistory { .. })
        ));
    }

    #[test]
    fn unknown_revisions_are_rejected() {
        let g = linear();
        let planner = Planner::new(&g);
        assert!(matches!(
            planner.plan(Some(&rev("999")), None),
            Err(Error::UnknownRevision(_))
        ));
        assert!(matches!(
            planner.resolve(None, &Target::Revision(rev("999"))),
            Err(Error::UnknownRevision(_))
        ));
    }
}
