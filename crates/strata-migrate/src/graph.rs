//! Revision graph construction and queries.
//!
//! The graph is built once from an unordered set of descriptors and is
//! read-only afterwards. Parent links are validated up front so that every
//! revision's lineage ends at a root.

use std::collections::{HashMap, HashSet, VecDeque};

use strata_common::{Error, Result, RevisionId};
use tracing::debug;

use crate::descriptor::Descriptor;

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    /// Reject histories with more than one root.
    pub linear: bool,
}

#[derive(Debug, Clone)]
pub struct RevisionGraph {
    descriptors: HashMap<RevisionId, Descriptor>,
    children: HashMap<RevisionId, Vec<RevisionId>>,
    roots: Vec<RevisionId>,
}

impl RevisionGraph {
    pub fn build(
        descriptors: impl IntoIterator<Item = Descriptor>,
        options: GraphOptions,
    ) -> Result<Self> {
        let mut map: HashMap<RevisionId, Descriptor> = HashMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            let id = descriptor.id().clone();
            if map.insert(id.clone(), descriptor).is_some() {
                return Err(Error::DuplicateRevision(id.to_string()));
            }
        }

        let mut ids: Vec<&RevisionId> = map.keys().collect();
        ids.sort();

        let mut children: HashMap<RevisionId, Vec<RevisionId>> = HashMap::new();
        let mut roots = Vec::new();
        for id in ids {
            match map[id].parent() {
                None => roots.push(id.clone()),
                Some(parent) => {
                    if !map.contains_key(parent) {
                        return Err(Error::DanglingParent {
                            revision: id.to_string(),
                            parent: parent.to_string(),
                        });
                    }
                    children.entry(parent.clone()).or_default().push(id.clone());
                }
            }
        }

        check_acyclic(&map, &children, &roots)?;

        if options.linear && roots.len() > 1 {
            return Err(Error::MultipleRoots(
                roots.iter().map(|r| r.to_string()).collect(),
            ));
        }

        debug!(
            "built revision graph: {} revision(s), {} root(s)",
            map.len(),
            roots.len()
        );
        Ok(Self {
            descriptors: map,
            children,
            roots,
        })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn contains(&self, id: &RevisionId) -> bool {
        self.descriptors.contains_key(id)
    }

    pub fn get(&self, id: &RevisionId) -> Result<&Descriptor> {
        self.descriptors
            .get(id)
            .ok_or_else(|| Error::UnknownRevision(id.to_string()))
    }

    pub fn parent(&self, id: &RevisionId) -> Option<&RevisionId> {
        self.descriptors.get(id).and_then(|d| d.parent())
    }

    /// Children of `id`, sorted by identifier.
    pub fn children(&self, id: &RevisionId) -> &[RevisionId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[RevisionId] {
        &self.roots
    }

    /// Revisions nothing builds on, sorted by identifier.
    pub fn heads(&self) -> Vec<&RevisionId> {
        let mut heads: Vec<&RevisionId> = self
            .descriptors
            .keys()
            .filter(|id| self.children(id).is_empty())
            .collect();
        heads.sort();
        heads
    }

    /// `id` followed by each of its ancestors, ending at a root.
    pub fn lineage(&self, id: &RevisionId) -> Result<Vec<&RevisionId>> {
        let mut chain = vec![self.get(id)?.id()];
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            chain.push(parent);
            cursor = parent;
        }
        Ok(chain)
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: &RevisionId, descendant: &RevisionId) -> bool {
        let mut cursor = descendant;
        while let Some(parent) = self.parent(cursor) {
            if parent == ancestor {
                return true;
            }
            cursor = parent;
        }
        false
    }

    /// All descriptors, parents before children, siblings by identifier.
    pub fn ordered(&self) -> Vec<&Descriptor> {
        let mut ordered = Vec::with_capacity(self.descriptors.len());
        let mut stack: Vec<&RevisionId> = self.roots.iter().rev().collect();
        while let Some(id) = stack.pop() {
            ordered.push(&self.descriptors[id]);
            stack.extend(self.children(id).iter().rev());
        }
        ordered
    }
}

/// Every revision must be reachable from a root. Anything left over sits on
/// (or hangs off) a parent cycle.
fn check_acyclic(
    map: &HashMap<RevisionId, Descriptor>,
    children: &HashMap<RevisionId, Vec<RevisionId>>,
    roots: &[RevisionId],
) -> Result<()> {
    let mut reached: HashSet<&RevisionId> = HashSet::with_capacity(map.len());
    let mut queue: VecDeque<&RevisionId> = roots.iter().collect();
    while let Some(id) = queue.pop_front() {
        if reached.insert(id) {
            if let Some(kids) = children.get(id) {
                queue.extend(kids.iter());
            }
        }
    }
    if reached.len() == map.len() {
        return Ok(());
    }

    let mut stranded: Vec<&RevisionId> = map.keys().filter(|id| !reached.contains(id)).collect();
    stranded.sort();

    // Walk up from the first stranded revision until a revision repeats.
    let mut seen = HashSet::new();
    let mut cursor = stranded[0];
    while seen.insert(cursor) {
        match map[cursor].parent() {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    Err(Error::Cycle(cursor.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(s: &str) -> RevisionId {
        RevisionId::parse(s).unwrap()
    }

    fn desc(id: &str, parent: Option<&str>) -> Descriptor {
        Descriptor::new(rev(id), parent.map(rev))
    }

    fn chain(ids: &[&str]) -> Vec<Descriptor> {
        let mut out = Vec::new();
        let mut parent = None;
        for id in ids {
            out.push(desc(id, parent));
            parent = Some(*id);
        }
        out
    }

    #[test]
    fn builds_linear_chain_from_unordered_input() {
        let mut descriptors = chain(&["001", "002", "006", "010"]);
        descriptors.reverse();
        let graph = RevisionGraph::build(descriptors, GraphOptions { linear: true }).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots(), &[rev("001")]);
        assert_eq!(graph.heads(), vec![&rev("010")]);
        assert_eq!(graph.children(&rev("002")), &[rev("006")]);
        assert_eq!(graph.parent(&rev("006")), Some(&rev("002")));

        let ordered: Vec<&str> = graph.ordered().iter().map(|d| d.id().as_str()).collect();
        assert_eq!(ordered, vec!["001", "002", "006", "010"]);
    }

    #[test]
    fn duplicate_revision_is_rejected() {
        let descriptors = vec![desc("001", None), desc("001", None)];
        match RevisionGraph::build(descriptors, GraphOptions::default()) {
            Err(Error::DuplicateRevision(id)) => assert_eq!(id, "001"),
            other => panic!("expected DuplicateRevision, got {other:?}"),
        }
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let descriptors = vec![desc("001", None), desc("003", Some("002"))];
        match RevisionGraph::build(descriptors, GraphOptions::default()) {
            Err(Error::DanglingParent { revision, parent }) => {
                assert_eq!(revision, "003");
                assert_eq!(parent, "002");
            }
            other => panic!("expected DanglingParent, got {other:?}"),
        }
    }

    #[test]
    fn multiple_roots_only_rejected_for_linear_history() {
        let descriptors = vec![desc("a1", None), desc("b1", None), desc("a2", Some("a1"))];
        let graph = RevisionGraph::build(descriptors.clone(), GraphOptions::default()).unwrap();
        assert_eq!(graph.roots(), &[rev("a1"), rev("b1")]);

        match RevisionGraph::build(descriptors, GraphOptions { linear: true }) {
            Err(Error::MultipleRoots(roots)) => assert_eq!(roots, vec!["a1", "b1"]),
            other => panic!("expected MultipleRoots, got {other:?}"),
        }
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let descriptors = vec![
            desc("001", None),
            desc("a", Some("c")),
            desc("b", Some("a")),
            desc("c", Some("b")),
            desc("d", Some("c")),
        ];
        match RevisionGraph::build(descriptors, GraphOptions::default()) {
            Err(Error::Cycle(at)) => assert!(["a", "b", "c"].contains(&at.as_str())),
            other => panic!("expected Cycle, got {other:?}"),
        }

        let self_loop = vec![desc("x", Some("x"))];
        assert!(matches!(
            RevisionGraph::build(self_loop, GraphOptions::default()),
            Err(Error::Cycle(_))
        ));
    }

    #[test]
    fn lineage_and_ancestry() {
        let graph =
            RevisionGraph::build(chain(&["001", "002", "003"]), GraphOptions::default()).unwrap();
        let lineage: Vec<&str> = graph
            .lineage(&rev("003"))
            .unwrap()
            .iter()
            .map(|r| r.as_str())
            .collect();
        assert_eq!(lineage, vec!["003", "002", "001"]);

        assert!(graph.is_ancestor(&rev("001"), &rev("003")));
        assert!(!graph.is_ancestor(&rev("003"), &rev("001")));
        assert!(!graph.is_ancestor(&rev("002"), &rev("002")));
        assert!(matches!(
            graph.lineage(&rev("999")),
            Err(Error::UnknownRevision(_))
        ));
    }

    #[test]
    fn branching_history_has_several_heads() {
        let descriptors = vec![
            desc("001", None),
            desc("002a", Some("001")),
            desc("002b", Some("001")),
            desc("003", Some("002a")),
        ];
        let graph = RevisionGraph::build(descriptors, GraphOptions { linear: true }).unwrap();
        assert_eq!(graph.heads(), vec![&rev("002b"), &rev("003")]);

        let ordered: Vec<&str> = graph.ordered().iter().map(|d| d.id().as_str()).collect();
        assert_eq!(ordered, vec!["001", "002a", "003", "002b"]);
    }

    #[test]
    fn malformed_operation_fails_the_build() {
        use strata_common::{Column, ColumnType, Operation};

        let broken = desc("002", Some("001")).with_downgrade(vec![Operation::AddColumn {
            table: "games".into(),
            column: Column::new("status", ColumnType::Enum),
        }]);
        match RevisionGraph::build(vec![desc("001", None), broken], GraphOptions::default()) {
            Err(Error::Descriptor(msg)) => {
                assert!(msg.starts_with("revision 002 downgrade:"), "{msg}");
                assert!(msg.contains("declares no values"), "{msg}");
            }
            other => panic!("expected Descriptor, got {other:?}"),
        }
    }

    #[test]
    fn empty_graph_is_valid() {
        let graph = RevisionGraph::build(Vec::new(), GraphOptions { linear: true }).unwrap();
        assert!(graph.is_empty());
        assert!(graph.heads().is_empty());
        assert!(graph.ordered().is_empty());
    }
}
