use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_common::{Direction, Error, Operation, Result, RevisionId};
use strata_db::ddl;

/// Ordered list of schema operations forming one direction of a migration.
/// An empty action is a valid no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Vec<Operation>);

impl Action {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self(operations)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.0
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Operation>> for Action {
    fn from(operations: Vec<Operation>) -> Self {
        Self(operations)
    }
}

/// A migration descriptor: one revision with its parent link and its
/// forward and inverse actions. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    id: RevisionId,
    #[serde(default, alias = "parent_id", alias = "down_revision")]
    parent: Option<RevisionId>,
    #[serde(default)]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    upgrade: Action,
    #[serde(default)]
    downgrade: Action,
}

impl Descriptor {
    pub fn new(id: RevisionId, parent: Option<RevisionId>) -> Self {
        Self {
            id,
            parent,
            message: String::new(),
            created_at: None,
            upgrade: Action::default(),
            downgrade: Action::default(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_upgrade(mut self, action: impl Into<Action>) -> Self {
        self.upgrade = action.into();
        self
    }

    pub fn with_downgrade(mut self, action: impl Into<Action>) -> Self {
        self.downgrade = action.into();
        self
    }

    pub fn id(&self) -> &RevisionId {
        &self.id
    }

    pub fn parent(&self) -> Option<&RevisionId> {
        self.parent.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn upgrade(&self) -> &Action {
        &self.upgrade
    }

    pub fn downgrade(&self) -> &Action {
        &self.downgrade
    }

    pub fn action(&self, direction: Direction) -> &Action {
        match direction {
            Direction::Upgrade => &self.upgrade,
            Direction::Downgrade => &self.downgrade,
        }
    }

    /// Check that every operation in both directions renders to SQL.
    pub fn validate(&self) -> Result<()> {
        for direction in [Direction::Upgrade, Direction::Downgrade] {
            for op in self.action(direction).operations() {
                ddl::validate(op).map_err(|e| {
                    let reason = match e {
                        Error::Descriptor(msg) => msg,
                        other => other.to_string(),
                    };
                    Error::Descriptor(format!("revision {} {direction}: {reason}", self.id))
                })?;
            }
        }
        Ok(())
    }
}
