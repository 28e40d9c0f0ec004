use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("duplicate revision: {0}")]
    DuplicateRevision(String),

    #[error("revision {revision} names unknown parent {parent}")]
    DanglingParent { revision: String, parent: String },

    #[error("multiple root revisions in a linear history: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("revision history contains a cycle through {0}")]
    Cycle(String),

    #[error("no path between {from} and {to}")]
    NoPath { from: String, to: String },

    #[error("ambiguous history at {at}: candidates {}", .candidates.join(", "))]
    AmbiguousHistory { at: String, candidates: Vec<String> },

    #[error("action failed at revision {revision} ({direction}): {reason}")]
    ActionFailed {
        revision: String,
        direction: String,
        reason: String,
    },

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("invalid revision id: {0}")]
    InvalidRevisionId(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("marker mismatch: expected {expected}, found {found}")]
    MarkerMismatch { expected: String, found: String },

    #[error("store is locked by {holder} since {since}")]
    Locked { holder: String, since: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("descriptor error: {0}")]
    Descriptor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors raised while loading descriptors, building the graph
    /// or planning, before the store is touched.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRevision(_)
                | Error::DanglingParent { .. }
                | Error::MultipleRoots(_)
                | Error::Cycle(_)
                | Error::NoPath { .. }
                | Error::AmbiguousHistory { .. }
                | Error::UnknownRevision(_)
                | Error::InvalidTarget(_)
                | Error::InvalidRevisionId(_)
                | Error::Descriptor(_)
        )
    }
}
