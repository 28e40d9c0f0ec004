pub mod descriptor;
pub mod executor;
pub mod graph;
pub mod loader;
pub mod migrator;
pub mod offline;
pub mod planner;
pub mod scaffold;

pub use descriptor::{Action, Descriptor};
pub use executor::{CancelToken, Executor, RunOutcome, RunReport};
pub use graph::{GraphOptions, RevisionGraph};
pub use migrator::{HistoryEntry, Migrator};
pub use planner::{Plan, Planner, Step, Target};
