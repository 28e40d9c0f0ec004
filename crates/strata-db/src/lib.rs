pub mod ddl;
pub mod journal;
pub mod lock;
pub mod store;
pub mod version_table;

pub use journal::{JournalAction, JournalEntry};
pub use lock::{LockInfo, RunLock};
pub use store::{SqliteStore, StepCommit, StoreOptions};
pub use version_table::DEFAULT_VERSION_TABLE;
