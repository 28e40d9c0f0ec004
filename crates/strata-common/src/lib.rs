pub mod error;
pub mod operation;
pub mod revision;

pub use error::{Error, Result};
pub use operation::{Column, ColumnType, Operation};
pub use revision::{Direction, RevisionId, marker_label};
