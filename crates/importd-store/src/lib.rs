pub mod file;
pub mod memory;
pub mod traits;

pub use file::{FileJobStore, FileLogStore};
pub use memory::{MemoryJobStore, MemoryLogStore};
pub use traits::{JobPatch, JobStore, LogQuery, LogStore, Precondition, SortOrder};
