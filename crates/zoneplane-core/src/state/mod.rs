// # Store Implementations
//
// Implementations of the Store trait for different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileStore, FileStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};
