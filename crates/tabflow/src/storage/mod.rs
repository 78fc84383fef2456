//! Persistent storage for active window records
//!
//! The [`WindowStore`] trait is the durable key-value boundary behind the
//! active window cache. Two implementations are provided:
//! - [`InMemoryWindowStore`] for tests and throwaway simulator runs
//! - [`SqliteWindowStore`] for records that survive restarts

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryWindowStore;
pub use sqlite::SqliteWindowStore;
pub use traits::WindowStore;
