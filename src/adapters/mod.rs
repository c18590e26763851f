// Adapters layer: concrete implementations of the domain ports.

pub mod dry_run;
pub mod http;
pub mod memory;

pub use dry_run::DryRunStore;
pub use http::{HttpEntityStore, HttpNotifier, NullNotifier};
pub use memory::{MemoryNotifier, MemoryStore};
