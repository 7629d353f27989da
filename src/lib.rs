pub mod config;
pub mod error;
pub mod graph;
pub mod ident;
pub mod session;
pub mod store;
pub mod web;

pub use config::Config;
pub use error::{CimscopeError, Result};
pub use ident::{CompositeId, FileRegistry};
pub use session::{ExplorationSession, ExploreSettings};
pub use store::{GraphStore, MemoryStore};
