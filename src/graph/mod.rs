//! Graph exploration: bounded traversal and entity projection.
//!
//! Traversal walks ascendants/descendants of a seed under depth and
//! node-count bounds; projection turns raw entity facts into the record the
//! UI displays.

pub mod projection;
pub mod traversal;

pub use projection::{project, ProjectedNode};
pub use traversal::{ascendants, descendants, neighborhood, Direction, Traversal};
