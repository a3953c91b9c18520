//! Component A: the immutable sequence graph store.

pub mod encode;
pub mod section;
pub mod store;

pub use section::{Gid, GidPos, KmerTuple, Section};
pub use store::{GraphStats, GraphStore};
