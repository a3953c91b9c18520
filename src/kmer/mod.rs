//! Components B and C: the graph k-mer enumerator and its index.

pub mod enumerator;
pub mod index;

pub use enumerator::{Direction, KmerEnumerator, KmerParams};
pub use index::KmerIndex;
