//! Components D, E, F: the band DP engine, the seed-and-extend scheduler,
//! and the interval tree that backs its overlap filter.

pub mod dp;
pub mod ivtree;
pub mod result;
pub mod scheduler;

pub use dp::{DpContext, ScoreParams};
pub use ivtree::IvTree;
pub use result::{AlignmentResult, PathSection};
pub use scheduler::{align_query, AlignStats, SchedulerConfig, SchedulerContext};
