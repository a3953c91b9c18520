//! On-disk knob sidecar: a `serde`-derived [`AlignConfig`] written next to
//! a reference archive by `graphalign build` and reloaded by `graphalign
//! align --index`, so a run need not repeat every scoring/seeding flag on
//! the command line.
//!
//! This is a convenience for re-running with the same knobs, not a
//! serialized index: the reference archive itself has no portable
//! on-disk format and is always rebuilt from its source GFA/FASTA on
//! each run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::align::dp::ScoreParams;
use crate::align::scheduler::SchedulerConfig;
use crate::error::{AlignError, Result};
use crate::graph::GraphStats;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub m: i32,
    pub x: i32,
    pub gi: i32,
    pub ge: i32,
    pub xdrop: i32,
}

impl Default for ScoreConfig {
    /// Mirrors `ScoreParams::simple`'s defaults.
    fn default() -> Self {
        ScoreConfig { m: 2, x: 3, gi: 5, ge: 1, xdrop: 10 }
    }
}

/// Every scoring/seeding knob a run can set, plus the reference path it
/// was built from and the stats logged at archive time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignConfig {
    pub reference_path: PathBuf,
    pub k: u32,
    pub kmer_cnt_thresh: usize,
    pub overlap_thresh: u32,
    pub overlap_half_width: i64,
    pub score_thresh: i64,
    pub max_ext_len: u32,
    pub score: ScoreConfig,
    pub section_count: u32,
    pub base_count: u64,
    pub link_count: u32,
}

impl AlignConfig {
    pub fn new(reference_path: PathBuf, k: u32, stats: GraphStats) -> Self {
        AlignConfig {
            reference_path,
            k,
            kmer_cnt_thresh: 100,
            overlap_thresh: 3,
            overlap_half_width: 32,
            score_thresh: 0,
            max_ext_len: 5000,
            score: ScoreConfig::default(),
            section_count: stats.section_count,
            base_count: stats.base_count,
            link_count: stats.link_count,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            k: self.k,
            kmer_cnt_thresh: self.kmer_cnt_thresh,
            overlap_thresh: self.overlap_thresh,
            overlap_half_width: self.overlap_half_width,
            score_thresh: self.score_thresh,
            max_ext_len: self.max_ext_len,
            scorer: ScoreParams::simple(self.score.m, self.score.x, self.score.gi, self.score.ge, self.score.xdrop),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(AlignError::Io)?;
        serde_json::from_str(&text).map_err(|e| {
            AlignError::BadFormat {
                kind: "config",
                path: path.to_path_buf(),
                offset: 0,
                detail: e.to_string(),
            }
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| AlignError::InvalidArgs(e.to_string()))?;
        std::fs::write(path, text).map_err(AlignError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let stats = GraphStats { section_count: 3, base_count: 120, link_count: 2 };
        let cfg = AlignConfig::new(PathBuf::from("ref.gfa"), 14, stats);
        let dir = std::env::temp_dir().join(format!("graphalign-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("idx.json");
        cfg.save(&path).unwrap();
        let loaded = AlignConfig::load(&path).unwrap();
        assert_eq!(loaded.k, 14);
        assert_eq!(loaded.section_count, 3);
        assert_eq!(loaded.reference_path, PathBuf::from("ref.gfa"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
