//! Command-line surface: `graphalign build` archives a reference graph to
//! a k-mer index; `graphalign align` runs queries against it and writes
//! SAM or GPA.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::align::dp::ScoreParams;
use crate::align::scheduler::SchedulerConfig;
use crate::config::AlignConfig;
use crate::io::sam::ClipMode;

fn klen_is_good(s: &str) -> Result<u32> {
    let k: u32 = s.parse().map_err(|_| anyhow!("`{s}` can't be parsed as a number"))?;
    if !(4..=32).contains(&k) {
        bail!("klen = {k} must be within 4..=32");
    }
    Ok(k)
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Local alignment between two directed sequence graphs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// suppress informational log output (warnings and errors only)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// archive a GFA/FASTA reference into a k-mer-indexed graph
    #[command(arg_required_else_help = true)]
    Build(BuildOpts),

    /// align a query graph against an archived reference
    #[command(arg_required_else_help = true)]
    Align(AlignOpts),
}

#[derive(Args, Clone, Debug)]
pub struct BuildOpts {
    /// input reference, GFA or FASTA/FASTQ (optionally gzip/bzip2 compressed)
    #[arg(short, long, help_heading = "Input")]
    pub reference: PathBuf,

    /// k-mer length to index, must be within 4..=32
    #[arg(short, long, help_heading = "Index Construction", default_value_t = 14, value_parser = klen_is_good)]
    pub klen: u32,

    /// output archive path stem
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Sam,
    Gpa,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ClipArg {
    S,
    H,
}

impl From<ClipArg> for ClipMode {
    fn from(c: ClipArg) -> ClipMode {
        match c {
            ClipArg::S => ClipMode::Soft,
            ClipArg::H => ClipMode::Hard,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct AlignOpts {
    /// archived reference GFA/FASTA (rebuilt in-process; no on-disk index format)
    #[arg(short, long, help_heading = "Input")]
    pub reference: PathBuf,

    /// query GFA/FASTA/FASTQ, one alignment run per query graph/record
    #[arg(short = 'q', long, help_heading = "Input")]
    pub query: PathBuf,

    /// reload scoring/seeding knobs from a config sidecar written by
    /// `build` (`<prefix>.json`); any flag below that's also passed on
    /// the command line overrides the loaded value
    #[arg(long, help_heading = "Input")]
    pub index: Option<PathBuf>,

    /// output path; written in the format selected by `--format`
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Sam)]
    pub format: OutputFormat,

    /// k-mer length, must be within 4..=32 (default 14, or the value from `--index`)
    #[arg(short, long, help_heading = "Seeding", value_parser = klen_is_good)]
    pub klen: Option<u32>,

    /// seeds whose k-mer recurs more than this many times are never extended (default 100)
    #[arg(long, help_heading = "Seeding")]
    pub kmer_cnt_thresh: Option<usize>,

    /// minimum overlap-filter suppression depth before a seed is skipped (default 3)
    #[arg(long, help_heading = "Seeding")]
    pub overlap_thresh: Option<u32>,

    /// half-width of the overlap-filter diagonal window (default 32)
    #[arg(long, help_heading = "Seeding")]
    pub overlap_half_width: Option<i64>,

    /// minimum total score for an alignment to be reported (default 0)
    #[arg(long, help_heading = "Scoring")]
    pub score_thresh: Option<i64>,

    /// match score (default 2)
    #[arg(short = 'm', long, help_heading = "Scoring")]
    pub match_score: Option<i32>,

    /// mismatch penalty (default 3)
    #[arg(short = 'x', long, help_heading = "Scoring")]
    pub mismatch: Option<i32>,

    /// gap-open penalty (default 5)
    #[arg(long, help_heading = "Scoring")]
    pub gap_open: Option<i32>,

    /// gap-extend penalty (default 1)
    #[arg(long, help_heading = "Scoring")]
    pub gap_extend: Option<i32>,

    /// X-drop termination threshold (default 10)
    #[arg(long, help_heading = "Scoring")]
    pub xdrop: Option<i32>,

    /// cap on how many bases a single directional extension may walk (default 5000)
    #[arg(long, help_heading = "Scoring")]
    pub max_ext_len: Option<u32>,

    /// soft- or hard-clip unaligned query flanks in SAM output
    #[arg(long, value_enum, default_value_t = ClipArg::S)]
    pub clip: ClipArg,

    /// worker threads; 0 selects the number of logical CPUs
    #[arg(short, long, default_value_t = 0)]
    pub num_threads: usize,
}

impl AlignOpts {
    /// Loads the `--index` config sidecar, if one was given.
    pub fn load_config(&self) -> crate::error::Result<Option<AlignConfig>> {
        match &self.index {
            Some(path) => AlignConfig::load(path).map(Some),
            None => Ok(None),
        }
    }

    /// Merges this run's explicit CLI flags over `loaded` (a config
    /// sidecar reloaded via `--index`, if any) or over this crate's
    /// hardcoded defaults, so a run need not repeat every knob on the
    /// command line once a reference has been built once.
    pub fn resolved_scheduler_config(&self, loaded: Option<&AlignConfig>) -> SchedulerConfig {
        let k = self.klen.unwrap_or_else(|| loaded.map_or(14, |c| c.k));
        let kmer_cnt_thresh = self.kmer_cnt_thresh.unwrap_or_else(|| loaded.map_or(100, |c| c.kmer_cnt_thresh));
        let overlap_thresh = self.overlap_thresh.unwrap_or_else(|| loaded.map_or(3, |c| c.overlap_thresh));
        let overlap_half_width = self.overlap_half_width.unwrap_or_else(|| loaded.map_or(32, |c| c.overlap_half_width));
        let score_thresh = self.score_thresh.unwrap_or_else(|| loaded.map_or(0, |c| c.score_thresh));
        let max_ext_len = self.max_ext_len.unwrap_or_else(|| loaded.map_or(5000, |c| c.max_ext_len));
        let m = self.match_score.unwrap_or_else(|| loaded.map_or(2, |c| c.score.m));
        let x = self.mismatch.unwrap_or_else(|| loaded.map_or(3, |c| c.score.x));
        let gi = self.gap_open.unwrap_or_else(|| loaded.map_or(5, |c| c.score.gi));
        let ge = self.gap_extend.unwrap_or_else(|| loaded.map_or(1, |c| c.score.ge));
        let xdrop = self.xdrop.unwrap_or_else(|| loaded.map_or(10, |c| c.score.xdrop));
        SchedulerConfig {
            k,
            kmer_cnt_thresh,
            overlap_thresh,
            overlap_half_width,
            score_thresh,
            max_ext_len,
            scorer: ScoreParams::simple(m, x, gi, ge, xdrop),
        }
    }

    pub fn resolved_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }
}
