//! Thin CLI front end: argument parsing lives in [`graphalign::cli`]; this
//! binary wires parsed options to the library's reference/query ingestion,
//! the seed-and-extend scheduler, and the SAM/GPA writers, converting any
//! escaping [`graphalign::AlignError`] into an `anyhow::Error` and a
//! process exit code.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use graphalign::align::scheduler::AlignStats;
use graphalign::cli::{AlignOpts, BuildOpts, Cli, Commands, OutputFormat};
use graphalign::config::AlignConfig;
use graphalign::dispatch::{align_stream, QueryItem};
use graphalign::io::{gpa, read_query_records, read_reference, sam};

fn init_logging(quiet: bool) {
    let level = if quiet { Level::WARN } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn run_build(opts: BuildOpts) -> Result<()> {
    info!("starting graphalign build");
    let start = Instant::now();

    let mut reference = read_reference(&opts.reference)
        .with_context(|| format!("reading reference {}", opts.reference.display()))?;
    reference.freeze().context("freezing reference graph")?;
    let stats = reference
        .build_index(opts.klen)
        .context("building k-mer index")?;

    let cfg = AlignConfig::new(opts.reference.clone(), opts.klen, stats);
    let sidecar = opts.output.with_extension("json");
    cfg.save(&sidecar)
        .with_context(|| format!("writing index metadata to {}", sidecar.display()))?;

    info!(
        sections = stats.section_count,
        bases = stats.base_count,
        links = stats.link_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "graphalign build finished; metadata written to {}",
        sidecar.display()
    );
    Ok(())
}

fn run_align(opts: AlignOpts) -> Result<()> {
    info!("starting graphalign align");
    let start = Instant::now();

    let mut reference = read_reference(&opts.reference)
        .with_context(|| format!("reading reference {}", opts.reference.display()))?;
    reference.freeze().context("freezing reference graph")?;

    let index_display = opts.index.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
    let loaded_cfg = opts
        .load_config()
        .with_context(|| format!("loading index metadata from {index_display}"))?;
    let scheduler_cfg = opts.resolved_scheduler_config(loaded_cfg.as_ref());
    reference
        .build_index(scheduler_cfg.k)
        .context("building k-mer index")?;

    let query_records = read_query_records(&opts.query)
        .with_context(|| format!("reading query {}", opts.query.display()))?;
    if query_records.is_empty() {
        bail!("no usable query records found in {}", opts.query.display());
    }

    let items: Vec<QueryItem> = query_records
        .into_iter()
        .map(|r| QueryItem { index: r.index, name: r.name, store: r.store })
        .collect();

    let num_threads = opts.resolved_threads();
    let (mut outputs, stats) = align_stream(&reference, &scheduler_cfg, items, num_threads);
    outputs.sort_by_key(|o| o.index);

    let out_file = File::create(&opts.output)
        .with_context(|| format!("creating output file {}", opts.output.display()))?;
    let mut writer = BufWriter::new(out_file);

    match opts.format {
        OutputFormat::Sam => {
            sam::write_header(&mut writer, &reference)?;
            for out in &outputs {
                for result in &out.results {
                    sam::write_result(&mut writer, result, &reference, &out.store, opts.clip.into())?;
                }
            }
        }
        OutputFormat::Gpa => {
            gpa::write_header(&mut writer)?;
            for out in &outputs {
                for (i, result) in out.results.iter().enumerate() {
                    let aln_name = format!("{}.{}", out.name, i);
                    gpa::write_result(&mut writer, &aln_name, result, &reference, &out.store)?;
                }
            }
        }
    }
    writer.flush().context("flushing output")?;

    log_summary(&stats, start.elapsed().as_millis() as u64);
    Ok(())
}

fn log_summary(stats: &AlignStats, elapsed_ms: u64) {
    info!(
        seeds_seen = stats.seeds_seen,
        seeds_repetitive = stats.seeds_repetitive,
        seeds_overlap_suppressed = stats.seeds_overlap_suppressed,
        seeds_below_threshold = stats.seeds_below_threshold,
        seeds_extended = stats.seeds_extended,
        alignments_reported = stats.alignments_reported,
        elapsed_ms,
        "graphalign align finished"
    );
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        Commands::Build(opts) => run_build(opts),
        Commands::Align(opts) => run_align(opts),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            warn!("graphalign exiting with an error");
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
