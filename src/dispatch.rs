//! The thread-pool/task-dispatcher primitive, treated as a black-box
//! parallel map-reduce over streamed query items.
//!
//! The core itself is single-threaded per alignment context; concurrency
//! comes from running one [`SchedulerContext`] per worker over disjoint
//! query items. A *source* (the caller's `Vec<QueryItem>`) is handed to
//! `rayon`'s indexed parallel iterator, a *worker* runs
//! [`align_query`] against a thread-local `SchedulerContext` (so no
//! worker allocates a fresh DP stack, interval tree, or repetitive-seed
//! map per item), and the *drain* is rayon's own indexed
//! collect/reduce — which reassembles results in source order without
//! this module maintaining a reordering buffer by hand, the same
//! embarrassingly-parallel fan-out the pack's genomics aligners
//! (`CDCgov-irma-core`'s `aligner_process`, `acg-team-ConSTRain`) use
//! `rayon` for.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::ThreadPoolBuilder;

use crate::align::scheduler::{align_query, AlignStats, SchedulerConfig, SchedulerContext};
use crate::align::result::AlignmentResult;
use crate::graph::store::GraphStore;

/// One query graph to align, carrying its source-stream position and
/// display name (the FASTA/FASTQ record name, or the query GFA's own
/// name for a whole-graph query).
pub struct QueryItem {
    pub index: u64,
    pub name: String,
    pub store: GraphStore,
}

/// One query's finished alignment set, still paired with its item so the
/// drain (SAM/GPA writer) can read section/sequence metadata off it.
pub struct QueryOutput {
    pub index: u64,
    pub name: String,
    pub store: GraphStore,
    pub results: Vec<AlignmentResult>,
}

/// Runs `align_query` for every item in `items` against `reference`,
/// using up to `num_threads` worker threads, and returns outputs in
/// source order together with the summed [`AlignStats`] across all
/// workers.
///
/// `num_threads = 0` uses rayon's default (the number of logical CPUs).
/// Falls back to the global pool if a scoped pool of the requested size
/// cannot be built (e.g. the global pool was already initialized
/// elsewhere in-process).
pub fn align_stream(
    reference: &GraphStore,
    cfg: &SchedulerConfig,
    items: Vec<QueryItem>,
    num_threads: usize,
) -> (Vec<QueryOutput>, AlignStats) {
    let run = |items: Vec<QueryItem>| -> (Vec<QueryOutput>, AlignStats) {
        let outputs: Vec<(QueryOutput, AlignStats)> = items
            .into_par_iter()
            .map_init(SchedulerContext::new, |ctx, item| {
                let results = align_query(reference, &item.store, cfg, ctx);
                let stats = ctx.stats;
                ctx.stats = AlignStats::default();
                (
                    QueryOutput {
                        index: item.index,
                        name: item.name,
                        store: item.store,
                        results,
                    },
                    stats,
                )
            })
            .collect();

        let mut total = AlignStats::default();
        let mut out = Vec::with_capacity(outputs.len());
        for (o, s) in outputs {
            total.merge(&s);
            out.push(o);
        }
        (out, total)
    };

    if num_threads == 0 {
        return run(items);
    }
    match ThreadPoolBuilder::new().num_threads(num_threads).build() {
        Ok(pool) => pool.install(|| run(items)),
        Err(_) => run(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::dp::ScoreParams;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            k: 8,
            kmer_cnt_thresh: 100,
            overlap_thresh: 3,
            overlap_half_width: 32,
            score_thresh: 0,
            max_ext_len: 200,
            scorer: ScoreParams::simple(2, 3, 5, 1, 10),
        }
    }

    fn single_section_store(name: &str, seq: &[u8]) -> GraphStore {
        let mut g = GraphStore::new(name);
        g.add_section_ascii(name, seq).unwrap();
        g.freeze().unwrap();
        g
    }

    #[test]
    fn outputs_preserve_source_order() {
        let seq = b"GGCTGCCTCCGAGCGTGTGGGCGAGGACAACCGCCCCACAGTCAAGCTCGAATGGGTGCTATTGCGTAGCTAGGACCGGCACT";
        let mut reference = GraphStore::new("reference");
        reference.add_section_ascii("ref1", seq).unwrap();
        reference.freeze().unwrap();
        reference.build_index(8).unwrap();

        let items: Vec<QueryItem> = (0..8u64)
            .map(|i| QueryItem {
                index: i,
                name: format!("q{i}"),
                store: single_section_store(&format!("q{i}"), &seq[16..16 + 30]),
            })
            .collect();

        let (outputs, _stats) = align_stream(&reference, &config(), items, 2);
        let indices: Vec<u64> = outputs.iter().map(|o| o.index).collect();
        assert_eq!(indices, (0..8u64).collect::<Vec<_>>());
        assert!(outputs.iter().all(|o| !o.results.is_empty()));
    }
}
