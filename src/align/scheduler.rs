//! Component E: the seed-and-extend scheduler.
//!
//! Drives one query graph against an archived reference graph: for every
//! query k-mer, looks up matching reference positions, filters out
//! repetitive and already-covered seeds, extends survivors bidirectionally
//! through the band DP engine, and deduplicates the per-query result set.
//! One [`SchedulerContext`] is owned by each worker thread (see
//! [`crate::dispatch`]) and reused across queries via `reset_per_query`, so
//! a run never allocates a fresh DP stack, interval tree, or repetitive-seed
//! map per query.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::align::dp::{DpContext, ExtensionTail, FillFrame, ScoreParams, StepOp, TERM, UPDATE_A, UPDATE_B};
use crate::align::ivtree::IvTree;
use crate::align::result::{AlignmentResult, PathSection};
use crate::error::{AlignError, Result};
use crate::graph::section::GidPos;
use crate::graph::store::GraphStore;
use crate::kmer::enumerator::{Direction, KmerEnumerator};

/// Caps how many section-pair frames a single directional extension may
/// pop off its heap before settling for the best frame found so far —
/// a backstop against combinatorial blowup on a densely branching graph.
const MAX_FRAMES_PER_EXTENSION: usize = 64;

/// One entry on the frame heap, ordered by `psum` ascending (a
/// [`std::cmp::Reverse`]-style min-heap over `BinaryHeap`'s native
/// max-heap) so the least-progressed frame is explored first.
struct PendingFrame {
    psum: i64,
    frame: FillFrame,
}

impl PartialEq for PendingFrame {
    fn eq(&self, other: &Self) -> bool {
        self.psum == other.psum
    }
}

impl Eq for PendingFrame {}

impl PartialOrd for PendingFrame {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingFrame {
    fn cmp(&self, other: &Self) -> Ordering {
        other.psum.cmp(&self.psum)
    }
}

/// Runs one directional extension from a shared seed column, driving
/// [`DpContext::fill_root`]/[`DpContext::fill`] from a min-heap of
/// pending section-pair frames: whenever a popped frame's status has
/// `UPDATE_A`/`UPDATE_B` set, one child frame is enqueued per successor
/// link on that side and the walk resumes there. Terminal frames (X-drop,
/// dead end, or budget exhaustion) are compared by score and the best one
/// becomes the direction's result.
#[allow(clippy::too_many_arguments)]
fn extend_directional(
    dp: &mut DpContext,
    cfg: &SchedulerConfig,
    a_store: &GraphStore,
    a_gid: crate::graph::section::Gid,
    a_pos: u32,
    b_store: &GraphStore,
    b_gid: crate::graph::section::Gid,
    b_pos: u32,
) -> Result<ExtensionTail> {
    let root = dp.fill_root(&cfg.scorer, a_store, a_gid, a_pos, b_store, b_gid, b_pos, cfg.max_ext_len)?;
    let mut heap = BinaryHeap::new();
    heap.push(PendingFrame { psum: root.record.psum, frame: root });

    let mut best: Option<FillFrame> = None;
    let mut popped = 0usize;

    while let Some(PendingFrame { frame, .. }) = heap.pop() {
        popped += 1;
        let keep_if_better = |best: &mut Option<FillFrame>, candidate: FillFrame| {
            if best.as_ref().map_or(true, |b| candidate.record.max > b.record.max) {
                *best = Some(candidate);
            }
        };

        if popped > MAX_FRAMES_PER_EXTENSION {
            keep_if_better(&mut best, frame);
            break;
        }

        let status = frame.record.status;
        if status & TERM != 0 || status & (UPDATE_A | UPDATE_B) == 0 {
            keep_if_better(&mut best, frame);
            continue;
        }
        let remaining = cfg.max_ext_len.saturating_sub(frame.record.psum as u32);
        if remaining == 0 {
            keep_if_better(&mut best, frame);
            continue;
        }

        if status & UPDATE_A != 0 {
            for &succ in a_store.links(frame.a_gid) {
                if let Ok(child) = dp.fill(
                    &cfg.scorer,
                    a_store,
                    succ,
                    0,
                    b_store,
                    frame.b_gid,
                    frame.b_pos,
                    &frame,
                    remaining,
                ) {
                    heap.push(PendingFrame { psum: child.record.psum, frame: child });
                }
            }
        }
        if status & UPDATE_B != 0 {
            for &succ in b_store.links(frame.b_gid) {
                if let Ok(child) = dp.fill(
                    &cfg.scorer,
                    a_store,
                    frame.a_gid,
                    frame.a_pos,
                    b_store,
                    succ,
                    0,
                    &frame,
                    remaining,
                ) {
                    heap.push(PendingFrame { psum: child.record.psum, frame: child });
                }
            }
        }
    }

    let frame = best.ok_or_else(|| AlignError::InvalidArgs("extension produced no frames".to_string()))?;
    Ok(DpContext::finalize(&frame))
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub k: u32,
    pub kmer_cnt_thresh: usize,
    pub overlap_thresh: u32,
    pub overlap_half_width: i64,
    pub score_thresh: i64,
    pub max_ext_len: u32,
    pub scorer: ScoreParams,
}

/// Per-run counters, logged once per query at debug level and summed by
/// the caller across the whole dispatch for an end-of-run summary line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignStats {
    pub seeds_seen: u64,
    pub seeds_repetitive: u64,
    pub seeds_overlap_suppressed: u64,
    pub seeds_below_threshold: u64,
    pub seeds_extended: u64,
    pub alignments_reported: u64,
}

impl AlignStats {
    pub fn merge(&mut self, other: &AlignStats) {
        self.seeds_seen += other.seeds_seen;
        self.seeds_repetitive += other.seeds_repetitive;
        self.seeds_overlap_suppressed += other.seeds_overlap_suppressed;
        self.seeds_below_threshold += other.seeds_below_threshold;
        self.seeds_extended += other.seeds_extended;
        self.alignments_reported += other.alignments_reported;
    }
}

/// Dedup'd reference/query position vectors for one over-represented
/// k-mer. Each vector is re-sorted, deduplicated, and its cap doubled
/// whenever it outgrows the current cap, bounding memory independent of
/// how many times the k-mer recurs.
struct RepetitiveEntry {
    ref_hits: Vec<GidPos>,
    query_hits: Vec<GidPos>,
    cap: usize,
}

impl RepetitiveEntry {
    fn new() -> Self {
        RepetitiveEntry {
            ref_hits: Vec::new(),
            query_hits: Vec::new(),
            cap: 16,
        }
    }

    fn push(&mut self, rp: GidPos, qp: GidPos) {
        self.ref_hits.push(rp);
        self.query_hits.push(qp);
        if self.ref_hits.len() > self.cap {
            Self::dedup(&mut self.ref_hits);
            Self::dedup(&mut self.query_hits);
            self.cap *= 2;
        }
    }

    fn dedup(v: &mut Vec<GidPos>) {
        v.sort_by_key(|g| (g.gid.0, g.pos));
        v.dedup_by_key(|g| (g.gid.0, g.pos));
    }
}

/// Per-worker scratch state, reused across every query it processes.
pub struct SchedulerContext {
    pub dp: DpContext,
    pub tree: IvTree,
    repetitive: FxHashMap<u64, RepetitiveEntry>,
    pub stats: AlignStats,
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerContext {
    pub fn new() -> Self {
        SchedulerContext {
            dp: DpContext::new(),
            tree: IvTree::new(),
            repetitive: FxHashMap::default(),
            stats: AlignStats::default(),
        }
    }

    fn reset_per_query(&mut self) {
        self.tree.flush();
        self.repetitive.clear();
    }
}

/// `(rg ^ rot16(qg)) ^ diag`, packed with the section's intended-overlap
/// position into a single ordering key. The exact bit layout is not load
/// bearing — any key that sorts seeds first by diagonal bucket, then by
/// position, and supports a half-open window query gives the same
/// suppression behavior.
fn diagonal_key(rg: u32, qg: u32, rp: u32, qp: u32, w: i64) -> i64 {
    let diag = rp as i64 - qp as i64 - w;
    let mix = rg ^ qg.rotate_left(16);
    diag ^ (mix as i64)
}

fn encode_region(key: i64, p_lo: i64, p_hi: i64) -> (i64, i64) {
    // high 32 bits: diagonal bucket; low 32 bits: position within it.
    let bucket = key << 32;
    (bucket | (p_lo & 0xffff_ffff), bucket | (p_hi & 0xffff_ffff))
}

fn decode_bucket(encoded: i64) -> i64 {
    encoded >> 32
}

fn decode_pos(encoded: i64) -> i64 {
    encoded & 0xffff_ffff
}

/// Minimum suppression depth among tree regions in diagonal buckets
/// `[key, key+w)` whose position range contains `p`, or 0 if none match.
/// Walks forward from `find_key_right(key's bucket start)` rather than
/// calling `intersect`, so the work done is bounded by the overlap
/// half-width window instead of a full subtree-pruned search.
fn overlap_depth(tree: &IvTree, key: i64, w: i64, p: i64) -> u32 {
    let (lo, _) = encode_region(key, 0, 0);
    let mut best: Option<u32> = None;
    let mut cur = tree.find_key_right(lo);
    while let Some(handle) = cur {
        let (lkey, rkey, depth, _score) = tree.get(handle);
        if decode_bucket(lkey) >= key + w {
            break;
        }
        if decode_pos(lkey) <= p && p < decode_pos(rkey) {
            best = Some(best.map_or(depth, |d| d.min(depth)));
        }
        cur = tree.successor(handle);
    }
    best.unwrap_or(0)
}

/// Records one path-section's footprint, merging into an existing region
/// within 16 bases of its bounds (bumping `depth`, keeping the max score)
/// or inserting a fresh one with `depth = 1`. Same `find_key_right` +
/// bounded linear walk as [`overlap_depth`], not `intersect`.
fn update_overlap_tree(tree: &mut IvTree, key: i64, w: i64, p_lo: i64, p_hi: i64, score: i64) {
    const MERGE_SLOP: i64 = 16;
    let (lo, _) = encode_region(key, 0, 0);
    let mut existing: Option<(u32, u32, i64)> = None;
    let mut cur = tree.find_key_right(lo);
    while let Some(handle) = cur {
        let (lkey, rkey, depth, s) = tree.get(handle);
        if decode_bucket(lkey) >= key + w.max(1) {
            break;
        }
        if decode_bucket(lkey) == key {
            let sp = decode_pos(lkey);
            let ep = decode_pos(rkey);
            if (sp - p_lo).abs() <= MERGE_SLOP || (ep - p_hi).abs() <= MERGE_SLOP {
                existing = Some((handle, depth, s));
                break;
            }
        }
        cur = tree.successor(handle);
    }
    match existing {
        Some((handle, depth, s)) => tree.set_payload(handle, depth + 1, s.max(score)),
        None => {
            let (lkey, rkey) = encode_region(key, p_lo, p_hi);
            tree.insert(lkey, rkey.max(lkey + 1), 1, score);
        }
    }
}

/// Runs the seed-and-extend pipeline for `query` against the archived
/// `reference`, returning the deduplicated, score-sorted result set.
pub fn align_query(
    reference: &GraphStore,
    query: &GraphStore,
    cfg: &SchedulerConfig,
    ctx: &mut SchedulerContext,
) -> Vec<AlignmentResult> {
    ctx.reset_per_query();
    let mut results: Vec<AlignmentResult> = Vec::new();

    let Ok(enumerator) = KmerEnumerator::for_query(query, cfg.k, Direction::FwOnly, 1) else {
        return results;
    };

    for tup in enumerator {
        ctx.stats.seeds_seen += 1;
        let hits = reference.lookup(tup.kmer);
        if hits.len() > cfg.kmer_cnt_thresh {
            ctx.stats.seeds_repetitive += 1;
            let entry = ctx.repetitive.entry(tup.kmer).or_insert_with(RepetitiveEntry::new);
            entry.push(hits[0], GidPos { gid: tup.gid, pos: tup.pos });
            continue;
        }

        for &hit in hits {
            let mark = ctx.dp.save_stack();
            let key = diagonal_key(hit.gid.0, tup.gid.0, hit.pos, tup.pos, cfg.overlap_half_width);
            let p = hit.pos as i64 + tup.pos as i64 + cfg.k as i64;
            let depth = overlap_depth(&ctx.tree, key, cfg.overlap_half_width, p);
            if depth >= cfg.overlap_thresh {
                ctx.stats.seeds_overlap_suppressed += 1;
                ctx.dp.flush_stack(mark);
                continue;
            }

            let a_len = reference.len_of(hit.gid);
            let b_len = query.len_of(tup.gid);
            let fw = extend_directional(
                &mut ctx.dp,
                cfg,
                reference,
                hit.gid,
                hit.pos + cfg.k,
                query,
                tup.gid,
                tup.pos + cfg.k,
            );
            let rv = extend_directional(
                &mut ctx.dp,
                cfg,
                reference,
                reference.rev_gid(hit.gid),
                a_len.saturating_sub(hit.pos),
                query,
                query.rev_gid(tup.gid),
                b_len.saturating_sub(tup.pos),
            );

            let (Ok(fw), Ok(rv)) = (fw, rv) else {
                ctx.dp.flush_stack(mark);
                continue;
            };

            if fw.record.max + rv.record.max <= cfg.score_thresh {
                ctx.stats.seeds_below_threshold += 1;
                ctx.dp.flush_stack(mark);
                continue;
            }
            ctx.stats.seeds_extended += 1;

            let (rv_a_consumed, rv_b_consumed) = rv.path.consumed();
            let (fw_a_consumed, fw_b_consumed) = fw.path.consumed();

            let apos = hit.pos.saturating_sub(rv_a_consumed);
            let bpos = tup.pos.saturating_sub(rv_b_consumed);
            let alen = rv_a_consumed + cfg.k + fw_a_consumed;
            let blen = rv_b_consumed + cfg.k + fw_b_consumed;

            let mut path = crate::align::dp::PathBits::default();
            let rv_ops_reversed: Vec<StepOp> = rv.path.ops().iter().rev().copied().collect();
            path.extend_from(&rv_ops_reversed);
            path.extend_from(&vec![StepOp::Match; cfg.k as usize]);
            path.extend_from(fw.path.ops());

            let score = fw.record.max + rv.record.max + cfg.scorer.matrix[0][0] as i64 * cfg.k as i64;
            let section = PathSection {
                aid: hit.gid,
                bid: tup.gid,
                apos,
                bpos,
                alen,
                blen,
                ppos: 0,
                plen: path.len() as u32,
            };
            let result = AlignmentResult {
                score,
                qual: 255,
                sections: vec![section],
                path,
            };

            update_overlap_tree(
                &mut ctx.tree,
                key,
                cfg.overlap_half_width,
                p.saturating_sub(16),
                p + 16,
                score,
            );
            results.push(result);
        }
    }

    dedup_results(&mut results);
    ctx.stats.alignments_reported += results.len() as u64;
    debug!(
        seeds = ctx.stats.seeds_seen,
        extended = ctx.stats.seeds_extended,
        reported = results.len(),
        "query aligned"
    );
    results
}

/// Sorts by score descending, then by `(aid, bid)` of the first
/// path-section ascending, and drops adjacent duplicates sharing that key
/// (keeping the higher-scoring one, which sorts first).
fn dedup_results(results: &mut Vec<AlignmentResult>) {
    results.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            let ka = a.primary_key().map(|(x, y)| (x.0, y.0));
            let kb = b.primary_key().map(|(x, y)| (x.0, y.0));
            ka.cmp(&kb)
        })
    });
    results.dedup_by_key(|r| r.primary_key().map(|(a, b)| (a.0, b.0)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::dp::ScoreParams;
    use crate::graph::store::GraphStore;

    fn config(k: u32) -> SchedulerConfig {
        SchedulerConfig {
            k,
            kmer_cnt_thresh: 100,
            overlap_thresh: 3,
            overlap_half_width: 32,
            score_thresh: 0,
            max_ext_len: 200,
            scorer: ScoreParams::simple(2, 3, 5, 1, 10),
        }
    }

    #[test]
    fn linear_exact_match_reports_one_alignment() {
        let seq = b"GGCTGCCTCCGAGCGTGTGGGCGAGGACAACCGCCCCACAGTCAAGCTCGAATGGGTGCTATTGCGTAGCTAGGACCGGCACT";
        let mut reference = GraphStore::new("reference");
        reference.add_section_ascii("ref1", seq).unwrap();
        reference.freeze().unwrap();
        reference.build_index(14).unwrap();

        let mut query = GraphStore::new("query");
        query.add_section_ascii("q1", &seq[16..16 + 52]).unwrap();
        query.freeze().unwrap();

        let cfg = config(14);
        let mut ctx = SchedulerContext::new();
        let results = align_query(&reference, &query, &cfg, &mut ctx);

        assert_eq!(results.len(), 1);
        let r = &results[0];
        let s = &r.sections[0];
        assert_eq!(s.apos, 16);
        assert_eq!(s.alen, 52);
        assert_eq!(s.bpos, 0);
        assert_eq!(s.blen, 52);
        assert_eq!(r.score, 104);
        assert!(r.path.ops().iter().all(|op| matches!(op, StepOp::Match)));
    }

    #[test]
    fn repetitive_kmer_is_not_extended() {
        let mut reference = GraphStore::new("reference");
        let mut repeated = String::new();
        for i in 0..200 {
            repeated.push_str("AAAAAAAAAAAAAA");
            repeated.push(if i % 2 == 0 { 'C' } else { 'G' });
        }
        reference.add_section_ascii("ref1", repeated.as_bytes()).unwrap();
        reference.freeze().unwrap();
        reference.build_index(14).unwrap();

        let mut query = GraphStore::new("query");
        query.add_section_ascii("q1", b"AAAAAAAAAAAAAA").unwrap();
        query.freeze().unwrap();

        let cfg = config(14);
        let mut ctx = SchedulerContext::new();
        let _ = align_query(&reference, &query, &cfg, &mut ctx);
        assert!(ctx.stats.seeds_repetitive > 0);
        assert_eq!(ctx.stats.seeds_extended, 0);
    }

    #[test]
    fn overlapping_seeds_on_one_diagonal_report_a_single_alignment() {
        // S4: reference and query are the same sequence, so every k-mer in
        // the 52-base overlap region reseeds the same diagonal. Once the
        // first seed's extension has been recorded in the overlap tree,
        // every later seed on that diagonal is suppressed before it ever
        // reaches the DP engine.
        let seq = b"GGCTGCCTCCGAGCGTGTGGGCGAGGACAACCGCCCCACAGTCAAGCTCGAATGGGTGCTATTGCGTAGCTAGGACCGGCACT";
        let mut reference = GraphStore::new("reference");
        reference.add_section_ascii("ref1", seq).unwrap();
        reference.freeze().unwrap();
        reference.build_index(14).unwrap();

        let mut query = GraphStore::new("query");
        query.add_section_ascii("q1", seq).unwrap();
        query.freeze().unwrap();

        let cfg = config(14);
        let mut ctx = SchedulerContext::new();
        let results = align_query(&reference, &query, &cfg, &mut ctx);

        assert_eq!(results.len(), 1);
        assert!(ctx.stats.seeds_overlap_suppressed > 0);
    }

    #[test]
    fn dedup_keeps_higher_score_per_aid_bid_and_drops_the_rest() {
        // S6: three results on two (aid,bid) pairs collapse to two, keeping
        // the higher-scoring one on the pair that collides.
        fn result(aid: u32, bid: u32, score: i64) -> AlignmentResult {
            AlignmentResult {
                score,
                qual: 0,
                sections: vec![PathSection {
                    aid: crate::graph::section::Gid(aid),
                    bid: crate::graph::section::Gid(bid),
                    apos: 0,
                    bpos: 0,
                    alen: 1,
                    blen: 1,
                    ppos: 0,
                    plen: 0,
                }],
                path: crate::align::dp::PathBits::default(),
            }
        }

        let mut results = vec![result(0, 0, 10), result(0, 0, 8), result(2, 4, 6)];
        dedup_results(&mut results);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, 10);
        assert_eq!(
            results[0].primary_key(),
            Some((crate::graph::section::Gid(0), crate::graph::section::Gid(0)))
        );
        assert_eq!(
            results[1].primary_key(),
            Some((crate::graph::section::Gid(2), crate::graph::section::Gid(4)))
        );
    }
}
