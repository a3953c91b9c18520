//! Component D: the band DP engine.
//!
//! Runs an affine-gap, X-drop-terminated banded alignment between a walk
//! on the reference graph and a walk on the query graph, starting from a
//! shared seed column. Bases are read lazily from each graph via
//! [`crate::graph::store::GraphStore::base_at`]. A single section pair is
//! filled by [`DpContext::fill_root`]/[`DpContext::fill`]; when a walk's
//! current section runs out before the band does, the returned
//! [`FillRecord`] carries `UPDATE_A`/`UPDATE_B` so the caller (the
//! scheduler) can fork one child frame per successor link and resume the
//! fill there — the band is graph-aware without ever materializing a full
//! concatenated sequence ahead of time. A worker reuses one [`DpContext`]
//! for every extension it runs; `save_stack`/`flush_stack` checkpoint and
//! roll back its scratch arena so an abandoned extension costs nothing
//! but a pointer move.

use crate::error::{AlignError, Result};
use crate::graph::encode::base2bit_index;
use crate::graph::section::Gid;
use crate::graph::store::GraphStore;

pub const UPDATE_A: u8 = 0b001;
pub const UPDATE_B: u8 = 0b010;
pub const TERM: u8 = 0b100;

/// Substitution matrix + affine gap penalties + X-drop threshold, shared by
/// every extension a worker runs.
#[derive(Clone, Copy, Debug)]
pub struct ScoreParams {
    /// Indexed by 2-bit base code (A=0 C=1 G=2 T=3).
    pub matrix: [[i32; 4]; 4],
    pub gap_open: i32,
    pub gap_extend: i32,
    pub xdrop: i32,
}

impl ScoreParams {
    /// Builds a plain match/mismatch matrix from scalar penalties, the
    /// common case exposed on the CLI (`m, x, gi, ge`).
    pub fn simple(m: i32, x: i32, gap_open: i32, gap_extend: i32, xdrop: i32) -> Self {
        let mut matrix = [[-x; 4]; 4];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = m;
        }
        ScoreParams {
            matrix,
            gap_open,
            gap_extend,
            xdrop,
        }
    }

    /// Scores a pair of 4-bit IUPAC codes. When both sides are unambiguous
    /// (a single concrete base each), looks up the actual cell of the 4x4
    /// matrix for that base pair. `N` (code 0) or any multi-base IUPAC
    /// ambiguity code has no single row/column, so those fall back to a
    /// set-overlap test: any shared concrete base is a match, otherwise a
    /// mismatch.
    fn score(&self, a4: u8, b4: u8) -> i32 {
        if a4 == 0 || b4 == 0 {
            return self.matrix[0][1];
        }
        if let (Some(ai), Some(bi)) = (base2bit_index(a4), base2bit_index(b4)) {
            return self.matrix[ai][bi];
        }
        if a4 & b4 != 0 {
            self.matrix[0][0]
        } else {
            self.matrix[0][1]
        }
    }

    /// A band half-width generous enough that X-drop, not band exhaustion,
    /// is what ends an extension.
    fn band_half_width(&self) -> i32 {
        let ge = self.gap_extend.max(1);
        (self.xdrop / ge + 4).clamp(4, 128)
    }
}

/// One step of the alignment path. `Match`/`Mismatch` consume one base from
/// each side; `InsA` consumes only from the reference-side walk (a gap in
/// the query); `InsB` consumes only from the query-side walk (a gap in the
/// reference) — the two-bits-per-step "consume A / consume B" encoding
/// collapses to these four cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOp {
    Match,
    Mismatch,
    InsA,
    InsB,
}

impl StepOp {
    fn consumes(self) -> (bool, bool) {
        match self {
            StepOp::Match | StepOp::Mismatch => (true, true),
            StepOp::InsA => (true, false),
            StepOp::InsB => (false, true),
        }
    }
}

/// A path bitstring: a flat run of [`StepOp`]s. `ppos`/`plen` (as used by
/// [`crate::align::scheduler`]) locate one path-section's slice within it.
#[derive(Clone, Debug, Default)]
pub struct PathBits {
    ops: Vec<StepOp>,
}

impl PathBits {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[StepOp] {
        &self.ops
    }

    pub fn push(&mut self, op: StepOp) {
        self.ops.push(op);
    }

    pub fn extend_from(&mut self, other: &[StepOp]) {
        self.ops.extend_from_slice(other);
    }

    /// Counts of (bases consumed from A, bases consumed from B) across the
    /// whole path.
    pub fn consumed(&self) -> (u32, u32) {
        self.ops.iter().fold((0, 0), |(a, b), op| {
            let (ca, cb) = op.consumes();
            (a + ca as u32, b + cb as u32)
        })
    }
}

/// Walks `M`/`I`/`D` run-length cigar groups out of a path slice, per the
/// `print_cigar` contract.
pub fn print_cigar(ops: &[StepOp]) -> String {
    let mut out = String::new();
    let mut run_len = 0u32;
    let mut run_op: Option<char> = None;
    for op in ops {
        let c = match op {
            StepOp::Match | StepOp::Mismatch => 'M',
            StepOp::InsA => 'D',
            StepOp::InsB => 'I',
        };
        if run_op == Some(c) {
            run_len += 1;
        } else {
            if let Some(prev) = run_op {
                out.push_str(&run_len.to_string());
                out.push(prev);
            }
            run_op = Some(c);
            run_len = 1;
        }
    }
    if let Some(prev) = run_op {
        out.push_str(&run_len.to_string());
        out.push(prev);
    }
    out
}

/// Returned by every `fill_root`/`fill` call: cumulative antidiagonal
/// progress (rows filled since the seed column, across every section this
/// frame's lineage has crossed), the best score seen so far, and a status
/// bitmask. `UPDATE_A`/`UPDATE_B` mean the walk ran into the end of its
/// current section on that side with successor links available — the
/// caller must fork one child frame per successor and resume there.
/// `TERM` means the frame is finished: X-drop fired, a side dead-ended
/// with no successors, or the extension's length budget ran out.
#[derive(Clone, Copy, Debug, Default)]
pub struct FillRecord {
    pub psum: i64,
    pub max: i64,
    pub status: u8,
}

/// One finished directional extension: the path taken and where it ended,
/// in both graphs' walk coordinates.
#[derive(Clone, Debug)]
pub struct ExtensionTail {
    pub record: FillRecord,
    pub path: PathBits,
    pub a_end_gid: Gid,
    pub a_end_pos: u32,
    pub b_end_gid: Gid,
    pub b_end_pos: u32,
}

/// Length of the synthetic zero-padded margin section substituted at a
/// true dead end (spec.md §4.E: "If a side has no successors, substitute a
/// synthetic margin section … so the band exits cleanly"). Bases read from
/// the margin are all `N` (code 0, never matches), so they drive the score
/// down and let X-drop end the extension naturally instead of the fill
/// loop special-casing an abrupt cutoff.
const MARGIN_LEN: u32 = 8;

/// What the next base read off a one-section cursor looks like: a base to
/// consume, a section boundary with somewhere to go (the caller forks), or
/// a true dead end (leaf section, no successors, margin exhausted).
enum CursorBase {
    Base(u8),
    Boundary,
    DeadEnd,
}

/// A read-only cursor over a single graph section — unlike the walk this
/// replaced, it never follows a link itself; reaching the end of the
/// section is reported to the caller instead, so branch points are always
/// visible to the scheduler's frame-forking loop. Past the section's last
/// base, a leaf (no outgoing links) emits up to `MARGIN_LEN` synthetic `N`
/// bases before finally reporting a true dead end.
struct SectionCursor<'g> {
    store: &'g GraphStore,
    gid: Gid,
    pos: u32,
    margin_used: u32,
}

impl<'g> SectionCursor<'g> {
    fn new(store: &'g GraphStore, gid: Gid, pos: u32) -> Self {
        SectionCursor { store, gid, pos, margin_used: 0 }
    }

    fn at_leaf_end(&self) -> bool {
        self.pos >= self.store.len_of(self.gid) && self.store.links(self.gid).is_empty()
    }

    fn peek(&self) -> CursorBase {
        if self.pos < self.store.len_of(self.gid) {
            CursorBase::Base(self.store.base_at(self.gid, self.pos))
        } else if !self.store.links(self.gid).is_empty() {
            CursorBase::Boundary
        } else if self.margin_used < MARGIN_LEN {
            CursorBase::Base(0)
        } else {
            CursorBase::DeadEnd
        }
    }

    fn advance(&mut self) {
        if self.at_leaf_end() {
            self.margin_used += 1;
        } else {
            self.pos += 1;
        }
    }

    fn here(&self) -> (Gid, u32) {
        (self.gid, self.pos)
    }
}

#[derive(Clone, Copy)]
enum Dir {
    Start,
    Diag,
    Up,
    Left,
}

#[derive(Clone, Copy)]
struct Cell {
    dir: Dir,
}

/// A section-pair frame: the scheduler's unit of work on the `BinaryHeap`
/// it drives `fill_root`/`fill` with. Carries everything needed to resume
/// the band fill into a successor section — the whole lineage's row
/// history (for traceback), the last computed H/E/F row, and the running
/// best — so forking at a branch point is a clone, not a restart.
#[derive(Clone)]
pub struct FillFrame {
    pub record: FillRecord,
    pub path: PathBits,
    pub a_gid: Gid,
    pub a_pos: u32,
    pub b_gid: Gid,
    pub b_pos: u32,
    h_row: Vec<i32>,
    e_row: Vec<i32>,
    f_row: Vec<i32>,
    cells: Vec<Cell>,
    a_bases: Vec<u8>,
    b_bases: Vec<u8>,
    band: i32,
    width: usize,
    best: i64,
    best_i: u32,
    best_d: i32,
}

/// A worker-owned scratch arena reused across every extension it runs.
/// `save_stack`/`flush_stack` give O(1) checkpoint/rollback when an
/// extension is abandoned (overlap-filtered or below `score_thresh`).
pub struct DpContext {
    arena: Vec<Cell>,
}

impl Default for DpContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DpContext {
    pub fn new() -> Self {
        DpContext { arena: Vec::new() }
    }

    pub fn save_stack(&self) -> usize {
        self.arena.len()
    }

    pub fn flush_stack(&mut self, mark: usize) {
        self.arena.truncate(mark);
    }

    /// Starts a new extension lineage from a shared seed column. `budget`
    /// bounds the total rows this first call may fill; running out of
    /// budget without X-drop firing or a section boundary being reached
    /// sets `TERM` (the extension is simply capped).
    #[allow(clippy::too_many_arguments)]
    pub fn fill_root(
        &mut self,
        cfg: &ScoreParams,
        a_store: &GraphStore,
        a_gid: Gid,
        a_pos: u32,
        b_store: &GraphStore,
        b_gid: Gid,
        b_pos: u32,
        budget: u32,
    ) -> Result<FillFrame> {
        let band = cfg.band_half_width();
        let width = (2 * band + 1) as usize;
        let mut cells = Vec::new();
        cells.extend(std::iter::repeat_n(Cell { dir: Dir::Start }, width));
        let frame = FillFrame {
            record: FillRecord::default(),
            path: PathBits::default(),
            a_gid,
            a_pos,
            b_gid,
            b_pos,
            h_row: vec![0i32; width],
            e_row: vec![i32::MIN / 2; width],
            f_row: vec![i32::MIN / 2; width],
            cells,
            a_bases: Vec::new(),
            b_bases: Vec::new(),
            band,
            width,
            best: 0,
            best_i: 0,
            best_d: band,
        };
        self.run_fill(cfg, a_store, b_store, frame, budget)
    }

    /// Resumes a frame whose `status` signaled `UPDATE_A`/`UPDATE_B` into
    /// a new section on whichever side(s) the caller is forking (pass the
    /// successor gid at `pos = 0`; a side that isn't forking keeps
    /// `prev`'s own gid/pos).
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        &mut self,
        cfg: &ScoreParams,
        a_store: &GraphStore,
        a_gid: Gid,
        a_pos: u32,
        b_store: &GraphStore,
        b_gid: Gid,
        b_pos: u32,
        prev: &FillFrame,
        budget: u32,
    ) -> Result<FillFrame> {
        let frame = FillFrame {
            record: prev.record,
            path: prev.path.clone(),
            a_gid,
            a_pos,
            b_gid,
            b_pos,
            h_row: prev.h_row.clone(),
            e_row: prev.e_row.clone(),
            f_row: prev.f_row.clone(),
            cells: prev.cells.clone(),
            a_bases: prev.a_bases.clone(),
            b_bases: prev.b_bases.clone(),
            band: prev.band,
            width: prev.width,
            best: prev.best,
            best_i: prev.best_i,
            best_d: prev.best_d,
        };
        self.run_fill(cfg, a_store, b_store, frame, budget)
    }

    /// The shared fill kernel behind `fill_root`/`fill`: extends `frame`
    /// by up to `budget` more rows, then re-runs traceback over the
    /// lineage's full row history.
    fn run_fill(
        &mut self,
        cfg: &ScoreParams,
        a_store: &GraphStore,
        b_store: &GraphStore,
        mut frame: FillFrame,
        budget: u32,
    ) -> Result<FillFrame> {
        let band = frame.band;
        let width = frame.width;
        let mut a_cur = SectionCursor::new(a_store, frame.a_gid, frame.a_pos);
        let mut b_cur = SectionCursor::new(b_store, frame.b_gid, frame.b_pos);

        let mut h_prev = std::mem::take(&mut frame.h_row);
        let mut e_prev = std::mem::take(&mut frame.e_row);
        let mut f_prev = std::mem::take(&mut frame.f_row);

        let rows_before = frame.record.psum as u32;
        let mut best = frame.best;
        let mut best_i = frame.best_i;
        let mut best_d = frame.best_d;

        let mut terminated_by_xdrop = false;
        let mut a_stop: Option<bool> = None; // Some(has_successors)
        let mut b_stop: Option<bool> = None;
        let mut rows_done = 0u32;

        for step in 1..=budget {
            let a_code = match a_cur.peek() {
                CursorBase::Base(c) => c,
                CursorBase::Boundary => {
                    a_stop = Some(true);
                    break;
                }
                CursorBase::DeadEnd => {
                    a_stop = Some(false);
                    break;
                }
            };
            frame.a_bases.push(a_code);
            a_cur.advance();
            rows_done = step;
            let i = rows_before + step;

            let mut h_cur = vec![i32::MIN / 2; width];
            let mut e_cur = vec![i32::MIN / 2; width];
            let mut f_cur = vec![i32::MIN / 2; width];
            frame.cells.extend(std::iter::repeat_n(Cell { dir: Dir::Start }, width));
            let row_base = (i as usize) * width;

            for d_idx in 0..width {
                let d = d_idx as i32 - band;
                let j = i as i32 + d; // b-offset this cell corresponds to (1-based)
                if j < 1 {
                    continue;
                }
                while frame.b_bases.len() < j as usize {
                    match b_cur.peek() {
                        CursorBase::Base(c) => {
                            frame.b_bases.push(c);
                            b_cur.advance();
                        }
                        CursorBase::Boundary => {
                            b_stop.get_or_insert(true);
                            break;
                        }
                        CursorBase::DeadEnd => {
                            b_stop.get_or_insert(false);
                            break;
                        }
                    }
                }
                if frame.b_bases.len() < j as usize {
                    continue;
                }
                let b_code = frame.b_bases[j as usize - 1];

                // vertical gap (consumes A only): from directly above.
                let e_val = if d_idx > 0 {
                    (h_prev[d_idx - 1] - cfg.gap_open).max(e_prev[d_idx - 1] - cfg.gap_extend)
                } else {
                    i32::MIN / 2
                };
                // horizontal gap (consumes B only): from the same row, one
                // band-slot to the right (d+1 relative), already computed
                // this row since we scan d ascending.
                let f_val = if d_idx > 0 {
                    (h_cur[d_idx - 1] - cfg.gap_open).max(f_cur[d_idx - 1] - cfg.gap_extend)
                } else {
                    i32::MIN / 2
                };
                let diag_prev = h_prev[d_idx]; // same d: (i-1, j-1)
                let sub = cfg.score(a_code, b_code);
                let diag_val = diag_prev + sub;

                let (val, dir) = [(diag_val, Dir::Diag), (e_val, Dir::Up), (f_val, Dir::Left)]
                    .into_iter()
                    .fold((i32::MIN, Dir::Start), |(bv, bd), (v, d)| if v > bv { (v, d) } else { (bv, bd) });

                h_cur[d_idx] = val;
                e_cur[d_idx] = e_val;
                f_cur[d_idx] = f_val;
                frame.cells[row_base + d_idx] = Cell { dir };

                if (val as i64) > best {
                    best = val as i64;
                    best_i = i;
                    best_d = d;
                }
            }

            if (best as i32).saturating_sub(*h_cur.iter().max().unwrap_or(&i32::MIN)) > cfg.xdrop {
                terminated_by_xdrop = true;
                h_prev = h_cur;
                break;
            }
            h_prev = h_cur;
            e_prev = e_cur;
            f_prev = f_cur;
        }

        let mut status = 0u8;
        if terminated_by_xdrop {
            status |= TERM;
        } else {
            if a_stop == Some(true) {
                status |= UPDATE_A;
            }
            if b_stop == Some(true) {
                status |= UPDATE_B;
            }
            if status == 0 {
                // neither side hit a forkable boundary: a true dead end on
                // both, or the extension's length budget simply ran out.
                status |= TERM;
            }
        }

        frame.h_row = h_prev;
        frame.e_row = e_prev;
        frame.f_row = f_prev;
        frame.best = best;
        frame.best_i = best_i;
        frame.best_d = best_d;
        let (a_end_gid, a_end_pos) = a_cur.here();
        let (b_end_gid, b_end_pos) = b_cur.here();
        frame.a_gid = a_end_gid;
        frame.a_pos = a_end_pos;
        frame.b_gid = b_end_gid;
        frame.b_pos = b_end_pos;

        frame.record = FillRecord {
            psum: (rows_before + rows_done) as i64,
            max: best,
            status,
        };
        frame.path = Self::traceback(&frame)?;
        Ok(frame)
    }

    fn traceback(frame: &FillFrame) -> Result<PathBits> {
        let band = frame.band;
        let width = frame.width;
        let mut path_rev: Vec<StepOp> = Vec::new();
        let mut i = frame.best_i;
        let mut d = frame.best_d;
        while i > 0 {
            let d_idx = (d + band) as usize;
            if d_idx >= width {
                return Err(AlignError::OutOfBand(format!(
                    "traceback left the band at row {i}, offset {d}"
                )));
            }
            let cell = frame.cells[(i as usize) * width + d_idx];
            match cell.dir {
                Dir::Diag => {
                    let j = i as i32 + d;
                    let a_code = frame.a_bases[i as usize - 1];
                    let b_code = if j >= 1 { frame.b_bases[j as usize - 1] } else { 0 };
                    path_rev.push(if a_code & b_code != 0 && a_code != 0 {
                        StepOp::Match
                    } else {
                        StepOp::Mismatch
                    });
                    i -= 1;
                }
                Dir::Up => {
                    path_rev.push(StepOp::InsA);
                    i -= 1;
                    d += 1;
                }
                Dir::Left => {
                    path_rev.push(StepOp::InsB);
                    d -= 1;
                }
                Dir::Start => break,
            }
        }
        path_rev.reverse();
        let mut path = PathBits::default();
        path.extend_from(&path_rev);
        Ok(path)
    }

    /// Converts a terminal (`status & TERM != 0`) frame into the
    /// directional-extension result the scheduler assembles alignments
    /// from.
    pub fn finalize(frame: &FillFrame) -> ExtensionTail {
        ExtensionTail {
            record: frame.record,
            path: frame.path.clone(),
            a_end_gid: frame.a_gid,
            a_end_pos: frame.a_pos,
            b_end_gid: frame.b_gid,
            b_end_pos: frame.b_pos,
        }
    }
}

/// Stitches a forward and a reverse tail through their shared seed column
/// into a single path (the reverse tail's ops are reversed and prepended).
pub fn join_tails(fw: &ExtensionTail, rv: &ExtensionTail) -> PathBits {
    let mut joined = PathBits::default();
    let rv_ops_reversed: Vec<StepOp> = rv.path.ops().iter().rev().copied().collect();
    joined.extend_from(&rv_ops_reversed);
    joined.extend_from(fw.path.ops());
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::GraphStore;

    fn linear_store(name: &str, seq: &[u8]) -> GraphStore {
        let mut g = GraphStore::new(name);
        g.add_section_ascii("s", seq).unwrap();
        g.freeze().unwrap();
        g
    }

    #[test]
    fn exact_match_extension_is_all_match_and_scores_linearly() {
        let seq = b"GGCTGCCTCCGAGCGTGTGGGCGAGGACAACCGCCCCACAGTCAAGCTCGAATGGGTGCTATTGCGTAGCTAGGACCGGCACT";
        let a = linear_store("ref", seq);
        let b = linear_store("query", &seq[16..16 + 52]);
        let gid_a = a.gid_by_name("s", false).unwrap();
        let gid_b = b.gid_by_name("s", false).unwrap();

        let cfg = ScoreParams::simple(2, 3, 5, 1, 10);
        let mut ctx = DpContext::new();
        let frame = ctx.fill_root(&cfg, &a, gid_a, 16, &b, gid_b, 0, 52).unwrap();
        assert_eq!(frame.record.status & TERM, TERM);
        let tail = DpContext::finalize(&frame);

        assert!(tail.path.ops().iter().all(|op| matches!(op, StepOp::Match)));
        assert_eq!(tail.path.len(), 52);
        assert_eq!(tail.record.max, 104);
    }

    #[test]
    fn running_into_a_section_boundary_sets_update_with_successors() {
        let seq = b"GGCTGCCTCCGAGCGTGTGGGCGAGGACAACCGCCCCACAGTCAAGCTCGAATGGGTGCTATTGCGTAGCTAGGACCGGCACT";
        let mut a = GraphStore::new("ref");
        let s1 = a.add_section_ascii("s1", &seq[..20]).unwrap();
        let s2 = a.add_section_ascii("s2", &seq[20..40]).unwrap();
        a.add_link(s1, s2).unwrap();
        a.freeze().unwrap();
        let b = linear_store("query", &seq[..40]);
        let gid_a = a.gid_by_name("s1", false).unwrap();
        let gid_b = b.gid_by_name("s", false).unwrap();

        let cfg = ScoreParams::simple(2, 3, 5, 1, 10);
        let mut ctx = DpContext::new();
        let frame = ctx.fill_root(&cfg, &a, gid_a, 0, &b, gid_b, 0, 200).unwrap();

        assert_eq!(frame.record.status & UPDATE_A, UPDATE_A);
        assert_eq!(frame.a_pos, 20);
    }

    #[test]
    fn cigar_run_length_encodes_mixed_ops() {
        let ops = vec![
            StepOp::Match,
            StepOp::Match,
            StepOp::InsB,
            StepOp::InsB,
            StepOp::InsA,
            StepOp::Match,
        ];
        assert_eq!(print_cigar(&ops), "2M2I1D1M");
    }
}
