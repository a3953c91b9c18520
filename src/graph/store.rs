//! The immutable (once frozen) sequence graph: sections, directed links,
//! forward/reverse-complement views over a shared byte arena.
//!
//! Three lifecycle states: `Pool` (mutable, `add_section`/`add_link`),
//! `Acv` (frozen: link table built, enumerator usable), `Idx` (archived:
//! k-mer index built). `freeze`/`build_index` move forward;
//! `disable_index`/`melt` move back.
//!
//! Design note: the reference C implementation this store's contract is
//! modeled on (`gref.c`) encodes strand by comparing pointers against a
//! sentinel address that is never dereferenced. We drop that trick
//! entirely: every base read goes through [`GraphStore::base_at`], which
//! branches on `Gid::is_reverse` and complements+mirrors the index rather
//! than the pointer — a safe-Rust equivalent with the same externally
//! observable behavior.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::info;

use crate::error::{AlignError, Result};
use crate::graph::encode::{check_klen, complement_4bit, encode_ascii_seq};
use crate::graph::section::{Gid, GidPos, Section};
use crate::kmer::enumerator::{Direction, KmerEnumerator, KmerParams};
use crate::kmer::index::KmerIndex;

pub const SENTINEL_NAME: &str = "*sentinel*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphState {
    Pool,
    Acv,
    Idx,
}

#[derive(Clone)]
enum SeqData {
    /// Bytes live in the store's shared arena at `offset`.
    Arena { offset: u32 },
    /// Bytes live in a caller-provided, reference-counted buffer; no copy
    /// was made when the section was added (`add_section_shared`).
    Shared { buf: Arc<[u8]>, offset: u32 },
}

#[derive(Clone)]
struct SectionRec {
    name: String,
    len: u32,
    data: SeqData,
}

/// Summary stats logged after each lifecycle transition via `tracing`'s
/// `info!` macro.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStats {
    pub section_count: u32,
    pub base_count: u64,
    pub link_count: u32,
}

/// The graph store itself. One value models all three lifecycle states;
/// operations check `state` and return [`AlignError::InvalidArgs`] when
/// called out of phase.
pub struct GraphStore {
    state: GraphState,
    pub name: String,
    k: Option<u32>,
    sections: Vec<SectionRec>,
    name_to_idx: FxHashMap<String, u32>,
    arena: Vec<u8>,

    // POOL-phase adjacency, keyed by source gid.
    pool_links: FxHashMap<Gid, Vec<Gid>>,

    // ACV/IDX-phase CSR link table: successors of gid `g` are
    // `link_flat[link_begin[g]..link_begin[g+1]]`.
    link_flat: Vec<Gid>,
    link_begin: Vec<u32>,

    sentinel_idx: Option<u32>,
    kmer_index: Option<KmerIndex>,
}

impl GraphStore {
    pub fn new(name: impl Into<String>) -> Self {
        GraphStore {
            state: GraphState::Pool,
            name: name.into(),
            k: None,
            sections: Vec::new(),
            name_to_idx: FxHashMap::default(),
            arena: Vec::new(),
            pool_links: FxHashMap::default(),
            link_flat: Vec::new(),
            link_begin: Vec::new(),
            sentinel_idx: None,
            kmer_index: None,
        }
    }

    fn require_pool(&self, op: &'static str) -> Result<()> {
        if self.state != GraphState::Pool {
            return Err(AlignError::InvalidArgs(format!(
                "{op} requires POOL state"
            )));
        }
        Ok(())
    }

    fn require_acv_or_idx(&self, op: &'static str) -> Result<()> {
        if self.state == GraphState::Pool {
            return Err(AlignError::InvalidArgs(format!(
                "{op} requires ACV or IDX state"
            )));
        }
        Ok(())
    }

    fn push_section(&mut self, name: &str, len: u32, data: SeqData) -> Result<Gid> {
        self.require_pool("add_section")?;
        if self.name_to_idx.contains_key(name) {
            return Err(AlignError::InvalidArgs(format!(
                "duplicate section name `{name}`"
            )));
        }
        let idx = self.sections.len() as u32;
        self.sections.push(SectionRec {
            name: name.to_string(),
            len,
            data,
        });
        self.name_to_idx.insert(name.to_string(), idx);
        Ok(Gid::new(idx, false))
    }

    /// Encodes an ASCII IUPAC sequence and copies it into the arena.
    pub fn add_section_ascii(&mut self, name: &str, bases: &[u8]) -> Result<Gid> {
        let codes = encode_ascii_seq(bases);
        self.add_section_4bit(name, &codes)
    }

    /// Copies an already 4-bit-encoded sequence into the arena.
    pub fn add_section_4bit(&mut self, name: &str, codes: &[u8]) -> Result<Gid> {
        let offset = self.arena.len() as u32;
        self.arena.extend_from_slice(codes);
        self.push_section(name, codes.len() as u32, SeqData::Arena { offset })
    }

    /// Registers a section backed by a caller-owned, already 4-bit-encoded
    /// buffer without copying it (a "no-copy" ingestion mode). The
    /// caller guarantees the buffer's lifetime via shared ownership
    /// (`Arc`), which is how this crate discharges the "caller guarantees
    /// lifetime" contract without unsafe pointer arithmetic.
    pub fn add_section_shared(&mut self, name: &str, codes: Arc<[u8]>, offset: u32, len: u32) -> Result<Gid> {
        self.push_section(name, len, SeqData::Shared { buf: codes, offset })
    }

    /// Records `src -> dst` and its strand-reversed twin `rev(dst) ->
    /// rev(src)`, so reverse traversal is symmetric.
    pub fn add_link(&mut self, src: Gid, dst: Gid) -> Result<()> {
        self.require_pool("add_link")?;
        self.pool_links.entry(src).or_default().push(dst);
        self.pool_links.entry(dst.rev()).or_default().push(src.rev());
        Ok(())
    }

    pub fn gid_by_name(&self, name: &str, reverse: bool) -> Option<Gid> {
        self.name_to_idx.get(name).map(|&idx| Gid::new(idx, reverse))
    }

    /// POOL -> ACV. Appends the sentinel section, sorts/flattens the link
    /// table into CSR form indexed by gid.
    pub fn freeze(&mut self) -> Result<GraphStats> {
        self.require_pool("freeze")?;

        let sentinel_offset = self.arena.len() as u32;
        let sentinel_gid = self.push_section(SENTINEL_NAME, 0, SeqData::Arena { offset: sentinel_offset })?;
        self.sentinel_idx = Some(sentinel_gid.section_idx());

        let num_gids = 2 * self.sections.len() as u32;
        self.link_flat.clear();
        self.link_begin = Vec::with_capacity(num_gids as usize + 1);
        self.link_begin.push(0);
        for g in 0..num_gids {
            let gid = Gid(g);
            if let Some(succs) = self.pool_links.get(&gid) {
                let mut sorted = succs.clone();
                sorted.sort_by_key(|g| g.0);
                self.link_flat.extend(sorted);
            }
            self.link_begin.push(self.link_flat.len() as u32);
        }

        self.state = GraphState::Acv;
        let stats = self.stats();
        info!(
            sections = stats.section_count,
            bases = stats.base_count,
            links = stats.link_count,
            "graph frozen (POOL -> ACV)"
        );
        Ok(stats)
    }

    /// ACV -> IDX. Enumerates the archived graph (both strands, every start
    /// offset) and builds the packed-k-mer index.
    pub fn build_index(&mut self, k: u32) -> Result<GraphStats> {
        self.require_acv_or_idx("build_index")?;
        check_klen(k)?;
        if self.state == GraphState::Idx {
            // rebuilding with a (possibly) different k: fall back to ACV first.
            self.disable_index();
        }
        self.k = Some(k);
        let params = KmerParams {
            k,
            step: 1,
            direction: Direction::FwRv,
        };
        let tuples: Vec<_> = KmerEnumerator::new(self, params)?.collect();
        self.kmer_index = Some(KmerIndex::build(k, tuples)?);
        self.state = GraphState::Idx;
        let stats = self.stats();
        info!(k, buckets = 1u64 << (2 * k), "k-mer index built (ACV -> IDX)");
        Ok(stats)
    }

    /// IDX -> ACV: drops the k-mer index.
    pub fn disable_index(&mut self) {
        self.kmer_index = None;
        if self.state == GraphState::Idx {
            self.state = GraphState::Acv;
        }
    }

    /// ACV -> POOL (via IDX -> ACV if needed): drops the k-mer index and
    /// re-expands the link table, restoring POOL-observable state. A
    /// freeze immediately followed by a melt is a no-op from the caller's
    /// perspective.
    pub fn melt(&mut self) -> Result<()> {
        self.disable_index();
        self.require_acv_or_idx("melt")?;

        self.pool_links.clear();
        let num_gids = self.link_begin.len().saturating_sub(1) as u32;
        for g in 0..num_gids {
            let begin = self.link_begin[g as usize] as usize;
            let end = self.link_begin[g as usize + 1] as usize;
            if begin != end {
                self.pool_links.insert(Gid(g), self.link_flat[begin..end].to_vec());
            }
        }
        self.link_flat.clear();
        self.link_begin.clear();

        if let Some(idx) = self.sentinel_idx.take() {
            // the sentinel was appended by `freeze`; removing it restores
            // the exact POOL-observable section list.
            if idx as usize == self.sections.len() - 1 {
                let rec = self.sections.pop().unwrap();
                self.name_to_idx.remove(&rec.name);
            }
        }

        self.state = GraphState::Pool;
        Ok(())
    }

    pub fn k(&self) -> Option<u32> {
        self.k
    }

    pub fn is_indexed(&self) -> bool {
        self.state == GraphState::Idx
    }

    pub fn section_count(&self) -> u32 {
        self.sections.len() as u32
    }

    pub fn num_gids(&self) -> u32 {
        2 * self.section_count()
    }

    pub fn sentinel_gid(&self) -> Gid {
        match self.sentinel_idx {
            Some(idx) => Gid::new(idx, false),
            None => Gid::new(self.section_count(), false),
        }
    }

    pub fn len_of(&self, gid: Gid) -> u32 {
        self.sections[gid.section_idx() as usize].len
    }

    pub fn name_of(&self, gid: Gid) -> &str {
        &self.sections[gid.section_idx() as usize].name
    }

    /// The `(forward gid, length)` pair backing `gid`'s section, regardless
    /// of which strand `gid` names.
    pub fn section(&self, gid: Gid) -> Section {
        Section { gid_fw: Gid::new(gid.section_idx(), false), len: self.len_of(gid) }
    }

    #[inline]
    pub fn rev_gid(&self, gid: Gid) -> Gid {
        gid.rev()
    }

    /// Reads the 4-bit IUPAC code at `pos` bases into `gid`'s strand,
    /// complementing + mirroring the index for reverse gids rather than
    /// dereferencing a mirrored pointer (see module docs).
    #[inline]
    pub fn base_at(&self, gid: Gid, pos: u32) -> u8 {
        let rec = &self.sections[gid.section_idx() as usize];
        let fw_pos = if gid.is_reverse() {
            rec.len - 1 - pos
        } else {
            pos
        };
        let byte = match &rec.data {
            SeqData::Arena { offset } => self.arena[(*offset + fw_pos) as usize],
            SeqData::Shared { buf, offset } => buf[(*offset + fw_pos) as usize],
        };
        if gid.is_reverse() {
            complement_4bit(byte)
        } else {
            byte
        }
    }

    /// Successor gids of `gid` (ACV/IDX only; empty in POOL or for leaves).
    pub fn links(&self, gid: Gid) -> &[Gid] {
        if self.link_begin.is_empty() {
            return &[];
        }
        let g = gid.0 as usize;
        if g + 1 >= self.link_begin.len() {
            return &[];
        }
        let begin = self.link_begin[g] as usize;
        let end = self.link_begin[g + 1] as usize;
        &self.link_flat[begin..end]
    }

    pub fn lookup(&self, packed_kmer: u64) -> &[GidPos] {
        match &self.kmer_index {
            Some(idx) => idx.lookup(packed_kmer),
            None => &[],
        }
    }

    pub fn kmer_index(&self) -> Option<&KmerIndex> {
        self.kmer_index.as_ref()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            section_count: self.section_count(),
            base_count: self.sections.iter().map(|s| s.len as u64).sum(),
            link_count: self.link_flat.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_linked_sections() -> GraphStore {
        let mut g = GraphStore::new("t");
        let a = g.add_section_ascii("a", b"ACGT").unwrap();
        let b = g.add_section_ascii("b", b"TTTT").unwrap();
        g.add_link(a, b).unwrap();
        g
    }

    #[test]
    fn rev_gid_is_an_involution() {
        let g = two_linked_sections();
        let a = g.gid_by_name("a", false).unwrap();
        assert_eq!(g.rev_gid(g.rev_gid(a)), a);
        assert_eq!(g.section(g.rev_gid(a)).len, g.section(a).len);
    }

    #[test]
    fn reverse_strand_complements_and_mirrors() {
        let mut g = GraphStore::new("t");
        let a = g.add_section_ascii("a", b"ACGT").unwrap();
        g.freeze().unwrap();
        let ra = g.rev_gid(a);
        // reverse-complement of ACGT is ACGT read back-to-front with
        // complemented bases: A<->T, C<->G.
        let fw: Vec<u8> = (0..4).map(|p| g.base_at(a, p)).collect();
        let rv: Vec<u8> = (0..4).map(|p| g.base_at(ra, p)).collect();
        assert_eq!(rv, vec![
            complement_4bit(fw[3]),
            complement_4bit(fw[2]),
            complement_4bit(fw[1]),
            complement_4bit(fw[0]),
        ]);
    }

    #[test]
    fn freeze_then_melt_is_identity_on_pool_state() {
        let mut g = two_linked_sections();
        let before_names: Vec<String> = g.sections.iter().map(|s| s.name.clone()).collect();
        let before_links = g.pool_links.clone();

        g.freeze().unwrap();
        g.melt().unwrap();

        let after_names: Vec<String> = g.sections.iter().map(|s| s.name.clone()).collect();
        assert_eq!(before_names, after_names);
        assert_eq!(before_links.len(), g.pool_links.len());
        for (k, v) in &before_links {
            let mut want = v.clone();
            want.sort_by_key(|g| g.0);
            let mut got = g.pool_links.get(k).cloned().unwrap_or_default();
            got.sort_by_key(|g| g.0);
            assert_eq!(want, got);
        }
    }

    #[test]
    fn build_index_lookup_finds_every_position() {
        let mut g = two_linked_sections();
        g.freeze().unwrap();
        g.build_index(4).unwrap();

        let a = g.gid_by_name("a", false).unwrap();
        // k=4 and section "a" has exactly 4 bases, so one kmer starts at pos 0.
        let mut kmer: u64 = 0;
        for p in 0..4u32 {
            let code4 = g.base_at(a, p);
            let code2 = match code4 {
                1 => 0, // A
                2 => 1, // C
                4 => 2, // G
                8 => 3, // T
                _ => panic!("unexpected non-ACGT base in test fixture"),
            };
            kmer |= (code2 as u64) << (2 * p);
        }
        let hits = g.lookup(kmer);
        assert!(hits.iter().any(|h| h.gid == a && h.pos == 0));
    }

    #[test]
    fn every_gid_used_is_within_bounds() {
        let mut g = two_linked_sections();
        g.freeze().unwrap();
        let bound = 2 * g.section_count();
        for gid in [g.gid_by_name("a", false).unwrap(), g.gid_by_name("b", true).unwrap()] {
            assert!(gid.0 < bound);
        }
    }
}
