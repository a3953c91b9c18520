//! Component C: packed-k-mer -> sorted `(gid, pos)` list, O(1) lookup.

use crate::error::{AlignError, Result};
use crate::graph::encode::check_klen;
use crate::graph::section::{Gid, GidPos, KmerTuple};
use crate::radix::{radix_sort, RadixKeyed};

#[derive(Clone, Copy)]
struct IndexRecord {
    kmer: u64,
    gid: Gid,
    pos: u32,
}

impl RadixKeyed for IndexRecord {
    fn radix_key(&self) -> u64 {
        self.kmer
    }
}

/// Bucket `i` of the index spans `entries[prefix[i]..prefix[i+1])`, holding
/// every `(gid, pos)` that emits packed k-mer value `i` (masked to `2k`
/// bits). Built once per archived graph in [`GraphStore::build_index`].
pub struct KmerIndex {
    k: u32,
    prefix: Vec<u32>,
    entries: Vec<GidPos>,
}

impl KmerIndex {
    pub fn build(k: u32, tuples: Vec<KmerTuple>) -> Result<Self> {
        check_klen(k)?;
        let num_buckets = 1usize
            .checked_shl(2 * k)
            .ok_or_else(|| AlignError::InvalidArgs(format!("k = {k} too large for a direct bucket table")))?;

        let mut records: Vec<IndexRecord> = tuples
            .into_iter()
            .map(|t| IndexRecord {
                kmer: t.kmer,
                gid: t.gid,
                pos: t.pos,
            })
            .collect();
        radix_sort(&mut records, 2 * k);

        let mut prefix = vec![0u32; num_buckets + 1];
        let mut entries = Vec::with_capacity(records.len());
        let mut bucket = 0usize;
        for rec in &records {
            let key = rec.kmer as usize;
            debug_assert!(key < num_buckets);
            while bucket < key {
                bucket += 1;
                prefix[bucket] = entries.len() as u32;
            }
            entries.push(GidPos { gid: rec.gid, pos: rec.pos });
        }
        while bucket < num_buckets {
            bucket += 1;
            prefix[bucket] = entries.len() as u32;
        }

        Ok(KmerIndex { k, prefix, entries })
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn lookup(&self, packed_kmer: u64) -> &[GidPos] {
        let mask = if self.k >= 32 { u64::MAX } else { (1u64 << (2 * self.k)) - 1 };
        let key = (packed_kmer & mask) as usize;
        if key + 1 >= self.prefix.len() {
            return &[];
        }
        let begin = self.prefix[key] as usize;
        let end = self.prefix[key + 1] as usize;
        &self.entries[begin..end]
    }

    pub fn bucket_count(&self, packed_kmer: u64) -> usize {
        self.lookup(packed_kmer).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::GraphStore;
    use crate::kmer::enumerator::KmerEnumerator;

    #[test]
    fn every_position_is_findable_in_its_own_bucket() {
        let mut g = GraphStore::new("t");
        g.add_section_ascii("ref1", b"GGCTGCCTCCGAGCGTGTGGGCGAGGACAACCGCCCCACAGTCAAGCTCGAATGGGTGCTATTGCGTAGCTAGGACCGGCACT")
            .unwrap();
        g.freeze().unwrap();
        g.build_index(14).unwrap();

        let gid = g.gid_by_name("ref1", false).unwrap();
        let tuples: Vec<_> = KmerEnumerator::for_index(&g, 14).unwrap().collect();
        for t in &tuples {
            if t.gid != gid {
                continue;
            }
            let hits = g.lookup(t.kmer);
            assert!(
                hits.iter().any(|h| h.gid == t.gid && h.pos == t.pos),
                "({:?}, {}) missing from bucket for kmer {:x}",
                t.gid,
                t.pos,
                t.kmer
            );
        }
    }
}
