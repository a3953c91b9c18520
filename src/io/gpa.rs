//! GPA (graph pairwise alignment) v0.1 writer: one `A` line per
//! path-section, chained by `prev`/`next` alignment names.
//!
//! Preserves a quirk of the format this was modeled on: the reversed
//! query position is computed using the *reference* section's length,
//! not the query section's. Whether that was intentional (the two graphs
//! share an index in the self-alignment case this crate was validated
//! against) or a latent bug is unresolved upstream; this writer keeps the
//! observable behavior rather than silently "fixing" it.

use std::io::{self, Write};

use crate::align::dp::print_cigar;
use crate::align::result::AlignmentResult;
use crate::graph::store::GraphStore;

pub fn write_header<W: Write>(mut w: W) -> io::Result<()> {
    writeln!(w, "H\tVN:Z:0.1")
}

/// Writes every path-section of `result` as one `A` line, named
/// `aln_name.N`, chained to its neighbors within the same result.
pub fn write_result<W: Write>(
    mut w: W,
    aln_name: &str,
    result: &AlignmentResult,
    reference: &GraphStore,
    query: &GraphStore,
) -> io::Result<()> {
    let n = result.sections.len();
    for (i, section) in result.sections.iter().enumerate() {
        let ops = result.path_slice(section);
        let cigar = print_cigar(ops);

        let ref_dir = if section.aid.is_reverse() { '-' } else { '+' };
        let query_dir = if section.bid.is_reverse() { '-' } else { '+' };

        let ref_len = reference.len_of(section.aid);
        let query_len = query.len_of(section.bid);

        let ref_pos = if section.aid.is_reverse() {
            ref_len - section.apos
        } else {
            section.apos
        };
        // Intentionally uses `ref_len`, not `query_len`, for the
        // reversed query position; see module docs.
        let query_pos = if section.bid.is_reverse() {
            ref_len - section.bpos
        } else {
            section.bpos
        };

        let prev = if i == 0 { "*".to_string() } else { format!("{aln_name}.{}", i - 1) };
        let next = if i + 1 == n { "*".to_string() } else { format!("{aln_name}.{}", i + 1) };

        writeln!(
            w,
            "A\t{aln_name}.{i}\t{}\t{ref_pos}\t{ref_len}\t{ref_dir}\t{}\t{query_pos}\t{query_len}\t{query_dir}\t{cigar}\t{prev}\t{next}\tMQ:i:255",
            reference.name_of(section.aid),
            query.name_of(section.bid),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::dp::{PathBits, StepOp};
    use crate::align::result::PathSection;

    #[test]
    fn single_section_chains_to_sentinels() {
        let mut reference = GraphStore::new("ref");
        reference.add_section_ascii("r0", b"ACGTACGT").unwrap();
        reference.freeze().unwrap();
        let mut query = GraphStore::new("query");
        query.add_section_ascii("q0", b"ACGTACGT").unwrap();
        query.freeze().unwrap();

        let mut path = PathBits::default();
        for _ in 0..8 {
            path.push(StepOp::Match);
        }
        let section = PathSection {
            aid: reference.gid_by_name("r0", false).unwrap(),
            bid: query.gid_by_name("q0", false).unwrap(),
            apos: 0,
            bpos: 0,
            alen: 8,
            blen: 8,
            ppos: 0,
            plen: 8,
        };
        let result = AlignmentResult {
            score: 16,
            qual: 255,
            sections: vec![section],
            path,
        };
        let mut buf = Vec::new();
        write_result(&mut buf, "aln0", &result, &reference, &query).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("A\taln0.0\t"));
        assert!(text.trim_end().ends_with("*\t*\tMQ:i:255"));
    }
}
