//! The external-collaborator I/O layer: GFA/FASTA/FASTQ input, a
//! compressed-file reader abstraction, and the SAM/GPA result writers.

pub mod fasta;
pub mod gfa;
pub mod gpa;
pub mod reader;
pub mod sam;

pub use reader::{Compression, CompressedReader};

use std::io::BufRead;
use std::path::Path;

use crate::error::{AlignError, Result};
use crate::graph::store::GraphStore;

/// Which of the two supported graph-bearing formats a file holds. Chosen
/// at construction by sniffing the first non-control byte of the
/// (decompressed) stream, rather than branching on file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Gfa,
    Fastx,
}

/// Peeks the first byte of `path`'s (possibly compressed) content without
/// consuming the stream, classifying `H` as GFA and `>`/`@` as FASTA/FASTQ.
/// Anything else is a format error the caller surfaces at the run
/// boundary (an empty or corrupt input file).
pub fn sniff_input_format(path: &Path) -> Result<InputFormat> {
    let mut reader = CompressedReader::open(path)?;
    let buf = reader.fill_buf().map_err(AlignError::Io)?;
    match buf.first() {
        Some(b'H') => Ok(InputFormat::Gfa),
        Some(b'>') | Some(b'@') => Ok(InputFormat::Fastx),
        _ => Err(AlignError::BadFormat {
            kind: "input",
            path: path.to_path_buf(),
            offset: 0,
            detail: "file does not start with a recognized GFA `H` or FASTA/FASTQ `>`/`@` line".to_string(),
        }),
    }
}

/// Reads a whole reference (GFA, or every FASTA/FASTQ record folded into
/// one link-free graph) into a single archived-ready [`GraphStore`].
/// Setup-boundary errors (malformed/missing file) are fatal and are left
/// for the caller to convert into a process exit.
pub fn read_reference(path: &Path) -> Result<GraphStore> {
    match sniff_input_format(path)? {
        InputFormat::Gfa => gfa::read_gfa_path(path),
        InputFormat::Fastx => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "reference".to_string());
            let mut store = GraphStore::new(name);
            let reader = CompressedReader::open(path)?;
            let mut fx = fasta::FastxReader::new(std::io::BufReader::new(reader), path);
            while let Some(rec) = fx.next_record()? {
                store.add_section_ascii(&rec.name, &rec.bases)?;
            }
            Ok(store)
        }
    }
}

/// One named, link-free-or-not query graph pulled off a query input
/// stream, paired with its position in that stream.
pub struct QueryRecord {
    pub index: u64,
    pub name: String,
    pub store: GraphStore,
}

/// Reads a query input into a stream of query graphs: a GFA query becomes
/// one item (the whole graph, possibly with links), a FASTA/FASTQ query
/// becomes one item per record (each a link-free single-segment graph).
/// Per-record FASTA/FASTQ parse errors are logged once with their byte
/// offset and that record is dropped; the stream continues rather than
/// aborting the whole run.
pub fn read_query_records(path: &Path) -> Result<Vec<QueryRecord>> {
    match sniff_input_format(path)? {
        InputFormat::Gfa => {
            let mut store = gfa::read_gfa_path(path)?;
            let name = store.name.clone();
            store.freeze()?;
            Ok(vec![QueryRecord { index: 0, name, store }])
        }
        InputFormat::Fastx => {
            let reader = CompressedReader::open(path)?;
            let mut fx = fasta::FastxReader::new(std::io::BufReader::new(reader), path);
            let mut out = Vec::new();
            let mut index = 0u64;
            loop {
                match fx.next_record() {
                    Ok(Some(rec)) => {
                        let mut store = fasta::record_to_store(&rec)?;
                        if let Err(e) = store.freeze() {
                            tracing::warn!(record = %rec.name, error = %e, "dropping query record that failed to freeze");
                            continue;
                        }
                        out.push(QueryRecord { index, name: rec.name, store });
                        index += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed query record");
                        continue;
                    }
                }
            }
            Ok(out)
        }
    }
}
