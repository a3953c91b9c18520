//! GFA-subset reader: `H`/`S`/`L` lines only, `C`/`P` lines skipped,
//! non-zero link overlaps rejected.

use std::io::BufRead;
use std::path::Path;

use crate::error::{AlignError, Result};
use crate::graph::store::GraphStore;

const MIN_VERSION: (u32, u32, u32) = (1, 0, 0);

fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    let mut it = s.split('.');
    let major = it.next()?.parse().ok()?;
    let minor = it.next()?.parse().ok()?;
    let patch = it.next()?.parse().ok()?;
    Some((major, minor, patch))
}

fn bad_format(path: &Path, offset: u64, kind: &'static str, detail: impl Into<String>) -> AlignError {
    AlignError::BadFormat {
        kind,
        path: path.to_path_buf(),
        offset,
        detail: detail.into(),
    }
}

/// Reads a GFA-subset stream into a fresh [`GraphStore`] named after
/// `path`'s file stem (or `"graph"` if it has none).
pub fn read_gfa<R: BufRead>(mut reader: R, path: &Path) -> Result<GraphStore> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "graph".to_string());
    let mut store = GraphStore::new(name);

    let mut offset: u64 = 0;
    let mut saw_header = false;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(AlignError::Io)?;
        if n == 0 {
            break;
        }
        let this_offset = offset;
        offset += n as u64;
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(&line);
        let fields: Vec<&str> = text.split('\t').collect();
        match fields[0] {
            "H" => {
                let vn = fields
                    .iter()
                    .find(|f| f.starts_with("VN:Z:"))
                    .map(|f| &f[5..])
                    .ok_or_else(|| bad_format(path, this_offset, "gfa", "H line missing VN:Z: tag"))?;
                let found = parse_version(vn)
                    .ok_or_else(|| bad_format(path, this_offset, "gfa", format!("unparseable version `{vn}`")))?;
                if found < MIN_VERSION {
                    return Err(AlignError::UnsupportedVersion {
                        found: vn.to_string(),
                        required: "1.0.0".to_string(),
                    });
                }
                saw_header = true;
            }
            "S" => {
                if fields.len() < 3 {
                    return Err(bad_format(path, this_offset, "gfa", "S line missing name or bases"));
                }
                store
                    .add_section_ascii(fields[1], fields[2].as_bytes())
                    .map_err(|e| bad_format(path, this_offset, "gfa", e.to_string()))?;
            }
            "L" => {
                if fields.len() < 6 {
                    return Err(bad_format(path, this_offset, "gfa", "L line missing a required field"));
                }
                if !fields[5].starts_with('0') {
                    return Err(AlignError::UnsupportedFeature(format!(
                        "non-zero overlap link at byte {this_offset}: cigar `{}`",
                        fields[5]
                    )));
                }
                let src_rev = fields[2] == "-";
                let dst_rev = fields[4] == "-";
                let src = store
                    .gid_by_name(fields[1], src_rev)
                    .ok_or_else(|| bad_format(path, this_offset, "gfa", format!("unknown segment `{}`", fields[1])))?;
                let dst = store
                    .gid_by_name(fields[3], dst_rev)
                    .ok_or_else(|| bad_format(path, this_offset, "gfa", format!("unknown segment `{}`", fields[3])))?;
                store
                    .add_link(src, dst)
                    .map_err(|e| bad_format(path, this_offset, "gfa", e.to_string()))?;
            }
            "C" | "P" => continue,
            other => {
                return Err(bad_format(path, this_offset, "gfa", format!("unrecognized line type `{other}`")));
            }
        }
    }

    if !saw_header {
        return Err(AlignError::UnsupportedVersion {
            found: "(missing)".to_string(),
            required: "1.0.0".to_string(),
        });
    }
    Ok(store)
}

pub fn read_gfa_path(path: &Path) -> Result<GraphStore> {
    let reader = crate::io::reader::CompressedReader::open(path)?;
    read_gfa(std::io::BufReader::new(reader), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_header_segments_and_links() {
        let text = "H\tVN:Z:1.0.0\nS\ts0\tACGT\nS\ts1\tTTTT\nL\ts0\t+\ts1\t+\t0M\n";
        let store = read_gfa(Cursor::new(text.as_bytes()), Path::new("x.gfa")).unwrap();
        assert_eq!(store.section_count(), 2);
    }

    #[test]
    fn rejects_old_version() {
        let text = "H\tVN:Z:0.9.0\nS\ts0\tACGT\n";
        let err = read_gfa(Cursor::new(text.as_bytes()), Path::new("x.gfa")).unwrap_err();
        assert!(matches!(err, AlignError::UnsupportedVersion { .. }));
    }

    #[test]
    fn rejects_nonzero_overlap_link() {
        let text = "H\tVN:Z:1.0.0\nS\ts0\tACGT\nS\ts1\tTTTT\nL\ts0\t+\ts1\t+\t5M\n";
        let err = read_gfa(Cursor::new(text.as_bytes()), Path::new("x.gfa")).unwrap_err();
        assert!(matches!(err, AlignError::UnsupportedFeature(_)));
    }

    #[test]
    fn skips_c_and_p_lines() {
        let text = "H\tVN:Z:1.1.0\nS\ts0\tACGT\nP\tpath1\ts0+\t*\nC\ts0\t+\ts0\t+\t0\t0M\n";
        let store = read_gfa(Cursor::new(text.as_bytes()), Path::new("x.gfa")).unwrap();
        assert_eq!(store.section_count(), 1);
    }
}
