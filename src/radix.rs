//! Generic radix sort over fixed-width `(key, payload)` records.
//!
//! This is a utility with no domain-specific content of its own — any
//! correct LSD radix sort satisfies callers. It is used by the k-mer index
//! build, which sorts index records by the low `2k` bits of a packed
//! k-mer.

use rayon::prelude::*;

/// A record radix-sortable by an unsigned integer key, carrying arbitrary
/// payload along for the ride.
pub trait RadixKeyed {
    fn radix_key(&self) -> u64;
}

const RADIX_BITS: u32 = 8;
const RADIX_SIZE: usize = 1 << RADIX_BITS;
const RADIX_MASK: u64 = (RADIX_SIZE as u64) - 1;

/// Sorts `items` ascending by [`RadixKeyed::radix_key`], considering only
/// the lowest `key_bits` bits of the key (the rest are assumed zero, as is
/// the case for a packed `2k`-bit k-mer). Stable: ties keep their
/// original relative order, which the k-mer index relies on to place the
/// (gid, pos) pairs for a repeated k-mer in [`crate::kmer::index`]'s own
/// preferred, implementation-defined order; callers must not rely on a
/// particular tie order among same-kmer positions.
pub fn radix_sort<T: RadixKeyed + Send + Copy>(items: &mut Vec<T>, key_bits: u32) {
    if items.len() < 2 || key_bits == 0 {
        return;
    }
    let passes = key_bits.div_ceil(RADIX_BITS);
    let mut buf: Vec<T> = Vec::new();
    let mut src = items;
    for pass in 0..passes {
        let shift = pass * RADIX_BITS;
        buf.clear();
        buf.reserve(src.len());

        // Parallel per-chunk counting, then a serial prefix-sum merge —
        // the counting phase is the embarrassingly parallel part a real
        // thread-pool collaborator would fan out.
        let chunk_len = (src.len() / rayon::current_num_threads().max(1)).max(1);
        let counts: Vec<[usize; RADIX_SIZE]> = src
            .par_chunks(chunk_len)
            .map(|chunk| {
                let mut c = [0usize; RADIX_SIZE];
                for item in chunk {
                    let digit = ((item.radix_key() >> shift) & RADIX_MASK) as usize;
                    c[digit] += 1;
                }
                c
            })
            .collect();

        let mut offsets = [0usize; RADIX_SIZE];
        for digit in 0..RADIX_SIZE {
            for chunk_counts in &counts {
                offsets[digit] += chunk_counts[digit];
            }
        }
        let mut running = 0usize;
        for digit in 0..RADIX_SIZE {
            let c = offsets[digit];
            offsets[digit] = running;
            running += c;
        }

        // per-chunk starting offset for each digit, computed from the
        // global offsets plus the counts of all earlier chunks.
        let mut chunk_starts: Vec<[usize; RADIX_SIZE]> = Vec::with_capacity(counts.len());
        let mut running_by_digit = offsets;
        for chunk_counts in &counts {
            chunk_starts.push(running_by_digit);
            for digit in 0..RADIX_SIZE {
                running_by_digit[digit] += chunk_counts[digit];
            }
        }

        unsafe {
            buf.set_len(src.len());
        }
        let buf_ptr = buf.as_mut_ptr() as usize;
        src.par_chunks(chunk_len)
            .zip(chunk_starts.par_iter())
            .for_each(|(chunk, starts)| {
                let mut local = *starts;
                for item in chunk {
                    let digit = ((item.radix_key() >> shift) & RADIX_MASK) as usize;
                    let dst = local[digit];
                    local[digit] += 1;
                    // SAFETY: each `dst` slot is claimed by exactly one
                    // (chunk, digit) writer, per the prefix-sum partition
                    // above, and all slots in 0..src.len() are covered.
                    unsafe {
                        let p = (buf_ptr as *mut T).add(dst);
                        std::ptr::write(p, *item);
                    }
                }
            });

        *src = std::mem::take(&mut buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Rec(u64, u32);
    impl RadixKeyed for Rec {
        fn radix_key(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn sorts_ascending() {
        let mut v = vec![Rec(5, 0), Rec(1, 1), Rec(300, 2), Rec(0, 3), Rec(9, 4)];
        radix_sort(&mut v, 16);
        let keys: Vec<u64> = v.iter().map(|r| r.0).collect();
        assert_eq!(keys, vec![0, 1, 5, 9, 300]);
    }

    #[test]
    fn handles_empty_and_singleton() {
        let mut v: Vec<Rec> = vec![];
        radix_sort(&mut v, 8);
        assert!(v.is_empty());
        let mut v2 = vec![Rec(42, 0)];
        radix_sort(&mut v2, 8);
        assert_eq!(v2, vec![Rec(42, 0)]);
    }
}
