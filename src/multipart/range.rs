//! Chunk range math
//!
//! Chunk `i` of an object of `size` bytes split into `chunk_size` parts
//! covers `[i * chunk_size, min((i + 1) * chunk_size, size))`. The ranges are
//! contiguous, never overlap, and together cover exactly `[0, size)`.

use crate::backend::RangeOption;

/// Number of chunks needed so that `chunk_size * num_chunks >= size`
pub fn calculate_num_chunks(size: u64, chunk_size: u64) -> usize {
    debug_assert!(chunk_size > 0, "chunk size must be positive");
    size.div_ceil(chunk_size) as usize
}

/// Bytes that chunk `index` must carry: a full chunk, except a short final one
pub fn expected_chunk_len(index: usize, chunk_size: u64, num_chunks: usize, size: u64) -> u64 {
    if index + 1 == num_chunks && size % chunk_size != 0 {
        size % chunk_size
    } else {
        chunk_size
    }
}

/// Half-open byte range `[start, end)` of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Chunk index
    pub index: usize,
    /// First byte
    pub start: u64,
    /// One past the last byte
    pub end: u64,
}

impl ChunkRange {
    /// Range of chunk `index`, or `None` if it starts at or beyond `size`
    pub fn for_index(index: usize, chunk_size: u64, size: u64) -> Option<Self> {
        let start = (index as u64).checked_mul(chunk_size)?;
        if start >= size {
            return None;
        }
        let end = start.saturating_add(chunk_size).min(size);
        Some(Self { index, start, end })
    }

    /// Number of bytes in the chunk
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Chunks produced by [`ChunkRange::for_index`] are never empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive range for a ranged read of this chunk
    pub fn to_range_option(&self) -> RangeOption {
        RangeOption::new(self.start, self.end - 1)
    }
}

/// All chunk ranges of an object, in index order
pub fn chunk_ranges(size: u64, chunk_size: u64) -> impl Iterator<Item = ChunkRange> {
    let num_chunks = calculate_num_chunks(size, chunk_size);
    (0..num_chunks).filter_map(move |index| ChunkRange::for_index(index, chunk_size, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_num_chunks() {
        assert_eq!(calculate_num_chunks(150, 64), 3);
        assert_eq!(calculate_num_chunks(128, 64), 2);
        assert_eq!(calculate_num_chunks(10, 64), 1);
        assert_eq!(calculate_num_chunks(1000, 300), 4);
    }

    #[test]
    fn test_ranges_for_150_bytes() {
        let ranges: Vec<_> = chunk_ranges(150, 64).map(|r| (r.start, r.end)).collect();
        assert_eq!(ranges, vec![(0, 64), (64, 128), (128, 150)]);
    }

    #[test]
    fn test_expected_chunk_len() {
        let sizes: Vec<_> = (0..4).map(|i| expected_chunk_len(i, 300, 4, 1000)).collect();
        assert_eq!(sizes, vec![300, 300, 300, 100]);
        assert_eq!(sizes.iter().sum::<u64>(), 1000);

        // Exact multiple: last chunk is full
        assert_eq!(expected_chunk_len(1, 64, 2, 128), 64);
    }

    #[test]
    fn test_chunk_past_end_is_none() {
        assert!(ChunkRange::for_index(3, 64, 150).is_none());
        assert!(ChunkRange::for_index(usize::MAX, u64::MAX, 150).is_none());
    }

    #[test]
    fn test_range_option_is_inclusive() {
        let range = ChunkRange::for_index(2, 64, 150).unwrap();
        assert_eq!(range.to_range_option(), RangeOption::new(128, 149));
        assert_eq!(range.to_range_option().len(), range.len());
    }

    proptest! {
        #[test]
        fn prop_num_chunks_bounds(size in 1u64..1 << 40, chunk_size in 1u64..1 << 30) {
            let n = calculate_num_chunks(size, chunk_size) as u64;
            prop_assert!(n * chunk_size >= size);
            prop_assert!((n - 1) * chunk_size < size);
        }

        #[test]
        fn prop_ranges_tile_object(size in 1u64..1 << 20, chunk_size in 64u64..1 << 16) {
            let mut next = 0u64;
            let mut total = 0u64;
            for range in chunk_ranges(size, chunk_size) {
                prop_assert_eq!(range.start, next);
                prop_assert!(!range.is_empty());
                next = range.end;
                total += range.len();
            }
            prop_assert_eq!(next, size);
            prop_assert_eq!(total, size);
        }

        #[test]
        fn prop_expected_len_matches_range(size in 1u64..1 << 20, chunk_size in 64u64..1 << 16) {
            let n = calculate_num_chunks(size, chunk_size);
            for range in chunk_ranges(size, chunk_size) {
                prop_assert_eq!(expected_chunk_len(range.index, chunk_size, n, size), range.len());
            }
        }
    }
}
