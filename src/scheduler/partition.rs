//! Balanced contiguous partitioning of an index space.

use std::ops::Range;

use tracing::warn;

use crate::error::DispatchError;

/// Splits `[0, total)` into `n` contiguous, disjoint half-open ranges whose
/// sizes differ by at most one. Larger ranges come first.
///
/// `n` greater than `total` is clamped so that no range is empty. An empty
/// index space yields no ranges.
///
/// # Errors
///
/// `DispatchError::ZeroChunks` if `n == 0`.
pub fn partition(total: usize, n: usize) -> Result<Vec<Range<usize>>, DispatchError> {
    if n == 0 {
        return Err(DispatchError::ZeroChunks);
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let chunks = if n > total {
        warn!(
            requested = n,
            total, "More chunks requested than items; clamping to one item per chunk"
        );
        total
    } else {
        n
    };

    let base = total / chunks;
    let remainder = total % chunks;

    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    for i in 0..chunks {
        let len = base + usize::from(i < remainder);
        ranges.push(start..start + len);
        start += len;
    }

    Ok(ranges)
}

/// Applies the same balanced split to an explicit list of indices.
///
/// Order is preserved, so a sorted list produces chunks of consecutive
/// indices.
pub fn split_indices(indices: &[usize], n: usize) -> Result<Vec<Vec<usize>>, DispatchError> {
    Ok(partition(indices.len(), n)?
        .into_iter()
        .map(|range| indices[range].to_vec())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_into_three() {
        let ranges = partition(10, 3).expect("valid");
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_even_split() {
        let ranges = partition(12, 4).expect("valid");
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..12]);
    }

    #[test]
    fn test_zero_chunks_is_error() {
        assert!(matches!(partition(10, 0), Err(DispatchError::ZeroChunks)));
    }

    #[test]
    fn test_empty_total_yields_no_chunks() {
        assert!(partition(0, 5).expect("valid").is_empty());
    }

    #[test]
    fn test_more_chunks_than_items_is_clamped() {
        let ranges = partition(3, 8).expect("valid");
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_partition_properties() {
        for total in 0..60 {
            for n in 1..15 {
                let ranges = partition(total, n).expect("valid");

                // Exhaustive and disjoint: ranges tile [0, total) in order.
                let mut expected_start = 0;
                for range in &ranges {
                    assert_eq!(range.start, expected_start, "total={total} n={n}");
                    assert!(range.end > range.start, "empty chunk total={total} n={n}");
                    expected_start = range.end;
                }
                assert_eq!(expected_start, total);

                if total > 0 {
                    assert_eq!(ranges.len(), n.min(total));
                    let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
                    let max = sizes.iter().copied().max().unwrap_or(0);
                    let min = sizes.iter().copied().min().unwrap_or(0);
                    assert!(max - min <= 1, "unbalanced total={total} n={n}");
                    // Non-increasing sizes: larger chunks first.
                    assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
                }
            }
        }
    }

    #[test]
    fn test_split_indices() {
        let missing = vec![4, 5, 6, 11, 30];
        let chunks = split_indices(&missing, 2).expect("valid");
        assert_eq!(chunks, vec![vec![4, 5, 6], vec![11, 30]]);
    }

    #[test]
    fn test_split_indices_empty() {
        assert!(split_indices(&[], 3).expect("valid").is_empty());
    }
}
