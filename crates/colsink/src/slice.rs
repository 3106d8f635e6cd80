//! Slice grouping for bounded-parallelism batch partitioning
//!
//! A batch index range is partitioned into ordered groups of slices: each
//! group holds up to `parallelism` slices of up to `slice_size` rows and is
//! executed as one concurrent wave. Slice numbering is global across the
//! whole partition because it is later used as an absolute offset multiplier
//! when scan results are written back regardless of task completion order.

use crate::error::{Error, Result};

/// A contiguous sub-range of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// Global slice number across the whole partition (not reset per group)
    pub num: usize,
    /// First row index (inclusive)
    pub start: usize,
    /// Last row index (exclusive)
    pub end: usize,
}

impl Slice {
    /// Number of rows in the slice
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the slice is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition `[0, len)` into groups of bounded-size, bounded-parallelism
/// slices.
///
/// Returns `ceil(len / (slice_size * parallelism))` groups, each holding up
/// to `parallelism` slices of up to `slice_size` rows, with the final slice
/// truncated to `len`. Slices are contiguous, non-overlapping, strictly
/// increasing in `num`, and exactly cover `[0, len)`. `len == 0` yields an
/// empty result; a zero `slice_size` or `parallelism` is a usage error.
pub fn group_slices(len: usize, slice_size: usize, parallelism: usize) -> Result<Vec<Vec<Slice>>> {
    if slice_size == 0 {
        return Err(Error::config("slice size must be greater than zero"));
    }
    if parallelism == 0 {
        return Err(Error::config("parallelism must be greater than zero"));
    }

    let mut groups = Vec::new();
    let mut group = Vec::with_capacity(parallelism);
    let mut num = 0;
    let mut start = 0;

    while start < len {
        let end = (start + slice_size).min(len);
        group.push(Slice { num, start, end });
        num += 1;
        start = end;

        if group.len() == parallelism {
            groups.push(std::mem::replace(&mut group, Vec::with_capacity(parallelism)));
        }
    }
    if !group.is_empty() {
        groups.push(group);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_slices_example() {
        let groups = group_slices(5, 2, 2).unwrap();
        assert_eq!(
            groups,
            vec![
                vec![
                    Slice { num: 0, start: 0, end: 2 },
                    Slice { num: 1, start: 2, end: 4 },
                ],
                vec![Slice { num: 2, start: 4, end: 5 }],
            ]
        );
    }

    #[test]
    fn test_group_slices_empty() {
        assert!(group_slices(0, 10, 4).unwrap().is_empty());
    }

    #[test]
    fn test_group_slices_invalid_args() {
        assert!(group_slices(10, 0, 4).is_err());
        assert!(group_slices(10, 4, 0).is_err());
    }

    #[test]
    fn test_group_slices_exact_cover() {
        for len in [0usize, 1, 7, 16, 100, 101] {
            for slice_size in [1usize, 2, 5, 16] {
                for parallelism in [1usize, 3, 8] {
                    let groups = group_slices(len, slice_size, parallelism).unwrap();

                    let expected_groups = len.div_ceil(slice_size * parallelism);
                    assert_eq!(groups.len(), expected_groups);

                    let mut next = 0;
                    let mut next_num = 0;
                    for group in &groups {
                        assert!(group.len() <= parallelism);
                        for slice in group {
                            assert_eq!(slice.num, next_num);
                            assert_eq!(slice.start, next);
                            assert!(slice.len() <= slice_size);
                            assert!(!slice.is_empty());
                            next = slice.end;
                            next_num += 1;
                        }
                    }
                    assert_eq!(next, len);
                }
            }
        }
    }

    #[test]
    fn test_slice_len() {
        let s = Slice { num: 3, start: 10, end: 14 };
        assert_eq!(s.len(), 4);
        assert!(!s.is_empty());
    }
}
