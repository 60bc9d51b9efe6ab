//! Partition planning for globally-shaped arrays.
//!
//! A distributed array is split along one dimension into contiguous, equally
//! sized shares; the first `n % size` ranks carry one extra element. Planning
//! is pure and deterministic, so every rank can compute every other rank's
//! share without communicating.
//!
//! # Example
//!
//! ```
//! use ferrodist::partition::chunk;
//!
//! // 10 rows over 4 ranks: 3, 3, 2, 2
//! let p = chunk(&[10, 6], Some(0), 2, 4).unwrap();
//! assert_eq!(p.offset, 6);
//! assert_eq!(p.local_shape, vec![2, 6]);
//! assert_eq!(p.local_slice, vec![6..8, 0..6]);
//! ```

use std::ops::Range;

use ndarray::{ArrayBase, Axis, Dimension, RawData, Slice};

use crate::error::{Error, Result};

/// One rank's share of a globally-shaped array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Start of the share along the split dimension (0 when not split).
    pub offset: usize,
    /// Shape of the local share.
    pub local_shape: Vec<usize>,
    /// Index range of the share along every dimension of the global array.
    pub local_slice: Vec<Range<usize>>,
}

impl Partition {
    /// Restrict `array` (a view of the global array) to this share.
    ///
    /// Fails with [`Error::ShapeMismatch`] when `array` cannot contain the
    /// share, i.e. its rank differs or a slice runs past its extent.
    pub fn apply<S, D>(&self, mut array: ArrayBase<S, D>) -> Result<ArrayBase<S, D>>
    where
        S: RawData,
        D: Dimension,
    {
        if array.ndim() != self.local_slice.len() {
            return Err(Error::ShapeMismatch(format!(
                "partition spans {} dimensions, array has {}",
                self.local_slice.len(),
                array.ndim()
            )));
        }
        for (axis, range) in self.local_slice.iter().enumerate() {
            if range.end > array.len_of(Axis(axis)) {
                return Err(Error::ShapeMismatch(format!(
                    "slice {range:?} exceeds extent {} of axis {axis}",
                    array.len_of(Axis(axis))
                )));
            }
            array.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
        }
        Ok(array)
    }

    /// Number of elements in the local share.
    pub fn len(&self) -> usize {
        self.local_shape.iter().product()
    }

    /// Whether the local share holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve a possibly negative axis against `ndim` dimensions.
pub fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
    let signed_ndim = ndim as isize;
    let resolved = if axis < 0 { axis + signed_ndim } else { axis };
    if resolved < 0 || resolved >= signed_ndim {
        return Err(Error::InvalidDimension { axis, ndim });
    }
    Ok(resolved as usize)
}

/// Compute `rank`'s share of `global_shape` split along `split` over `size` ranks.
///
/// `split = None` means the array is replicated: the full shape is returned
/// with offset 0.
pub fn chunk(
    global_shape: &[usize],
    split: Option<isize>,
    rank: usize,
    size: usize,
) -> Result<Partition> {
    check_group(rank, size)?;

    let full: Vec<Range<usize>> = global_shape.iter().map(|&n| 0..n).collect();
    let Some(split) = split else {
        return Ok(Partition {
            offset: 0,
            local_shape: global_shape.to_vec(),
            local_slice: full,
        });
    };

    let axis = normalize_axis(split, global_shape.len())?;
    let (extent, offset) = share(global_shape[axis], rank, size);

    let mut local_shape = global_shape.to_vec();
    local_shape[axis] = extent;
    let mut local_slice = full;
    local_slice[axis] = offset..offset + extent;

    Ok(Partition {
        offset,
        local_shape,
        local_slice,
    })
}

/// Per-rank `(count, displacement)` along the split dimension.
///
/// Entry `r` equals `(local_shape[split], offset)` of `chunk(.., r, size)`.
pub fn counts_displs(
    global_shape: &[usize],
    split: isize,
    size: usize,
) -> Result<Vec<(usize, usize)>> {
    check_group(0, size)?;
    let axis = normalize_axis(split, global_shape.len())?;
    Ok((0..size)
        .map(|rank| share(global_shape[axis], rank, size))
        .collect())
}

/// Extent and offset of `rank`'s share of `n` elements over `size` ranks.
fn share(n: usize, rank: usize, size: usize) -> (usize, usize) {
    let q = n / size;
    let r = n % size;
    if rank < r {
        (q + 1, rank * (q + 1))
    } else {
        (q, r * (q + 1) + (rank - r) * q)
    }
}

fn check_group(rank: usize, size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::InvalidRank(0));
    }
    if rank >= size {
        return Err(Error::InvalidRank(rank as i32));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array, Data, RemoveAxis};

    fn stitch<S, D>(parts: &[ArrayBase<S, D>], axis: usize) -> Array<S::Elem, D>
    where
        S: Data,
        S::Elem: Clone,
        D: RemoveAxis,
    {
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        ndarray::concatenate(Axis(axis), &views).expect("parts agree on non-split extents")
    }

    fn data() -> ndarray::Array2<f32> {
        arr2(&[[3.0, 2.0, 1.0], [4.0, 5.0, 6.0]])
    }

    #[test]
    fn self_group_returns_whole_shape() {
        let shape = [2, 3];
        for split in [0isize, 1, -1, -2] {
            let p = chunk(&shape, Some(split), 0, 1).unwrap();
            assert_eq!(p.offset, 0);
            assert_eq!(p.local_shape, shape.to_vec());
            assert_eq!(p.apply(data().view()).unwrap(), data());
        }
    }

    #[test]
    fn split_out_of_range_is_rejected() {
        assert_eq!(
            chunk(&[2, 3], Some(2), 0, 1),
            Err(Error::InvalidDimension { axis: 2, ndim: 2 })
        );
        assert_eq!(
            chunk(&[2, 3], Some(-3), 0, 1),
            Err(Error::InvalidDimension { axis: -3, ndim: 2 })
        );
    }

    #[test]
    fn unsplit_is_replicated() {
        let p = chunk(&[4, 5], None, 3, 4).unwrap();
        assert_eq!(p.offset, 0);
        assert_eq!(p.local_shape, vec![4, 5]);
        assert_eq!(p.local_slice, vec![0..4, 0..5]);
    }

    #[test]
    fn remainder_goes_to_lowest_ranks() {
        let extents: Vec<usize> = (0..4)
            .map(|r| chunk(&[10], Some(0), r, 4).unwrap().local_shape[0])
            .collect();
        assert_eq!(extents, vec![3, 3, 2, 2]);

        let offsets: Vec<usize> = (0..4)
            .map(|r| chunk(&[10], Some(0), r, 4).unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![0, 3, 6, 8]);
    }

    #[test]
    fn more_ranks_than_elements_gives_empty_shares() {
        let parts: Vec<Partition> = (0..5).map(|r| chunk(&[3, 2], Some(0), r, 5).unwrap()).collect();
        assert_eq!(
            parts.iter().map(|p| p.local_shape[0]).collect::<Vec<_>>(),
            vec![1, 1, 1, 0, 0]
        );
        assert_eq!(
            parts.iter().map(|p| p.offset).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 3]
        );
        assert!(parts[4].is_empty());
    }

    #[test]
    fn negative_split_counts_from_the_end() {
        let p = chunk(&[4, 7], Some(-1), 1, 2).unwrap();
        assert_eq!(p.local_shape, vec![4, 3]);
        assert_eq!(p.local_slice, vec![0..4, 4..7]);
    }

    #[test]
    fn shares_stitch_back_to_the_global_array() {
        let global = Array::from_shape_fn((5, 4), |(i, j)| (i * 4 + j) as i64);
        for split in 0..2 {
            let parts: Vec<_> = (0..3)
                .map(|r| {
                    chunk(global.shape(), Some(split as isize), r, 3)
                        .unwrap()
                        .apply(global.view())
                        .unwrap()
                })
                .collect();
            assert_eq!(stitch(&parts, split), global);
        }
    }

    #[test]
    fn counts_displs_agree_with_chunk() {
        let shape = [13, 2];
        let table = counts_displs(&shape, 0, 5).unwrap();
        for (rank, &(count, displ)) in table.iter().enumerate() {
            let p = chunk(&shape, Some(0), rank, 5).unwrap();
            assert_eq!((count, displ), (p.local_shape[0], p.offset));
        }
    }

    #[test]
    fn invalid_group_is_rejected() {
        assert_eq!(chunk(&[4], Some(0), 0, 0), Err(Error::InvalidRank(0)));
        assert_eq!(chunk(&[4], Some(0), 2, 2), Err(Error::InvalidRank(2)));
    }

    #[test]
    fn apply_rejects_wrong_rank_arrays() {
        let p = chunk(&[2, 3], Some(0), 0, 2).unwrap();
        let flat = ndarray::Array1::<f32>::zeros(6);
        assert!(matches!(p.apply(flat.view()), Err(Error::ShapeMismatch(_))));
    }
}
