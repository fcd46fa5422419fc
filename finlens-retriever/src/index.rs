//! Exact nearest-neighbour search over dense vectors.
//!
//! [`FlatL2Index`] keeps every vector in one row-major buffer and answers
//! queries by brute force: the squared Euclidean distance to every row is
//! computed and the closest `k` rows are returned, nearest first. Row `i` is
//! always the `i`-th vector added, so callers can map results back to their
//! own data positionally.
//!
//! ## Example
//!
//! ```
//! use finlens_retriever::index::FlatL2Index;
//!
//! let index = FlatL2Index::build(&[
//!     vec![0.0, 0.0],
//!     vec![10.0, 10.0],
//!     vec![1.0, 1.0],
//! ]).unwrap();
//!
//! let hits = index.search(&[0.9, 0.9], 2).unwrap();
//! assert_eq!(hits[0].index, 2);
//! assert_eq!(hits[1].index, 0);
//! ```

use serde::Serialize;
use std::cmp::Ordering;

/// Errors raised while building or querying a [`FlatL2Index`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// An index cannot be built from zero vectors
    #[error("cannot build an index from zero vectors")]
    Empty,

    /// Zero-length vectors have no geometry
    #[error("vectors must have at least one dimension")]
    ZeroDimension,

    /// A vector does not have the index dimension
    #[error("dimension mismatch: index has {expected} dimensions, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Storage for the vectors could not be reserved
    #[error("failed to allocate storage for {requested} vector components")]
    Allocation { requested: usize },
}

impl IndexError {
    /// Allocation failure is the only error a caller cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    /// Insertion position of the matching vector
    pub index: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Flat (brute-force) index using squared L2 distance.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Build an index from a non-empty set of equal-length vectors.
    ///
    /// The dimension is taken from the first vector.
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let first = vectors.first().ok_or(IndexError::Empty)?;
        let mut index = Self::new(first.len())?;
        index.add_all(vectors)?;
        Ok(index)
    }

    /// Append one vector.
    pub fn add(&mut self, vector: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(vector)?;
        self.reserve(self.dimension)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Append several vectors. Nothing is added unless every vector fits.
    pub fn add_all(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        for vector in vectors {
            self.check_dimension(vector)?;
        }
        let additional = vectors
            .len()
            .checked_mul(self.dimension)
            .ok_or(IndexError::Allocation {
                requested: usize::MAX,
            })?;
        self.reserve(additional)?;
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The stored vector at `index`, if any.
    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension).nth(index)
    }

    /// Return the `min(k, len)` nearest vectors to `query`, nearest first.
    ///
    /// Equal distances keep insertion order. NaN distances sort after every
    /// real distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(index, row)| Neighbor {
                index,
                distance: squared_l2(row, query),
            })
            .collect();

        // sort_by is stable, so ties stay in insertion order
        neighbors.sort_by(|a, b| compare_distance(a.distance, b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<(), IndexError> {
        self.data
            .try_reserve(additional)
            .map_err(|_| IndexError::Allocation {
                requested: additional,
            })
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn compare_distance(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_nearest(vectors: &[Vec<f32>], query: &[f32]) -> usize {
        let mut best = 0;
        for (i, v) in vectors.iter().enumerate() {
            if squared_l2(v, query) < squared_l2(&vectors[best], query) {
                best = i;
            }
        }
        best
    }

    #[test]
    fn test_build_rejects_bad_input() {
        assert_eq!(FlatL2Index::build(&[]).unwrap_err(), IndexError::Empty);
        assert_eq!(
            FlatL2Index::build(&[vec![]]).unwrap_err(),
            IndexError::ZeroDimension
        );
        assert_eq!(
            FlatL2Index::build(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err(),
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_failed_add_all_leaves_index_unchanged() {
        let mut index = FlatL2Index::build(&[vec![1.0, 1.0]]).unwrap();
        let result = index.add_all(&[vec![2.0, 2.0], vec![3.0]]);

        assert!(result.is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = FlatL2Index::build(&[
            vec![5.0, 0.0],
            vec![1.0, 0.0],
            vec![3.0, 0.0],
            vec![0.0, 0.0],
        ])
        .unwrap();

        let hits = index.search(&[0.0, 0.0], 4).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[2].distance, 9.0);
    }

    #[test]
    fn test_k_is_clamped() {
        let index = FlatL2Index::build(&[vec![1.0], vec![2.0], vec![3.0]]).unwrap();

        assert_eq!(index.search(&[0.0], 6).unwrap().len(), 3);
        assert_eq!(index.search(&[0.0], 2).unwrap().len(), 2);
        assert!(index.search(&[0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index =
            FlatL2Index::build(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]]).unwrap();

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_nan_distances_sort_last() {
        let index = FlatL2Index::build(&[vec![f32::NAN], vec![4.0], vec![1.0]]).unwrap();

        let hits = index.search(&[0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = FlatL2Index::build(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(
            index.search(&[1.0, 2.0], 1).unwrap_err(),
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        // Deterministic pseudo-random points
        let mut state = 17u32;
        let mut next = || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ((state >> 16) % 1000) as f32 / 100.0
        };
        let vectors: Vec<Vec<f32>> = (0..50).map(|_| (0..8).map(|_| next()).collect()).collect();
        let index = FlatL2Index::build(&vectors).unwrap();

        for _ in 0..10 {
            let query: Vec<f32> = (0..8).map(|_| next()).collect();
            let hits = index.search(&query, 1).unwrap();
            assert_eq!(hits[0].index, brute_force_nearest(&vectors, &query));
        }
    }

    #[test]
    fn test_vectors_are_positional() {
        let mut index = FlatL2Index::new(2).unwrap();
        index.add(&[1.0, 2.0]).unwrap();
        index.add(&[3.0, 4.0]).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.vector(2), None);
        assert!(IndexError::Allocation { requested: 1 }.is_fatal());
        assert!(!IndexError::Empty.is_fatal());
    }
}
