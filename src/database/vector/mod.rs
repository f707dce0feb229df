
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KbError, Result};

/// Flat (exhaustive) vector index over fixed-dimension float vectors.
///
/// Rows are stored in insertion order and only ever appended, so a row index
/// is a stable handle for the lifetime of the index. Queries scan every row
/// and rank by squared Euclidean distance. Exhaustive search keeps results
/// exact and the structure trivially serializable, which is the right trade
/// for an interactive document-chat corpus of modest size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    // Row-major storage: row r occupies vectors[r * dimension..(r + 1) * dimension].
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of the given dimensionality.
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(KbError::InvalidArgument(
                "vector dimension must be positive".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            vectors: Vec::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows currently in the index.
    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append rows in order. Either all vectors are added or none are.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(KbError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }

        debug!("Index now holds {} rows", self.len());
        Ok(())
    }

    /// Return up to `k` nearest rows to `query` as `(row_index, distance)`
    /// pairs, ordered by ascending squared Euclidean distance. An empty index
    /// yields an empty result; an index smaller than `k` yields every row.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if k == 0 {
            return Err(KbError::InvalidArgument(
                "search limit must be positive".to_string(),
            ));
        }
        if query.len() != self.dimension {
            return Err(KbError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, stored)| {
                let distance = stored
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (row, distance)
            })
            .collect();

        // total_cmp gives NaN a defined sort position; callers are expected
        // to treat only finite distances as valid matches.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);

        Ok(hits)
    }

    /// Serialize the index to an opaque binary blob.
    #[inline]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| KbError::Persistence(format!("Failed to encode vector index: {e}")))
    }

    /// Reconstruct an index from a blob produced by [`FlatIndex::to_bytes`].
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (index, _): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| KbError::Persistence(format!("Failed to decode vector index: {e}")))?;

        if index.dimension == 0 || index.vectors.len() % index.dimension != 0 {
            return Err(KbError::Persistence(
                "Decoded vector index has inconsistent dimensions".to_string(),
            ));
        }

        Ok(index)
    }
}
