//! The Model Engine seam: the two neural-network calls the pipeline delegates.

use image::RgbImage;
use ndarray::{Array2, ArrayView1, Axis};

use crate::error::EngineError;
use crate::geometry::RectifiedCrop;

/// Per-pixel text probability, indexed `[y, x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    data: Array2<f32>,
}

impl ProbabilityMap {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> f32,
    {
        Self {
            data: Array2::from_shape_fn((height, width), |(y, x)| f(x, y)),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[[y, x]]
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }
}

/// Recognizer output for one crop: `[timesteps, classes]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CharProbabilityMatrix {
    data: Array2<f32>,
}

impl CharProbabilityMatrix {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Builds a matrix from one probability row per timestep.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, EngineError> {
        let classes = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != classes) {
            return Err(EngineError::InvalidInputShape);
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((rows.len(), classes), flat)
            .map_err(|_| EngineError::InvalidInputShape)?;
        Ok(Self { data })
    }

    pub fn timesteps(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, t: usize) -> ArrayView1<'_, f32> {
        self.data.index_axis(Axis(0), t)
    }

    pub fn rows(&self) -> impl Iterator<Item = ArrayView1<'_, f32>> {
        self.data.axis_iter(Axis(0))
    }
}

/// The neural-network forward passes.
///
/// Implementations must be deterministic for identical input and weights. A
/// failure is reported as an [`EngineError`] and is never retried by the pipeline.
pub trait ModelEngine {
    /// Text probability map for the whole image, at whatever resolution the
    /// detector works in; the pipeline rescales boxes to the image size.
    fn detect(&self, image: &RgbImage) -> Result<ProbabilityMap, EngineError>;

    /// One matrix per crop, in input order.
    fn recognize(&self, crops: &[RectifiedCrop]) -> Result<Vec<CharProbabilityMatrix>, EngineError>;
}

impl<E: ModelEngine + ?Sized> ModelEngine for &E {
    fn detect(&self, image: &RgbImage) -> Result<ProbabilityMap, EngineError> {
        (**self).detect(image)
    }

    fn recognize(&self, crops: &[RectifiedCrop]) -> Result<Vec<CharProbabilityMatrix>, EngineError> {
        (**self).recognize(crops)
    }
}

impl<E: ModelEngine + ?Sized> ModelEngine for Box<E> {
    fn detect(&self, image: &RgbImage) -> Result<ProbabilityMap, EngineError> {
        (**self).detect(image)
    }

    fn recognize(&self, crops: &[RectifiedCrop]) -> Result<Vec<CharProbabilityMatrix>, EngineError> {
        (**self).recognize(crops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_map_indexing() {
        let map = ProbabilityMap::from_fn(4, 2, |x, y| (x + 10 * y) as f32);
        assert_eq!(map.width(), 4);
        assert_eq!(map.height(), 2);
        assert_eq!(map.get(3, 1), 13.0);
        assert_eq!(map.as_array().dim(), (2, 4));
        assert_eq!(map.as_array()[[1, 3]], map.get(3, 1));
    }

    #[test]
    fn test_matrix_from_rows() {
        let m = CharProbabilityMatrix::from_rows(&[vec![0.1, 0.9], vec![0.7, 0.3], vec![0.5, 0.5]]).unwrap();
        assert_eq!(m.timesteps(), 3);
        assert_eq!(m.num_classes(), 2);
        assert_eq!(m.row(1)[0], 0.7);
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let err = CharProbabilityMatrix::from_rows(&[vec![0.1, 0.9], vec![1.0]]);
        assert!(matches!(err, Err(EngineError::InvalidInputShape)));
    }
}
