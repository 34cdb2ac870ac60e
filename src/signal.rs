//! Signals and Broadcasting
//!
//! This module provides the n-dimensional sample container every generator
//! consumes and produces, together with the broadcasting rules used to
//! combine scalar, per-batch and per-sample parameters.
//!
//! # Conventions
//!
//! - Data is stored row-major; the **last axis is time**.
//! - Every combination of the remaining axes is one independent *lane*.
//! - Shapes are aligned from the trailing end. Two sizes are compatible when
//!   they are equal or one of them is 1; missing leading axes count as 1.
//!
//! ```text
//! frequency (4, 1)  ─┐
//! gate      (4, 512) ├─► broadcast ─► (4, 512)
//! sustain   ()      ─┘
//! ```

use crate::error::{Result, SynthError};
use serde::{Deserialize, Serialize};

/// Ordered axis sizes of a signal
pub type Shape = Vec<usize>;

/// Compute the joint broadcast shape of any number of input shapes.
///
/// Sizes are aligned from the trailing axis. Where one size is 1 the other
/// wins, so a 1 never stretches a 0-length axis.
pub fn broadcast_shape<I, S>(shapes: I) -> Result<Shape>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[usize]>,
{
    let mut result: Shape = Vec::new();

    for shape in shapes {
        let shape = shape.as_ref();
        let rank = result.len().max(shape.len());
        let mut merged = vec![1; rank];

        for axis in 0..rank {
            let a = axis_from_end(&result, rank - 1 - axis);
            let b = axis_from_end(shape, rank - 1 - axis);
            merged[axis] = match (a, b) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => {
                    return Err(SynthError::IncompatibleShape {
                        left: result,
                        right: shape.to_vec(),
                    })
                }
            };
        }

        result = merged;
    }

    Ok(result)
}

/// Size of the axis `offset` positions before the last one, or 1 when absent
fn axis_from_end(shape: &[usize], offset: usize) -> usize {
    if offset < shape.len() {
        shape[shape.len() - 1 - offset]
    } else {
        1
    }
}

/// Number of elements held by a shape
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides of `source` when viewed through `target`, with 0 on
/// every broadcast axis.
fn broadcast_strides(source: &[usize], target: &[usize]) -> Vec<usize> {
    let offset = target.len() - source.len();
    let mut strides = vec![0; target.len()];
    let mut stride = 1;

    for axis in (0..source.len()).rev() {
        if source[axis] != 1 {
            strides[axis + offset] = stride;
        }
        stride *= source[axis];
    }

    strides
}

/// Immutable n-dimensional block of floating-point samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSignal")]
pub struct Signal {
    shape: Shape,
    data: Vec<f64>,
}

/// Unvalidated wire form of a [`Signal`]
#[derive(Deserialize)]
struct RawSignal {
    shape: Shape,
    data: Vec<f64>,
}

impl TryFrom<RawSignal> for Signal {
    type Error = SynthError;

    fn try_from(raw: RawSignal) -> Result<Self> {
        Signal::from_vec(raw.shape, raw.data)
    }
}

impl Signal {
    /// Create a signal from a shape and row-major samples
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        let expected = element_count(&shape);
        if data.len() != expected {
            return Err(SynthError::InvalidParameter(format!(
                "shape {:?} holds {} samples, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Create a one-lane signal from a run of samples
    pub fn from_samples(samples: Vec<f64>) -> Self {
        Self {
            shape: vec![samples.len()],
            data: samples,
        }
    }

    /// Create a rank-0 signal holding a single value
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// Create a signal filled with a constant value
    pub fn full(shape: impl Into<Shape>, value: f64) -> Self {
        let shape = shape.into();
        let data = vec![value; element_count(&shape)];
        Self { shape, data }
    }

    /// Create a signal filled with zeros
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a signal by evaluating `f` at every flat (row-major) index
    pub fn from_fn(shape: impl Into<Shape>, f: impl FnMut(usize) -> f64) -> Self {
        let shape = shape.into();
        let data = (0..element_count(&shape)).map(f).collect();
        Self { shape, data }
    }

    /// Get the axis sizes, time last
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the number of axes
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the signal holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a slice of all samples in row-major order
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consume the signal, returning its samples
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Extent of the time axis (1 for a rank-0 signal)
    #[inline]
    pub fn time_len(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Number of independent lanes
    pub fn lane_count(&self) -> usize {
        match self.time_len() {
            0 => 0,
            t => self.data.len() / t,
        }
    }

    /// Iterate over lanes as contiguous time series
    pub fn lanes(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.time_len().max(1))
    }

    /// Get a single lane by its flat lane index
    pub fn lane(&self, index: usize) -> Option<&[f64]> {
        let t = self.time_len();
        let start = index.checked_mul(t)?;
        self.data.get(start..start + t)
    }

    /// Get a sample by multi-index
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&i, &n) in index.iter().zip(&self.shape) {
            if i >= n {
                return None;
            }
            flat = flat * n + i;
        }
        self.data.get(flat).copied()
    }

    /// Materialize this signal at a larger, broadcast-compatible shape
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Signal> {
        if self.shape == shape {
            return Ok(self.clone());
        }

        let target = broadcast_shape([self.shape(), shape])?;
        if target != shape {
            return Err(SynthError::IncompatibleShape {
                left: self.shape.clone(),
                right: shape.to_vec(),
            });
        }

        let strides = broadcast_strides(&self.shape, shape);
        let total = element_count(shape);
        let mut data = Vec::with_capacity(total);
        let mut index = vec![0; shape.len()];
        let mut offset = 0;

        for _ in 0..total {
            data.push(self.data[offset]);

            // Odometer increment, keeping the source offset in step
            for axis in (0..shape.len()).rev() {
                index[axis] += 1;
                offset += strides[axis];
                if index[axis] < shape[axis] {
                    break;
                }
                offset -= strides[axis] * index[axis];
                index[axis] = 0;
            }
        }

        Ok(Signal {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Apply a function to every sample
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Signal {
        Signal {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combine two signals element-wise after broadcasting them together
    pub fn zip_with(&self, other: &Signal, f: impl Fn(f64, f64) -> f64) -> Result<Signal> {
        let shape = broadcast_shape([self.shape(), other.shape()])?;
        let a = self.broadcast_to(&shape)?;
        let b = other.broadcast_to(&shape)?;
        let data = a
            .data
            .iter()
            .zip(&b.data)
            .map(|(&x, &y)| f(x, y))
            .collect();
        Ok(Signal { shape, data })
    }

    /// Broadcasting element-wise addition
    pub fn add(&self, other: &Signal) -> Result<Signal> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Broadcasting element-wise multiplication
    pub fn mul(&self, other: &Signal) -> Result<Signal> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Multiply all samples by a constant
    pub fn scale(&self, factor: f64) -> Signal {
        self.map(|x| x * factor)
    }

    /// Sum any number of signals with broadcasting; `None` when empty
    pub fn sum<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Result<Option<Signal>> {
        let mut total: Option<Signal> = None;
        for signal in signals {
            total = Some(match total {
                Some(acc) => acc.add(signal)?,
                None => signal.clone(),
            });
        }
        Ok(total)
    }
}

impl From<f64> for Signal {
    fn from(value: f64) -> Self {
        Signal::scalar(value)
    }
}

impl From<Vec<f64>> for Signal {
    fn from(samples: Vec<f64>) -> Self {
        Signal::from_samples(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_per_axis_maximum() {
        let shape = broadcast_shape([vec![4, 1], vec![1, 256]]).unwrap();
        assert_eq!(shape, vec![4, 256]);

        let shape = broadcast_shape([vec![2, 1, 3], vec![5, 1]]).unwrap();
        assert_eq!(shape, vec![2, 5, 3]);
    }

    #[test]
    fn test_broadcast_rejects_mismatch() {
        let result = broadcast_shape([vec![3], vec![4]]);
        assert!(matches!(
            result,
            Err(SynthError::IncompatibleShape { .. })
        ));
    }

    #[test]
    fn test_broadcast_many_shapes() {
        let shapes: Vec<Shape> = vec![vec![], vec![8, 1], vec![100], vec![1, 1, 1]];
        assert_eq!(broadcast_shape(&shapes).unwrap(), vec![1, 8, 100]);

        // Only the third shape conflicts
        let shapes: Vec<Shape> = vec![vec![8, 1], vec![100], vec![7, 100]];
        let err = broadcast_shape(&shapes).unwrap_err();
        assert_eq!(
            err,
            SynthError::IncompatibleShape {
                left: vec![8, 100],
                right: vec![7, 100],
            }
        );
    }

    #[test]
    fn test_broadcast_empty_input() {
        let shapes: Vec<Shape> = Vec::new();
        assert_eq!(broadcast_shape(&shapes).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_broadcast_zero_extent() {
        assert_eq!(broadcast_shape([vec![0], vec![1]]).unwrap(), vec![0]);
        assert!(broadcast_shape([vec![0], vec![2]]).is_err());
    }

    #[test]
    fn test_from_vec_validates_length() {
        assert!(Signal::from_vec(vec![2, 3], vec![0.0; 6]).is_ok());
        assert!(matches!(
            Signal::from_vec(vec![2, 3], vec![0.0; 5]),
            Err(SynthError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_deserialize_validates_length() {
        let signal: Signal = serde_json::from_str(r#"{"shape":[2,1],"data":[0.1,0.2]}"#).unwrap();
        assert_eq!(signal.shape(), &[2, 1]);

        let json = serde_json::to_string(&signal).unwrap();
        assert_eq!(serde_json::from_str::<Signal>(&json).unwrap(), signal);

        let result = serde_json::from_str::<Signal>(r#"{"shape":[2,1],"data":[0.1]}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("holds 2 samples, got 1"));
    }

    #[test]
    fn test_broadcast_to_repeats_axes() {
        let column = Signal::from_vec(vec![2, 1], vec![1.0, 2.0]).unwrap();
        let wide = column.broadcast_to(&[2, 3]).unwrap();
        assert_eq!(wide.as_slice(), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);

        let row = Signal::from_samples(vec![1.0, 2.0, 3.0]);
        let tall = row.broadcast_to(&[2, 3]).unwrap();
        assert_eq!(tall.as_slice(), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

        let scalar = Signal::scalar(0.5);
        let cube = scalar.broadcast_to(&[2, 2, 2]).unwrap();
        assert!(cube.as_slice().iter().all(|&x| x == 0.5));
    }

    #[test]
    fn test_broadcast_to_middle_axis() {
        let source = Signal::from_vec(vec![2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = source.broadcast_to(&[2, 3, 2]).unwrap();
        assert_eq!(
            out.as_slice(),
            &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]
        );
        assert_eq!(out.get(&[1, 2, 0]), Some(3.0));
    }

    #[test]
    fn test_broadcast_to_cannot_shrink() {
        let signal = Signal::zeros(vec![2, 3]);
        assert!(signal.broadcast_to(&[3]).is_err());
        assert!(signal.broadcast_to(&[1, 3]).is_err());
    }

    #[test]
    fn test_elementwise_ops() {
        let a = Signal::from_vec(vec![2, 1], vec![1.0, 2.0]).unwrap();
        let b = Signal::from_samples(vec![10.0, 20.0]);

        let sum = a.add(&b).unwrap();
        assert_eq!(sum.shape(), &[2, 2]);
        assert_eq!(sum.as_slice(), &[11.0, 21.0, 12.0, 22.0]);

        let product = a.mul(&b).unwrap();
        assert_eq!(product.as_slice(), &[10.0, 20.0, 20.0, 40.0]);

        assert_eq!(b.scale(0.5).as_slice(), &[5.0, 10.0]);
    }

    #[test]
    fn test_sum_of_signals() {
        let signals = vec![
            Signal::from_samples(vec![1.0, 1.0]),
            Signal::scalar(2.0),
            Signal::from_samples(vec![0.5, -0.5]),
        ];
        let total = Signal::sum(&signals).unwrap().unwrap();
        assert_eq!(total.as_slice(), &[3.5, 2.5]);

        let none: Vec<Signal> = Vec::new();
        assert!(Signal::sum(&none).unwrap().is_none());
    }

    #[test]
    fn test_lanes() {
        let signal = Signal::from_fn(vec![3, 4], |i| i as f64);
        assert_eq!(signal.lane_count(), 3);
        assert_eq!(signal.time_len(), 4);
        assert_eq!(signal.lane(1), Some(&[4.0, 5.0, 6.0, 7.0][..]));
        assert_eq!(signal.lane(3), None);
        assert_eq!(signal.lanes().count(), 3);

        let scalar = Signal::scalar(1.0);
        assert_eq!(scalar.lane_count(), 1);
        assert_eq!(scalar.lane(0), Some(&[1.0][..]));
    }

    #[test]
    fn test_get_out_of_range() {
        let signal = Signal::zeros(vec![2, 2]);
        assert_eq!(signal.get(&[1, 1]), Some(0.0));
        assert_eq!(signal.get(&[2, 0]), None);
        assert_eq!(signal.get(&[0]), None);
    }
}
