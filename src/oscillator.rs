//! Oscillators
//!
//! Stateless periodic waveform generators. Each oscillator integrates its
//! frequency input into a running phase (measured in cycles) along the time
//! axis, adds the optional phase-modulation input, and shapes the result
//! with its waveform function.
//!
//! Sample `i` of a lane has phase `sum(frequency[0..=i]) / sample_rate`, so
//! the first sample already carries one increment. Rendering a longer block
//! with the same inputs reproduces a shorter block as its prefix.

use crate::error::{Result, SynthError};
use crate::signal::{broadcast_shape, Shape, Signal};
use std::f64::consts::TAU;

/// Capability shared by every waveform: shape a phase into a sample
///
/// Implementors only provide [`Oscillator::waveform`]; phase accumulation,
/// broadcasting and validation come from the provided [`Oscillator::render`].
pub trait Oscillator: Send + Sync {
    /// Evaluate the waveform at `phase` cycles; periodic with period 1
    fn waveform(&self, phase: f64) -> f64;

    /// Stable identifier used by presets
    fn type_id(&self) -> &'static str;

    /// Render `length` samples per lane.
    ///
    /// `frequency` (Hz) and `phase_mod` (cycles) broadcast against a trailing
    /// time axis of `length`. A per-batch constant frequency carries a
    /// trailing size-1 axis, e.g. `(batch, 1)`.
    fn render(
        &self,
        frequency: &Signal,
        phase_mod: Option<&Signal>,
        length: usize,
        sample_rate: f64,
    ) -> Result<Signal> {
        validate_render_args(length, sample_rate)?;
        let shape = output_shape(frequency.shape(), phase_mod.map(Signal::shape), length)?;
        let frequency = frequency.broadcast_to(&shape)?;
        let phase_mod = phase_mod.map(|pm| pm.broadcast_to(&shape)).transpose()?;

        let mut data = Vec::with_capacity(frequency.len());
        for (lane, freq) in frequency.lanes().enumerate() {
            let offsets = phase_mod.as_ref().and_then(|pm| pm.lane(lane));
            let mut phase = 0.0;
            for (i, &f) in freq.iter().enumerate() {
                phase += f / sample_rate;
                let modulated = match offsets {
                    Some(pm) => phase + pm[i],
                    None => phase,
                };
                data.push(self.waveform(modulated));
            }
        }

        Signal::from_vec(shape, data)
    }
}

/// Shape of an oscillator render, before any sample is computed
pub(crate) fn output_shape(
    frequency: &[usize],
    phase_mod: Option<&[usize]>,
    length: usize,
) -> Result<Shape> {
    let time_axis = [length];
    let mut shapes = vec![frequency, &time_axis[..]];
    shapes.extend(phase_mod);
    let shape = broadcast_shape(&shapes)?;

    // Inputs may not stretch the time axis beyond the requested length
    if shape.last() != Some(&length) {
        return Err(SynthError::IncompatibleShape {
            left: frequency.to_vec(),
            right: time_axis.to_vec(),
        });
    }
    Ok(shape)
}

pub(crate) fn validate_render_args(length: usize, sample_rate: f64) -> Result<()> {
    if length == 0 {
        return Err(SynthError::InvalidParameter(
            "length must be greater than zero".into(),
        ));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(SynthError::InvalidParameter(format!(
            "sample rate must be positive, got {}",
            sample_rate
        )));
    }
    Ok(())
}

/// Sinusoid: `sin(2π·phase)`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sine;

impl Sine {
    pub fn new() -> Self {
        Self
    }
}

impl Oscillator for Sine {
    fn waveform(&self, phase: f64) -> f64 {
        libm::sin(TAU * phase.rem_euclid(1.0))
    }

    fn type_id(&self) -> &'static str {
        "sine"
    }
}

/// Triangle, starting at 0 and peaking at a quarter cycle like the sinusoid
#[derive(Debug, Clone, Copy, Default)]
pub struct Triangle;

impl Triangle {
    pub fn new() -> Self {
        Self
    }
}

impl Oscillator for Triangle {
    fn waveform(&self, phase: f64) -> f64 {
        let p = (phase + 0.25).rem_euclid(1.0);
        1.0 - 4.0 * (p - 0.5).abs()
    }

    fn type_id(&self) -> &'static str {
        "triangle"
    }
}

/// Rising sawtooth from -1 to 1
#[derive(Debug, Clone, Copy, Default)]
pub struct Saw;

impl Saw {
    pub fn new() -> Self {
        Self
    }
}

impl Oscillator for Saw {
    fn waveform(&self, phase: f64) -> f64 {
        2.0 * phase.rem_euclid(1.0) - 1.0
    }

    fn type_id(&self) -> &'static str {
        "saw"
    }
}

/// Pulse wave, high for the first `pulse_width` of each cycle
#[derive(Debug, Clone, Copy)]
pub struct Square {
    pulse_width: f64,
}

impl Square {
    pub fn new(pulse_width: f64) -> Self {
        Self {
            pulse_width: pulse_width.clamp(0.05, 0.95),
        }
    }

    pub fn pulse_width(&self) -> f64 {
        self.pulse_width
    }
}

impl Default for Square {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Oscillator for Square {
    fn waveform(&self, phase: f64) -> f64 {
        if phase.rem_euclid(1.0) < self.pulse_width {
            1.0
        } else {
            -1.0
        }
    }

    fn type_id(&self) -> &'static str {
        "square"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sine_frequency() {
        // 100 Hz at 1 kHz: one period every 10 samples
        let out = Sine
            .render(&Signal::scalar(100.0), None, 1000, 1000.0)
            .unwrap();
        assert_eq!(out.shape(), &[1000]);

        let crossings = out
            .as_slice()
            .windows(2)
            .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
            .count();
        assert!((99..=101).contains(&crossings));
    }

    #[test]
    fn test_first_sample_carries_one_increment() {
        let out = Sine.render(&Signal::scalar(250.0), None, 4, 1000.0).unwrap();
        // Phases 0.25, 0.5, 0.75, 1.0
        assert_abs_diff_eq!(out.as_slice()[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.as_slice()[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.as_slice()[2], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.as_slice()[3], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let freq = Signal::from_vec(vec![3, 1], vec![110.0, 220.0, 440.0]).unwrap();
        let pm = Signal::from_fn(vec![3, 64], |i| (i as f64 * 0.01).sin());
        let a = Sine.render(&freq, Some(&pm), 64, 44100.0).unwrap();
        let b = Sine.render(&freq, Some(&pm), 64, 44100.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prefix_consistent() {
        let freq = Signal::scalar(440.0);
        let short = Sine.render(&freq, None, 128, 44100.0).unwrap();
        let long = Sine.render(&freq, None, 256, 44100.0).unwrap();
        assert_eq!(short.as_slice(), &long.as_slice()[..128]);
    }

    #[test]
    fn test_batched_frequency() {
        let freq = Signal::from_vec(vec![2, 1], vec![100.0, 200.0]).unwrap();
        let out = Saw.render(&freq, None, 10, 1000.0).unwrap();
        assert_eq!(out.shape(), &[2, 10]);

        // Each row integrates its own frequency
        let row0 = Saw.render(&Signal::scalar(100.0), None, 10, 1000.0).unwrap();
        let row1 = Saw.render(&Signal::scalar(200.0), None, 10, 1000.0).unwrap();
        assert_eq!(out.lane(0).unwrap(), row0.as_slice());
        assert_eq!(out.lane(1).unwrap(), row1.as_slice());
    }

    #[test]
    fn test_time_varying_frequency() {
        // 0 Hz for two samples, then 250 Hz
        let freq = Signal::from_samples(vec![0.0, 0.0, 250.0, 250.0]);
        let out = Sine.render(&freq, None, 4, 1000.0).unwrap();
        assert_abs_diff_eq!(out.as_slice()[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.as_slice()[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.as_slice()[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.as_slice()[3], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_phase_mod_offsets_phase() {
        let freq = Signal::scalar(0.0);
        let pm = Signal::scalar(0.25);
        let out = Sine.render(&freq, Some(&pm), 3, 1000.0).unwrap();
        for &x in out.as_slice() {
            assert_abs_diff_eq!(x, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_phase_mod_matches_absent() {
        let freq = Signal::scalar(330.0);
        let plain = Sine.render(&freq, None, 100, 44100.0).unwrap();
        let modded = Sine
            .render(&freq, Some(&Signal::zeros(vec![100])), 100, 44100.0)
            .unwrap();
        assert_eq!(plain, modded);
    }

    #[test]
    fn test_incompatible_shapes() {
        let freq = Signal::from_samples(vec![1.0, 2.0, 3.0]);
        let result = Sine.render(&freq, None, 4, 1000.0);
        assert!(matches!(result, Err(SynthError::IncompatibleShape { .. })));

        // A longer time axis cannot be squeezed into length 1
        let result = Sine.render(&freq, None, 1, 1000.0);
        assert!(matches!(result, Err(SynthError::IncompatibleShape { .. })));

        let pm = Signal::zeros(vec![3, 5]);
        let result = Sine.render(&Signal::scalar(1.0), Some(&pm), 4, 1000.0);
        assert!(matches!(result, Err(SynthError::IncompatibleShape { .. })));
    }

    #[test]
    fn test_invalid_arguments() {
        let freq = Signal::scalar(1.0);
        assert!(matches!(
            Sine.render(&freq, None, 0, 1000.0),
            Err(SynthError::InvalidParameter(_))
        ));
        assert!(matches!(
            Sine.render(&freq, None, 10, 0.0),
            Err(SynthError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_waveform_shapes() {
        assert_abs_diff_eq!(Triangle.waveform(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Triangle.waveform(0.25), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Triangle.waveform(0.75), -1.0, epsilon = 1e-12);

        assert_abs_diff_eq!(Saw.waveform(0.0), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Saw.waveform(0.5), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Saw.waveform(-0.25), 0.5, epsilon = 1e-12);

        let pulse = Square::new(0.25);
        assert_eq!(pulse.waveform(0.1), 1.0);
        assert_eq!(pulse.waveform(0.3), -1.0);
        assert_eq!(Square::new(2.0).pulse_width(), 0.95);
    }

    #[test]
    fn test_trait_object() {
        let oscillators: Vec<Box<dyn Oscillator>> = vec![
            Box::new(Sine),
            Box::new(Triangle),
            Box::new(Saw),
            Box::new(Square::default()),
        ];
        for osc in &oscillators {
            let out = osc.render(&Signal::scalar(10.0), None, 32, 1000.0).unwrap();
            assert!(out.as_slice().iter().all(|x| x.abs() <= 1.0));
        }
    }
}
