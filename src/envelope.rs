//! ADSR Envelope Generator
//!
//! Renders amplitude envelopes from a gate signal with a per-lane state
//! machine. Every lane (each combination of non-time axes) runs its own
//! machine along the time axis; lanes never share state.
//!
//! ```text
//!   Level
//!     1.0 ┐    ╱╲
//!         │   ╱  ╲________
//!     S   │  ╱            ╲
//!     0.0 └─╱──────────────╲──→ Time
//!          Attack Decay Sustain Release
//! ```
//!
//! # Ramps
//!
//! All ramps are **linear** in time:
//!
//! - Attack goes from the level held when the stage was entered to 1.0 over
//!   `attack` seconds.
//! - Decay goes from 1.0 to `sustain` over `decay` seconds.
//! - Release goes from the level held when the stage was entered to 0.0 over
//!   `release` seconds.
//!
//! A stage whose duration is not positive completes within the sample it is
//! entered in, and the unused part of that sample carries into the next
//! stage.
//!
//! # Retrigger
//!
//! A rising gate edge during Decay, Sustain or Release re-enters Attack
//! starting from the *current* level, so the output never jumps.
//!
//! # Gate
//!
//! In [`GateMode::Threshold`] samples below 0.5 are low and the rest high.
//! [`GateMode::Strict`] rejects anything other than exactly 0 or 1 with
//! [`SynthError::InvalidGate`] before rendering.

use crate::error::{Result, SynthError};
use crate::oscillator::validate_render_args;
use crate::signal::{broadcast_shape, Shape, Signal};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Gate level separating low from high in threshold mode
pub const GATE_THRESHOLD: f64 = 0.5;

/// Stage of the envelope state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdsrStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// How gate samples are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// `< 0.5` is low, `>= 0.5` is high
    #[default]
    Threshold,
    /// Only exact 0.0 and 1.0 are accepted
    Strict,
}

/// Timing and level parameters for one envelope
///
/// Each field broadcasts against the gate, so it may be a scalar, a
/// per-lane column such as `(batch, 1)`, or a full per-sample signal.
/// Times are in seconds and clamped to be non-negative; sustain is clamped
/// to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsrParams {
    pub attack: Signal,
    pub decay: Signal,
    pub sustain: Signal,
    pub release: Signal,
}

impl AdsrParams {
    pub fn new(
        attack: impl Into<Signal>,
        decay: impl Into<Signal>,
        sustain: impl Into<Signal>,
        release: impl Into<Signal>,
    ) -> Self {
        Self {
            attack: attack.into(),
            decay: decay.into(),
            sustain: sustain.into(),
            release: release.into(),
        }
    }

    pub fn with_attack(mut self, attack: impl Into<Signal>) -> Self {
        self.attack = attack.into();
        self
    }

    pub fn with_decay(mut self, decay: impl Into<Signal>) -> Self {
        self.decay = decay.into();
        self
    }

    pub fn with_sustain(mut self, sustain: impl Into<Signal>) -> Self {
        self.sustain = sustain.into();
        self
    }

    pub fn with_release(mut self, release: impl Into<Signal>) -> Self {
        self.release = release.into();
        self
    }

    fn shapes(&self) -> [&[usize]; 4] {
        [
            self.attack.shape(),
            self.decay.shape(),
            self.sustain.shape(),
            self.release.shape(),
        ]
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.2)
    }
}

/// Parameter values for one sample of one lane, already clamped
#[derive(Debug, Clone, Copy)]
struct StageTimes {
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,
}

/// Per-lane machine state, alive only during one render call
#[derive(Debug, Clone, Copy)]
struct EnvelopeState {
    stage: AdsrStage,
    level: f64,
    /// Level recorded when the current stage was entered
    start_level: f64,
    /// Seconds since the current stage was entered
    elapsed: f64,
    gate_high: bool,
}

impl EnvelopeState {
    fn new() -> Self {
        Self {
            stage: AdsrStage::Idle,
            level: 0.0,
            start_level: 0.0,
            elapsed: 0.0,
            gate_high: false,
        }
    }

    fn enter(&mut self, stage: AdsrStage) {
        self.stage = stage;
        self.start_level = self.level;
        self.elapsed = 0.0;
    }

    /// Handle gate edges, then advance one sample of `dt` seconds
    fn tick(&mut self, gate_high: bool, times: StageTimes, dt: f64) -> f64 {
        if gate_high && !self.gate_high {
            self.enter(AdsrStage::Attack);
        } else if !gate_high && self.gate_high && self.stage != AdsrStage::Idle {
            self.enter(AdsrStage::Release);
        }
        self.gate_high = gate_high;

        self.advance(times, dt);
        self.level
    }

    fn advance(&mut self, times: StageTimes, dt: f64) {
        self.elapsed += dt;

        // Loops only while zero-length stages hand over leftover time
        loop {
            match self.stage {
                AdsrStage::Idle => {
                    self.level = 0.0;
                    self.elapsed = 0.0;
                    return;
                }
                AdsrStage::Attack => {
                    if self.elapsed >= times.attack {
                        let leftover = self.elapsed - times.attack;
                        self.level = 1.0;
                        self.enter(AdsrStage::Decay);
                        self.elapsed = leftover;
                        continue;
                    }
                    let progress = self.elapsed / times.attack;
                    self.level = self.start_level + (1.0 - self.start_level) * progress;
                    return;
                }
                AdsrStage::Decay => {
                    if self.elapsed >= times.decay {
                        let leftover = self.elapsed - times.decay;
                        self.level = times.sustain;
                        self.enter(AdsrStage::Sustain);
                        self.elapsed = leftover;
                        continue;
                    }
                    let progress = self.elapsed / times.decay;
                    self.level = 1.0 + (times.sustain - 1.0) * progress;
                    return;
                }
                AdsrStage::Sustain => {
                    self.level = times.sustain;
                    return;
                }
                AdsrStage::Release => {
                    if self.elapsed >= times.release {
                        self.level = 0.0;
                        self.enter(AdsrStage::Idle);
                        return;
                    }
                    let progress = self.elapsed / times.release;
                    self.level = self.start_level * (1.0 - progress);
                    return;
                }
            }
        }
    }
}

/// Shape of an envelope render: the gate and all parameters broadcast
/// together, with the gate's time axis unchanged
pub(crate) fn envelope_shape(gate: &[usize], params: &AdsrParams) -> Result<Shape> {
    let mut shapes = vec![gate];
    shapes.extend(params.shapes());
    let shape = broadcast_shape(&shapes)?;

    // A rank-0 gate is one sample long
    if shape.last().copied().unwrap_or(1) != gate.last().copied().unwrap_or(1) {
        return Err(SynthError::IncompatibleShape {
            left: gate.to_vec(),
            right: shape,
        });
    }
    Ok(shape)
}

/// Stateless ADSR envelope generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adsr {
    gate_mode: GateMode,
}

impl Adsr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope that rejects gate samples other than 0 and 1
    pub fn strict() -> Self {
        Self {
            gate_mode: GateMode::Strict,
        }
    }

    pub fn with_gate_mode(mut self, gate_mode: GateMode) -> Self {
        self.gate_mode = gate_mode;
        self
    }

    pub fn gate_mode(&self) -> GateMode {
        self.gate_mode
    }

    /// Render an envelope with the joint broadcast shape of the gate and
    /// every parameter. The last axis of `gate` is time.
    pub fn render(&self, gate: &Signal, params: &AdsrParams, sample_rate: f64) -> Result<Signal> {
        self.run(gate, params, sample_rate, |_| {})
    }

    /// Render the envelope and also return the stage each sample ended in
    pub fn render_stages(
        &self,
        gate: &Signal,
        params: &AdsrParams,
        sample_rate: f64,
    ) -> Result<(Signal, Vec<AdsrStage>)> {
        let mut stages = Vec::with_capacity(gate.len());
        let levels = self.run(gate, params, sample_rate, |stage| stages.push(stage))?;
        Ok((levels, stages))
    }

    fn run(
        &self,
        gate: &Signal,
        params: &AdsrParams,
        sample_rate: f64,
        on_stage: impl FnMut(AdsrStage),
    ) -> Result<Signal> {
        validate_render_args(gate.time_len(), sample_rate)?;
        let shape = envelope_shape(gate.shape(), params)?;
        self.check_gate(gate)?;
        self.run_lanes(gate, params, &shape, sample_rate, on_stage)
    }

    /// Render for a caller that has already passed `gate` through
    /// [`Adsr::check_gate`]
    pub(crate) fn render_checked_gate(
        &self,
        gate: &Signal,
        params: &AdsrParams,
        sample_rate: f64,
    ) -> Result<Signal> {
        validate_render_args(gate.time_len(), sample_rate)?;
        let shape = envelope_shape(gate.shape(), params)?;
        self.run_lanes(gate, params, &shape, sample_rate, |_| {})
    }

    fn run_lanes(
        &self,
        gate: &Signal,
        params: &AdsrParams,
        shape: &[usize],
        sample_rate: f64,
        mut on_stage: impl FnMut(AdsrStage),
    ) -> Result<Signal> {
        let gate = gate.broadcast_to(shape)?;
        let attack = params.attack.broadcast_to(shape)?;
        let decay = params.decay.broadcast_to(shape)?;
        let sustain = params.sustain.broadcast_to(shape)?;
        let release = params.release.broadcast_to(shape)?;

        let dt = 1.0 / sample_rate;
        let mut data = Vec::with_capacity(gate.len());

        for (lane, gate_lane) in gate.lanes().enumerate() {
            let base = lane * gate_lane.len();
            let mut state = EnvelopeState::new();

            for (i, &g) in gate_lane.iter().enumerate() {
                let at = base + i;
                let times = StageTimes {
                    attack: attack.as_slice()[at].max(0.0),
                    decay: decay.as_slice()[at].max(0.0),
                    sustain: sustain.as_slice()[at].clamp(0.0, 1.0),
                    release: release.as_slice()[at].max(0.0),
                };
                data.push(state.tick(g >= GATE_THRESHOLD, times, dt));
                on_stage(state.stage);
            }
        }

        Signal::from_vec(shape.to_vec(), data)
    }

    pub(crate) fn check_gate(&self, gate: &Signal) -> Result<()> {
        match self.gate_mode {
            GateMode::Strict => {
                if let Some((index, &value)) = gate
                    .as_slice()
                    .iter()
                    .enumerate()
                    .find(|&(_, &g)| g != 0.0 && g != 1.0)
                {
                    return Err(SynthError::InvalidGate { index, value });
                }
            }
            GateMode::Threshold => {
                if let Some(value) = gate.as_slice().iter().find(|&&g| g != 0.0 && g != 1.0) {
                    warn!(value, "non-binary gate sample, thresholding at 0.5");
                }
            }
        }
        Ok(())
    }
}
