//! FM Synthesizer
//!
//! An [`FmSynth`] owns a fixed set of operators (oscillator + envelope pairs)
//! and a validated [`ModulationGraph`]. Each render call:
//!
//! 1. Checks parameter counts, resolves every output shape (the mix
//!    included) and checks the gate against every envelope's gate mode, so
//!    no sample is computed for a call that will fail.
//! 2. Renders each operator's envelope from the shared gate.
//! 3. Walks the cached topological order. An operator's phase modulation is
//!    the sum of its sources' contributions, and its own contribution is
//!    `oscillator × envelope × gain`.
//! 4. Mixes contributions according to the [`MixPolicy`].
//!
//! ```text
//!   op 2 ──► op 1 ──► op 0 ──► mix
//!                      ▲
//!   op 3 ──────────────┘
//! ```

use crate::envelope::{envelope_shape, Adsr, AdsrParams};
use crate::error::{Result, SynthError};
use crate::graph::{ModulationEdge, ModulationGraph};
use crate::oscillator::{output_shape, validate_render_args, Oscillator};
use crate::signal::{broadcast_shape, Shape, Signal};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Which operator contributions reach the final output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixPolicy {
    /// Only operators that modulate nothing are heard
    #[default]
    CarriersOnly,
    /// Every operator is heard, modulators included
    AllOperators,
}

/// One oscillator + envelope pair of an FM synth
pub struct Operator {
    oscillator: Box<dyn Oscillator>,
    envelope: Adsr,
}

impl Operator {
    pub fn new<O: Oscillator + 'static>(oscillator: O) -> Self {
        Self::from_boxed(Box::new(oscillator))
    }

    pub fn from_boxed(oscillator: Box<dyn Oscillator>) -> Self {
        Self {
            oscillator,
            envelope: Adsr::new(),
        }
    }

    pub fn with_envelope(mut self, envelope: Adsr) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn oscillator(&self) -> &dyn Oscillator {
        self.oscillator.as_ref()
    }

    pub fn envelope(&self) -> &Adsr {
        &self.envelope
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("oscillator", &self.oscillator.type_id())
            .field("envelope", &self.envelope)
            .finish()
    }
}

/// Per-call parameters of one operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorParams {
    /// Tuning ratio relative to the fundamental frequency
    pub ratio: f64,
    /// Output gain applied after the envelope
    pub gain: f64,
    pub envelope: AdsrParams,
}

impl OperatorParams {
    /// Parameters with unity gain
    pub fn new(ratio: f64, envelope: AdsrParams) -> Self {
        Self {
            ratio,
            gain: 1.0,
            envelope,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self::new(1.0, AdsrParams::default())
    }
}

/// Frequency-modulation synthesizer over a fixed routing graph
pub struct FmSynth {
    operators: Vec<Operator>,
    graph: ModulationGraph,
    mix: MixPolicy,
    sample_rate: f64,
}

impl FmSynth {
    /// Build a synth. `routing` holds `(source, destination)` pairs and is
    /// validated once here; the evaluation order is reused by every render.
    pub fn new<I, E>(operators: Vec<Operator>, routing: I, sample_rate: f64) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<ModulationEdge>,
    {
        validate_render_args(1, sample_rate)?;
        if operators.is_empty() {
            return Err(SynthError::InvalidParameter(
                "a synth needs at least one operator".into(),
            ));
        }

        let graph = ModulationGraph::new(operators.len(), routing)?;
        Ok(Self {
            operators,
            graph,
            mix: MixPolicy::default(),
            sample_rate,
        })
    }

    pub fn with_mix_policy(mut self, mix: MixPolicy) -> Self {
        self.mix = mix;
        self
    }

    pub fn mix_policy(&self) -> MixPolicy {
        self.mix
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn graph(&self) -> &ModulationGraph {
        &self.graph
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// Render the mixed output.
    ///
    /// `gate` defines the time axis (its last axis). `frequency` is the
    /// fundamental in Hz and may be constant per lane (trailing size-1 axis)
    /// or vary per sample. `params` holds one entry per operator.
    pub fn render(
        &self,
        gate: &Signal,
        frequency: &Signal,
        params: &[OperatorParams],
    ) -> Result<Signal> {
        let contributions = self.render_operators(gate, frequency, params)?;

        let mixed: Vec<&Signal> = match self.mix {
            MixPolicy::CarriersOnly => self
                .graph
                .carriers()
                .iter()
                .map(|&n| &contributions[n])
                .collect(),
            MixPolicy::AllOperators => contributions.iter().collect(),
        };

        Signal::sum(mixed)?
            .ok_or_else(|| SynthError::InvalidParameter("no operator reaches the mix".into()))
    }

    /// Render every operator's contribution (post-envelope, post-gain),
    /// indexed by operator.
    pub fn render_operators(
        &self,
        gate: &Signal,
        frequency: &Signal,
        params: &[OperatorParams],
    ) -> Result<Vec<Signal>> {
        self.plan(gate, frequency, params)?;

        let length = gate.time_len();
        trace!(
            operators = self.operators.len(),
            length,
            shape = ?gate.shape(),
            "rendering fm synth"
        );

        let envelopes = self
            .operators
            .iter()
            .zip(params)
            .map(|(op, p)| {
                op.envelope
                    .render_checked_gate(gate, &p.envelope, self.sample_rate)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut contributions: Vec<Option<Signal>> = vec![None; self.operators.len()];
        for &n in self.graph.order() {
            let phase_mod = Signal::sum(
                self.graph
                    .sources(n)
                    .iter()
                    .filter_map(|&s| contributions[s].as_ref()),
            )?;

            let p = &params[n];
            let raw = self.operators[n].oscillator.render(
                &frequency.scale(p.ratio),
                phase_mod.as_ref(),
                length,
                self.sample_rate,
            )?;
            contributions[n] = Some(raw.mul(&envelopes[n])?.scale(p.gain));
        }

        contributions
            .into_iter()
            .enumerate()
            .map(|(n, c)| {
                c.ok_or_else(|| {
                    SynthError::InvalidParameter(format!("operator {} was not rendered", n))
                })
            })
            .collect()
    }

    /// Resolve every operator's contribution shape without rendering
    fn plan(
        &self,
        gate: &Signal,
        frequency: &Signal,
        params: &[OperatorParams],
    ) -> Result<Vec<Shape>> {
        if params.len() != self.operators.len() {
            return Err(SynthError::InvalidParameter(format!(
                "expected parameters for {} operators, got {}",
                self.operators.len(),
                params.len()
            )));
        }

        let length = gate.time_len();
        validate_render_args(length, self.sample_rate)?;

        let mut shapes: Vec<Shape> = vec![Vec::new(); self.operators.len()];
        for &n in self.graph.order() {
            let envelope = envelope_shape(gate.shape(), &params[n].envelope)?;
            let phase_mod = match self.graph.sources(n) {
                [] => None,
                sources => Some(broadcast_shape(sources.iter().map(|&s| &shapes[s]))?),
            };
            let oscillator = output_shape(frequency.shape(), phase_mod.as_deref(), length)?;
            shapes[n] = broadcast_shape([oscillator, envelope])?;
        }

        let mixed: Vec<&Shape> = match self.mix {
            MixPolicy::CarriersOnly => self.graph.carriers().iter().map(|&n| &shapes[n]).collect(),
            MixPolicy::AllOperators => shapes.iter().collect(),
        };
        broadcast_shape(mixed)?;

        for op in &self.operators {
            op.envelope.check_gate(gate)?;
        }

        Ok(shapes)
    }
}

impl fmt::Debug for FmSynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmSynth")
            .field("operators", &self.operators)
            .field("graph", &self.graph)
            .field("mix", &self.mix)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
