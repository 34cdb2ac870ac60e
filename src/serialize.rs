//! Serialization and Presets
//!
//! This module provides serializable synth definitions and a waveform
//! registry, so FM patches can be stored as JSON and rebuilt into a
//! validated [`FmSynth`].
//!
//! ```json
//! {
//!   "version": 1,
//!   "name": "Bell",
//!   "sample_rate": 44100.0,
//!   "operators": [
//!     { "waveform": "sine", "ratio": 1.0, "envelope": { "attack": 0.0, "decay": 1.5, "sustain": 0.0, "release": 0.5 } },
//!     { "waveform": "sine", "ratio": 3.5, "gain": 0.6 }
//!   ],
//!   "routing": [[1, 0]]
//! }
//! ```

use crate::envelope::{Adsr, AdsrParams, GateMode};
use crate::error::{Result, SynthError};
use crate::oscillator::{Oscillator, Saw, Sine, Square, Triangle};
use crate::synth::{FmSynth, MixPolicy, Operator, OperatorParams};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current preset schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Serializable FM synth definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthDef {
    /// Schema version for forward compatibility
    pub version: u32,

    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub sample_rate: f64,

    /// Operators, addressed by position
    pub operators: Vec<OperatorDef>,

    /// Modulation edges as `(source, destination)` pairs
    #[serde(default)]
    pub routing: Vec<(usize, usize)>,

    #[serde(default)]
    pub mix: MixPolicy,
}

impl SynthDef {
    /// Create a new empty definition
    pub fn new(name: impl Into<String>, sample_rate: f64) -> Self {
        Self {
            version: SCHEMA_VERSION,
            name: name.into(),
            description: None,
            sample_rate,
            operators: vec![],
            routing: vec![],
            mix: MixPolicy::default(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_operator(mut self, operator: OperatorDef) -> Self {
        self.operators.push(operator);
        self
    }

    /// Route `source` into `destination`'s phase modulation
    pub fn with_route(mut self, source: usize, destination: usize) -> Self {
        self.routing.push((source, destination));
        self
    }

    pub fn with_mix(mut self, mix: MixPolicy) -> Self {
        self.mix = mix;
        self
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Instantiate the oscillators and validate the routing
    pub fn build(&self, registry: &WaveformRegistry) -> Result<FmSynth> {
        if self.version > SCHEMA_VERSION {
            return Err(SynthError::InvalidParameter(format!(
                "unsupported preset version {}",
                self.version
            )));
        }

        let operators = self
            .operators
            .iter()
            .map(|def| -> Result<Operator> {
                let oscillator = registry
                    .instantiate(&def.waveform)
                    .ok_or_else(|| SynthError::UnknownWaveform(def.waveform.clone()))?;
                Ok(Operator::from_boxed(oscillator)
                    .with_envelope(Adsr::new().with_gate_mode(def.gate_mode)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FmSynth::new(operators, self.routing.iter().copied(), self.sample_rate)?
            .with_mix_policy(self.mix))
    }

    /// Per-operator render parameters stored in the preset
    pub fn operator_params(&self) -> Vec<OperatorParams> {
        self.operators.iter().map(OperatorDef::params).collect()
    }
}

/// Serializable operator definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    /// Registered waveform identifier
    pub waveform: String,

    #[serde(default = "unity")]
    pub ratio: f64,

    #[serde(default = "unity")]
    pub gain: f64,

    #[serde(default)]
    pub envelope: EnvelopeDef,

    #[serde(default)]
    pub gate_mode: GateMode,
}

fn unity() -> f64 {
    1.0
}

impl OperatorDef {
    pub fn new(waveform: impl Into<String>) -> Self {
        Self {
            waveform: waveform.into(),
            ratio: 1.0,
            gain: 1.0,
            envelope: EnvelopeDef::default(),
            gate_mode: GateMode::default(),
        }
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_envelope(mut self, envelope: EnvelopeDef) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn params(&self) -> OperatorParams {
        OperatorParams::new(self.ratio, self.envelope.into()).with_gain(self.gain)
    }
}

/// Scalar ADSR settings stored in a preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeDef {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl EnvelopeDef {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for EnvelopeDef {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.2)
    }
}

impl From<EnvelopeDef> for AdsrParams {
    fn from(def: EnvelopeDef) -> Self {
        AdsrParams::new(def.attack, def.decay, def.sustain, def.release)
    }
}

/// Waveform factory function type
pub type WaveformFactory = Box<dyn Fn() -> Box<dyn Oscillator> + Send + Sync>;

/// Registry of waveforms a preset may name
pub struct WaveformRegistry {
    factories: HashMap<String, WaveformFactory>,
}

impl WaveformRegistry {
    /// Create a registry with the built-in waveforms
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register_factory("sine", || Box::new(Sine));
        self.register_factory("triangle", || Box::new(Triangle));
        self.register_factory("saw", || Box::new(Saw));
        self.register_factory("square", || Box::new(Square::default()));
    }

    /// Register or replace a waveform factory
    pub fn register_factory<F>(&mut self, type_id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Oscillator> + Send + Sync + 'static,
    {
        self.factories.insert(type_id.to_string(), Box::new(factory));
    }

    /// Instantiate a waveform by type ID
    pub fn instantiate(&self, type_id: &str) -> Option<Box<dyn Oscillator>> {
        self.factories.get(type_id).map(|f| f())
    }

    /// Registered type IDs, sorted
    pub fn waveforms(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for WaveformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;

    fn bell() -> SynthDef {
        SynthDef::new("Bell", 8000.0)
            .with_description("Two-operator bell")
            .with_operator(
                OperatorDef::new("sine").with_envelope(EnvelopeDef::new(0.0, 1.5, 0.0, 0.5)),
            )
            .with_operator(OperatorDef::new("sine").with_ratio(3.5).with_gain(0.6))
            .with_route(1, 0)
    }

    #[test]
    fn test_json_roundtrip() {
        let def = bell();
        let json = def.to_json().unwrap();
        assert!(json.contains("\"carriers_only\""));
        let restored = SynthDef::from_json(&json).unwrap();
        assert_eq!(restored, def);
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let json = r#"{
            "version": 1,
            "name": "Minimal",
            "sample_rate": 44100.0,
            "operators": [{ "waveform": "saw" }]
        }"#;
        let def = SynthDef::from_json(json).unwrap();
        assert_eq!(def.mix, MixPolicy::CarriersOnly);
        assert!(def.routing.is_empty());
        assert_eq!(def.operators[0].ratio, 1.0);
        assert_eq!(def.operators[0].gain, 1.0);
        assert_eq!(def.operators[0].gate_mode, GateMode::Threshold);
        assert_eq!(def.operators[0].envelope, EnvelopeDef::default());
    }

    #[test]
    fn test_build_and_render() {
        let def = bell();
        let synth = def.build(&WaveformRegistry::new()).unwrap();
        assert_eq!(synth.operator_count(), 2);
        assert_eq!(synth.graph().carriers(), &[0]);
        assert_eq!(synth.operators()[1].oscillator().type_id(), "sine");

        let params = def.operator_params();
        assert_eq!(params[1].ratio, 3.5);
        assert_eq!(params[1].gain, 0.6);

        let gate = Signal::from_samples(vec![1.0; 64]);
        let out = synth.render(&gate, &Signal::scalar(440.0), &params).unwrap();
        assert_eq!(out.shape(), &[64]);
    }

    #[test]
    fn test_build_rejects_unknown_waveform() {
        let def = SynthDef::new("Odd", 44100.0).with_operator(OperatorDef::new("wavetable"));
        let err = def.build(&WaveformRegistry::new()).unwrap_err();
        assert_eq!(err, SynthError::UnknownWaveform("wavetable".into()));
    }

    #[test]
    fn test_build_rejects_cyclic_routing() {
        let def = bell().with_route(0, 1);
        assert!(matches!(
            def.build(&WaveformRegistry::new()),
            Err(SynthError::CyclicRouting { .. })
        ));
    }

    #[test]
    fn test_build_rejects_future_version() {
        let mut def = bell();
        def.version = SCHEMA_VERSION + 1;
        assert!(matches!(
            def.build(&WaveformRegistry::new()),
            Err(SynthError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_registry() {
        let mut registry = WaveformRegistry::new();
        assert_eq!(registry.waveforms(), vec!["saw", "sine", "square", "triangle"]);

        registry.register_factory("narrow", || Box::new(Square::new(0.1)));
        let osc = registry.instantiate("narrow").unwrap();
        assert_eq!(osc.type_id(), "square");
        assert_eq!(osc.waveform(0.05), 1.0);
        assert_eq!(osc.waveform(0.2), -1.0);
        assert!(registry.instantiate("missing").is_none());
    }
}
