//! # Gradrack: Broadcast-Aware Signal Generators and FM Synthesis
//!
//! `gradrack` renders whole blocks of audio from control signals. Every
//! parameter may be a scalar, a per-lane column or a per-sample signal; the
//! inputs are broadcast together before any sample is produced.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Layer 1: Signals** - n-dimensional sample blocks and trailing-axis broadcasting
//! - **Layer 2: Generators** - phase-accumulating oscillators and the ADSR state machine
//! - **Layer 3: FM Synth** - operators wired by a validated, acyclic modulation graph
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gradrack::prelude::*;
//!
//! // Operator 1 modulates operator 0
//! let synth = FmSynth::new(
//!     vec![Operator::new(Sine), Operator::new(Sine)],
//!     [(1, 0)],
//!     44100.0,
//! )
//! .unwrap();
//!
//! // Four voices, one second each
//! let gate = Signal::full(vec![4, 44100], 1.0);
//! let frequency = Signal::from_vec(vec![4, 1], vec![110.0, 220.0, 330.0, 440.0]).unwrap();
//!
//! let params = [
//!     OperatorParams::new(1.0, AdsrParams::new(0.01, 0.3, 0.6, 0.5)),
//!     OperatorParams::new(2.0, AdsrParams::new(0.0, 0.8, 0.0, 0.1)).with_gain(0.7),
//! ];
//!
//! let audio = synth.render(&gate, &frequency, &params).unwrap();
//! assert_eq!(audio.shape(), &[4, 44100]);
//! ```

pub mod envelope;
pub mod error;
pub mod graph;
pub mod oscillator;
pub mod serialize;
pub mod signal;
pub mod synth;

/// Prelude module for convenient imports
pub mod prelude {
    // Layer 1: Signals
    pub use crate::signal::{broadcast_shape, Shape, Signal};

    // Layer 2: Generators
    pub use crate::envelope::{Adsr, AdsrParams, AdsrStage, GateMode};
    pub use crate::oscillator::{Oscillator, Saw, Sine, Square, Triangle};

    // Layer 3: FM Synth
    pub use crate::graph::{ModulationEdge, ModulationGraph, OperatorId};
    pub use crate::synth::{FmSynth, MixPolicy, Operator, OperatorParams};

    // Presets
    pub use crate::serialize::{EnvelopeDef, OperatorDef, SynthDef, WaveformRegistry};

    pub use crate::error::SynthError;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
