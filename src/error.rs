//! Error types shared by every generator and the FM synth container.

use std::fmt;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, SynthError>;

/// Error types for signal generation and synth construction
#[derive(Debug, Clone, PartialEq)]
pub enum SynthError {
    /// Two shapes violate the trailing-alignment broadcast rule
    IncompatibleShape { left: Vec<usize>, right: Vec<usize> },
    /// A gate sample is neither 0 nor 1 while the envelope runs in strict mode
    InvalidGate { index: usize, value: f64 },
    /// A modulation edge references an operator that does not exist
    InvalidRouting {
        source: usize,
        destination: usize,
        operators: usize,
    },
    /// The modulation graph contains a cycle (self-loops included)
    CyclicRouting { operators: Vec<usize> },
    /// A preset names a waveform the registry does not know
    UnknownWaveform(String),
    /// A scalar argument or parameter record is malformed
    InvalidParameter(String),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::IncompatibleShape { left, right } => {
                write!(f, "Incompatible shapes {:?} and {:?}", left, right)
            }
            SynthError::InvalidGate { index, value } => {
                write!(f, "Invalid gate value {} at sample {}", value, index)
            }
            SynthError::InvalidRouting {
                source,
                destination,
                operators,
            } => write!(
                f,
                "Invalid routing {} -> {} for a synth with {} operators",
                source, destination, operators
            ),
            SynthError::CyclicRouting { operators } => {
                write!(f, "Cyclic routing involving operators {:?}", operators)
            }
            SynthError::UnknownWaveform(name) => write!(f, "Unknown waveform: {}", name),
            SynthError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for SynthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SynthError::IncompatibleShape {
            left: vec![3],
            right: vec![4],
        };
        assert_eq!(err.to_string(), "Incompatible shapes [3] and [4]");

        let err = SynthError::CyclicRouting {
            operators: vec![0, 1],
        };
        assert_eq!(err.to_string(), "Cyclic routing involving operators [0, 1]");

        let err = SynthError::InvalidRouting {
            source: 2,
            destination: 0,
            operators: 2,
        };
        assert!(err.to_string().contains("2 -> 0"));
    }

    #[test]
    fn test_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&SynthError::InvalidParameter("length".into()));
    }
}
