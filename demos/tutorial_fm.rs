//! Tutorial: FM Synthesis Basics
//!
//! Two sine operators: the modulator's contribution is added to the
//! carrier's phase, creating rich timbres from simple sine waves. The
//! modulator gain acts as the modulation index.
//!
//! Run with: cargo run --example tutorial_fm

use gradrack::prelude::*;

fn rms(samples: &[f64]) -> f64 {
    (samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64).sqrt()
}

/// Count sign changes as a rough brightness measure
fn zero_crossings(samples: &[f64]) -> usize {
    samples
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count()
}

fn main() {
    let sample_rate = 44100.0;
    let length = (sample_rate * 0.5) as usize;

    // Operator 1 modulates operator 0
    let synth = FmSynth::new(
        vec![Operator::new(Sine), Operator::new(Sine)],
        [(1, 0)],
        sample_rate,
    )
    .unwrap();

    println!("=== FM Synthesis Demo ===\n");
    println!("Two operators: Carrier (audible) + Modulator (creates harmonics)\n");

    // Held for 0.4s of the 0.5s block, so the tail shows the release
    let gate = Signal::from_fn(vec![length], |i| {
        if i < (sample_rate * 0.4) as usize {
            1.0
        } else {
            0.0
        }
    });
    let frequency = Signal::scalar(220.0);

    for (name, ratio, index) in [
        ("Pure carrier (no FM)", 1.0, 0.0),
        ("Subtle FM (index ~1)", 1.0, 0.15),
        ("Medium FM (index ~3)", 1.0, 0.5),
        ("Heavy FM (index ~5)", 1.0, 0.8),
        ("Bell (1:√2 ratio)", 1.414, 0.3),
        ("Metallic (1:3.5 ratio)", 3.5, 0.3),
    ] {
        let params = [
            OperatorParams::new(1.0, AdsrParams::new(0.005, 0.2, 0.6, 0.05)),
            OperatorParams::new(ratio, AdsrParams::new(0.0, 0.3, 0.4, 0.05)).with_gain(index),
        ];

        let audio = synth.render(&gate, &frequency, &params).unwrap();
        println!(
            "{:<24} rms {:.3}  zero crossings {}",
            name,
            rms(audio.as_slice()),
            zero_crossings(audio.as_slice())
        );
    }

    // The same patch as a preset
    let def = SynthDef::new("Bell", sample_rate)
        .with_operator(OperatorDef::new("sine").with_envelope(EnvelopeDef::new(0.0, 1.5, 0.0, 0.5)))
        .with_operator(OperatorDef::new("sine").with_ratio(1.414).with_gain(0.3))
        .with_route(1, 0);
    println!("\nPreset:\n{}", def.to_json().unwrap());
}
