//! Window energy: one loudness value per closed window.

/// Euclidean norm (root of the sum of squares) of a window.
///
/// Callers only pass windows returned by
/// [`SampleAccumulator::drain_if_full`](crate::SampleAccumulator::drain_if_full),
/// which are never empty.
pub fn energy(samples: &[f32]) -> f32 {
    debug_assert!(!samples.is_empty(), "energy of an empty window");
    // Accumulate in f64: a one second window at 48kHz sums 48000 squares.
    let sum: f64 = samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
    sum.sqrt() as f32
}
