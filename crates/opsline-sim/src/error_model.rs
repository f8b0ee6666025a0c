/*
[INPUT]:  Configured error rate and the task's RNG
[OUTPUT]: Per-item decision whether a simulated classification error occurs
[POS]:    Probability layer - the jittered margin comparison
[UPDATE]: When the error decision semantics change (they should not)
*/

use rand::Rng;

/// Symmetric jitter applied to the configured rate on every evaluation.
pub const RATE_JITTER: f64 = 0.05;

/// Decide whether a simulated classification error occurs.
///
/// This is a margin comparison, `rate + jitter >= threshold`, with independent
/// uniform draws for jitter and threshold - deliberately NOT a plain
/// `random() < rate` Bernoulli trial. The divergence between observed and
/// configured rates is a user-visible property of the simulator; keep the
/// comparison as-is. A rate of zero disables the model entirely.
pub fn causes_error<R: Rng>(rng: &mut R, error_rate: f64) -> bool {
    if error_rate <= 0.0 {
        return false;
    }
    let jitter = rng.gen_range(-RATE_JITTER..=RATE_JITTER);
    let threshold = rng.gen_range(0.0..1.0);
    error_rate + jitter >= threshold
}
