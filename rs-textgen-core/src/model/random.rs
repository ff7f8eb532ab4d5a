use rand::{Rng, RngCore};

/// Source of uniform draws in `[0, 1)`.
///
/// Every sampling decision (start state, next token, latent state, EM
/// initialization) goes through an injected source, never a global one.
///
/// Implemented for:
/// - every [`rand::RngCore`] (`rand::rng()`, `StdRng::seed_from_u64(..)`, ...)
/// - [`FnSource`], wrapping a closure
/// - [`SequenceSource`], replaying fixed values
pub trait RandomSource {
	fn next_f64(&mut self) -> f64;
}

impl<R: RngCore> RandomSource for R {
	fn next_f64(&mut self) -> f64 {
		self.random::<f64>()
	}
}

/// Adapts a closure returning uniform values into a [`RandomSource`].
pub struct FnSource<F>(pub F);

impl<F: FnMut() -> f64> RandomSource for FnSource<F> {
	fn next_f64(&mut self) -> f64 {
		(self.0)()
	}
}

/// Replays a fixed list of draws, cycling when exhausted.
///
/// An empty list always yields `0.0`.
#[derive(Clone, Debug)]
pub struct SequenceSource {
	values: Vec<f64>,
	position: usize,
}

impl SequenceSource {
	pub fn new(values: Vec<f64>) -> Self {
		Self { values, position: 0 }
	}
}

impl RandomSource for SequenceSource {
	fn next_f64(&mut self) -> f64 {
		if self.values.is_empty() {
			return 0.0;
		}
		let value = self.values[self.position % self.values.len()];
		self.position += 1;
		value
	}
}

/// Draws from `rng`, mapping anything outside `[0, 1)` (or NaN) back into range.
pub(crate) fn uniform(rng: &mut dyn RandomSource) -> f64 {
	let value = rng.next_f64();
	if value.is_nan() || value < 0.0 {
		0.0
	} else if value >= 1.0 {
		1.0 - f64::EPSILON
	} else {
		value
	}
}

/// Uniformly picks an index in `0..len`. Returns `None` if `len == 0`.
pub(crate) fn choose_index(len: usize, rng: &mut dyn RandomSource) -> Option<usize> {
	if len == 0 {
		return None;
	}
	Some(((uniform(rng) * len as f64) as usize).min(len - 1))
}

/// Inverse-CDF sampling over non-negative, not necessarily normalized weights.
///
/// Returns `None` if the weights are empty or sum to zero.
pub(crate) fn sample_index(weights: &[f64], rng: &mut dyn RandomSource) -> Option<usize> {
	let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
	if total <= 0.0 {
		return None;
	}

	let target = uniform(rng) * total;
	let mut cumulative = 0.0;
	let mut last = None;
	for (index, &weight) in weights.iter().enumerate() {
		if !(weight.is_finite() && weight > 0.0) {
			continue;
		}
		cumulative += weight;
		if target < cumulative {
			return Some(index);
		}
		last = Some(index);
	}

	// Rounding left the target past the last bucket
	last
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	#[test]
	fn sequence_source_cycles() {
		let mut source = SequenceSource::new(vec![0.1, 0.7]);
		assert_eq!(source.next_f64(), 0.1);
		assert_eq!(source.next_f64(), 0.7);
		assert_eq!(source.next_f64(), 0.1);
	}

	#[test]
	fn closures_and_rngs_are_sources() {
		let mut counter = 0.0;
		let mut source = FnSource(move || {
			counter += 0.25;
			counter
		});
		assert_eq!(source.next_f64(), 0.25);

		let mut rng = StdRng::seed_from_u64(7);
		let value = (&mut rng as &mut dyn RandomSource).next_f64();
		assert!((0.0..1.0).contains(&value));
	}

	#[test]
	fn sample_index_follows_cumulative_weights() {
		let weights = [2.0, 0.0, 1.0, 1.0];
		assert_eq!(sample_index(&weights, &mut SequenceSource::new(vec![0.0])), Some(0));
		assert_eq!(sample_index(&weights, &mut SequenceSource::new(vec![0.49])), Some(0));
		assert_eq!(sample_index(&weights, &mut SequenceSource::new(vec![0.5])), Some(2));
		assert_eq!(sample_index(&weights, &mut SequenceSource::new(vec![0.99])), Some(3));
		assert_eq!(sample_index(&[0.0, 0.0], &mut SequenceSource::new(vec![0.5])), None);
	}

	#[test]
	fn out_of_range_draws_are_clamped() {
		assert_eq!(choose_index(4, &mut SequenceSource::new(vec![1.5])), Some(3));
		assert_eq!(choose_index(4, &mut SequenceSource::new(vec![-2.0])), Some(0));
		assert_eq!(choose_index(0, &mut SequenceSource::new(vec![0.5])), None);
	}
}
