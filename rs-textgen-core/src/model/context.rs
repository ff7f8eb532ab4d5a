use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::model::contract::ModelKind;
use crate::model::random::RandomSource;

/// Parameters of one generation call.
///
/// The context is read-only during generation. Public fields can be set
/// directly; [`GenerationContext::set_temperature`] validates on assignment
/// and every model re-validates with [`GenerationContext::validate`].
///
/// # Invariants (checked by `validate`)
/// - `temperature` is finite and `>= 0.0` (`0.0` = deterministic argmax)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GenerationContext {
	/// Hard cap on emitted tokens.
	pub max_tokens: usize,

	/// Stop tokens are ignored as terminators until this many tokens exist.
	pub min_tokens: usize,

	/// Tokens that end generation once `min_tokens` is reached.
	pub stop: Vec<String>,

	/// Optional text the generation continues from.
	pub prompt: Option<String>,

	/// Sampling temperature.
	pub temperature: f64,

	/// When false, a token identical to the previous one is re-sampled.
	pub allow_repetition: bool,

	/// Seed for the default random source. `None` uses the thread RNG.
	pub seed: Option<u64>,
}

impl Default for GenerationContext {
	fn default() -> Self {
		Self {
			max_tokens: 100,
			min_tokens: 50,
			stop: vec![".".to_owned(), "!".to_owned(), "?".to_owned()],
			prompt: None,
			temperature: 1.0,
			allow_repetition: true,
			seed: None,
		}
	}
}

impl GenerationContext {
	/// Sets the sampling temperature.
	///
	/// # Errors
	/// Returns an error if the value is negative, NaN or infinite.
	pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
		if !temperature.is_finite() || temperature < 0.0 {
			return Err(ModelError::invalid_input(format!(
				"temperature must be a finite value >= 0.0, got {temperature}"
			)));
		}
		self.temperature = temperature;
		Ok(())
	}

	/// Checks the invariants of the context.
	pub fn validate(&self) -> Result<()> {
		if !self.temperature.is_finite() || self.temperature < 0.0 {
			return Err(ModelError::invalid_input(format!(
				"temperature must be a finite value >= 0.0, got {}",
				self.temperature
			)));
		}
		Ok(())
	}

	/// Whether `token` may end generation after `emitted` tokens.
	pub(crate) fn is_stop(&self, token: &str, emitted: usize) -> bool {
		emitted >= self.min_tokens && self.stop.iter().any(|stop| stop == token)
	}

	/// Generation step budget, bounding retries and recovery jumps.
	pub(crate) fn attempt_budget(&self) -> usize {
		self.max_tokens.saturating_mul(3)
	}

	/// Builds the default random source: seeded if `seed` is set, thread RNG otherwise.
	pub fn random_source(&self) -> Box<dyn RandomSource> {
		match self.seed {
			Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
			None => Box::new(rand::rng()),
		}
	}
}

/// Why generation stopped.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
	/// `max_tokens` reached, attempt budget exhausted, or no state left to continue from.
	Length,
	/// A stop token was emitted after `min_tokens`.
	Stop,
}

/// Output of one generation call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationResult {
	/// Post-processed text.
	pub text: String,
	/// Raw tokens, in emission order.
	pub tokens: Vec<String>,
	/// Number of tokens.
	pub length: usize,
	/// Model variant that produced the output.
	pub model: ModelKind,
	pub finish_reason: FinishReason,
}

impl GenerationResult {
	pub(crate) fn new(tokens: Vec<String>, model: ModelKind, finish_reason: FinishReason) -> Self {
		Self {
			text: crate::model::postprocess::format_tokens(&tokens),
			length: tokens.len(),
			tokens,
			model,
			finish_reason,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_the_generation_contract() {
		let ctx = GenerationContext::default();
		assert_eq!(ctx.max_tokens, 100);
		assert_eq!(ctx.min_tokens, 50);
		assert_eq!(ctx.stop, vec![".", "!", "?"]);
		assert_eq!(ctx.prompt, None);
		assert_eq!(ctx.temperature, 1.0);
		assert!(ctx.allow_repetition);
	}

	#[test]
	fn invalid_temperatures_are_rejected() {
		let mut ctx = GenerationContext::default();
		assert!(ctx.set_temperature(-0.5).is_err());
		assert!(ctx.set_temperature(f64::NAN).is_err());
		assert!(ctx.set_temperature(0.0).is_ok());
		ctx.temperature = f64::INFINITY;
		assert!(matches!(ctx.validate(), Err(ModelError::InvalidInput(_))));
	}

	#[test]
	fn stop_tokens_wait_for_min_tokens() {
		let ctx = GenerationContext { min_tokens: 3, ..GenerationContext::default() };
		assert!(!ctx.is_stop(".", 2));
		assert!(ctx.is_stop(".", 3));
		assert!(!ctx.is_stop("word", 10));
	}

	#[test]
	fn partial_json_uses_defaults() {
		let ctx: GenerationContext = serde_json::from_str(r#"{"max_tokens": 5, "temperature": 0.0}"#).unwrap();
		assert_eq!(ctx.max_tokens, 5);
		assert_eq!(ctx.temperature, 0.0);
		assert_eq!(ctx.min_tokens, 50);
	}

	#[test]
	fn seeded_sources_are_reproducible() {
		let ctx = GenerationContext { seed: Some(42), ..GenerationContext::default() };
		let a: Vec<f64> = {
			let mut rng = ctx.random_source();
			(0..4).map(|_| rng.next_f64()).collect()
		};
		let b: Vec<f64> = {
			let mut rng = ctx.random_source();
			(0..4).map(|_| rng.next_f64()).collect()
		};
		assert_eq!(a, b);
	}
}
