use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::model::random::{RandomSource, uniform};

/// Guards the renormalization denominator of temperature sampling.
const PROBABILITY_EPSILON: f64 = 1e-12;

/// Mapping from a state key to its outgoing transitions.
pub(crate) type Chain = BTreeMap<String, State>;

/// Represents a state of a Markov chain.
///
/// A `State` stores every token observed right after one n-gram, with its
/// number of occurrences. Conceptually, this is a node in a Markov chain
/// where outgoing edges are weighted by their number of observations.
///
/// Transitions are kept in the order their tokens were first observed, so
/// iteration (and therefore sampling with a fixed random source) is
/// deterministic and argmax ties go to the earliest token.
///
/// ## Invariants
/// - Each transition occurrence count is strictly positive
/// - The sum of counts equals the number of times the n-gram was followed by a token
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct State {
	/// Outgoing transitions indexed by the next token.
	/// Example: { "cat" => 42, "dog" => 3 }
	transitions: IndexMap<String, usize>,
}

impl State {
	/// Creates a new empty state.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records an occurrence of a transition toward `next_token`.
	pub fn add_transition(&mut self, next_token: &str) {
		*self.transitions.entry(next_token.to_owned()).or_insert(0) += 1;
	}

	pub fn is_empty(&self) -> bool {
		self.transitions.is_empty()
	}

	/// Number of distinct next tokens.
	pub fn len(&self) -> usize {
		self.transitions.len()
	}

	/// Sum of all occurrence counts.
	pub fn total(&self) -> usize {
		self.transitions.values().sum()
	}

	/// Occurrence count of `next_token`, `0` if never observed.
	pub fn count(&self, next_token: &str) -> usize {
		self.transitions.get(next_token).copied().unwrap_or(0)
	}

	/// Raw transition counts.
	pub fn counts(&self) -> &IndexMap<String, usize> {
		&self.transitions
	}

	/// Counts normalized into probabilities. Empty for an empty state.
	pub fn probabilities(&self) -> Vec<(String, f64)> {
		let total = self.total() as f64;
		if total == 0.0 {
			return Vec::new();
		}
		self.transitions
			.iter()
			.map(|(token, &count)| (token.clone(), count as f64 / total))
			.collect()
	}

	/// Highest-count token; ties go to the first one in iteration order.
	pub fn most_likely(&self) -> Option<&str> {
		let mut best: Option<(&str, usize)> = None;
		for (token, &count) in &self.transitions {
			if best.is_none_or(|(_, best_count)| count > best_count) {
				best = Some((token, count));
			}
		}
		best.map(|(token, _)| token)
	}

	/// Samples the next token with temperature scaling.
	///
	/// - `temperature == 0.0`: deterministic argmax, no draw consumed
	/// - otherwise each probability is raised to `1 / temperature`, the
	///   weights are renormalized and one inverse-CDF draw picks the token
	///
	/// The power is computed relative to the most likely token
	/// (`exp((ln p - ln p_max) / T)`), which gives the same distribution as
	/// `p^(1/T)` without underflowing.
	///
	/// Returns `None` if the state has no transitions.
	pub fn sample(&self, temperature: f64, rng: &mut dyn RandomSource) -> Option<&str> {
		if self.transitions.is_empty() {
			return None;
		}
		if temperature == 0.0 {
			return self.most_likely();
		}

		let total = self.total() as f64;
		let max_count = self.transitions.values().copied().max().unwrap_or(1) as f64;
		let log_max = (max_count / total).ln();
		let weights: Vec<f64> = self
			.transitions
			.values()
			.map(|&count| (((count as f64 / total).ln() - log_max) / temperature).exp())
			.collect();
		let norm = weights.iter().sum::<f64>().max(PROBABILITY_EPSILON);

		let target = uniform(rng);
		let mut cumulative = 0.0;
		for (token, weight) in self.transitions.keys().zip(&weights) {
			cumulative += weight / norm;
			if target < cumulative {
				return Some(token);
			}
		}

		// Rounding left the draw past the last bucket
		self.most_likely()
	}
}

/// Joins a window of tokens into a state key.
pub(crate) fn state_key(window: &[String]) -> String {
	window.join(" ")
}

/// Parses a serialized chain (`{ state: { next_token: count } }`).
///
/// Entries whose transition map is not a non-empty object of positive
/// integers are skipped with a warning instead of failing the whole load.
///
/// # Errors
/// Returns [`ModelError::InvalidModelData`] if `value` is not an object.
pub(crate) fn parse_chain(value: Option<&Value>, label: &str) -> Result<Chain> {
	let entries = value
		.and_then(Value::as_object)
		.ok_or_else(|| ModelError::invalid_data(format!("'{label}' must be an object")))?;

	let mut chain = Chain::new();
	for (key, transitions) in entries {
		match parse_state(transitions) {
			Some(state) => {
				chain.insert(key.clone(), state);
			}
			None => warn!("Skipping state '{key}' in '{label}': malformed transition map"),
		}
	}
	Ok(chain)
}

fn parse_state(value: &Value) -> Option<State> {
	let object = value.as_object()?;
	let mut state = State::new();
	for (token, count) in object {
		let count = count.as_u64().filter(|c| *c > 0)?;
		state.transitions.insert(token.clone(), count as usize);
	}
	if state.is_empty() { None } else { Some(state) }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::random::SequenceSource;
	use serde_json::json;

	fn state(pairs: &[(&str, usize)]) -> State {
		let mut state = State::new();
		for (token, count) in pairs {
			for _ in 0..*count {
				state.add_transition(token);
			}
		}
		state
	}

	#[test]
	fn counts_accumulate() {
		let s = state(&[("b", 2), ("c", 1)]);
		assert_eq!(s.total(), 3);
		assert_eq!(s.count("b"), 2);
		assert_eq!(s.count("z"), 0);
		let sum: f64 = s.probabilities().iter().map(|(_, p)| p).sum();
		assert!((sum - 1.0).abs() < 1e-12);
	}

	#[test]
	fn zero_temperature_is_argmax_with_first_seen_tie() {
		let s = state(&[("x", 2), ("a", 2), ("m", 1)]);
		let mut rng = SequenceSource::new(vec![0.99]);
		assert_eq!(s.sample(0.0, &mut rng), Some("x"));

		let mut late = state(&[("m", 1), ("a", 2)]);
		late.add_transition("x");
		late.add_transition("x");
		assert_eq!(late.most_likely(), Some("a"));
	}

	#[test]
	fn observation_order_survives_json() {
		let mut s = state(&[("x", 2), ("a", 2)]);
		s.add_transition("m");
		let value = serde_json::to_value(&s).unwrap();
		let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
		assert_eq!(keys, ["x", "a", "m"]);

		let chain = parse_chain(Some(&json!({ "k": value })), "chain").unwrap();
		assert_eq!(chain["k"].most_likely(), Some("x"));
		assert_eq!(chain["k"].counts().keys().collect::<Vec<_>>(), ["x", "a", "m"]);
	}

	#[test]
	fn unit_temperature_matches_counts() {
		let s = state(&[("b", 3), ("c", 1)]);
		assert_eq!(s.sample(1.0, &mut SequenceSource::new(vec![0.74])), Some("b"));
		assert_eq!(s.sample(1.0, &mut SequenceSource::new(vec![0.76])), Some("c"));
	}

	#[test]
	fn low_temperature_sharpens_distribution() {
		let s = state(&[("b", 3), ("c", 1)]);
		// p^(1/0.5): 0.5625 vs 0.0625 -> P(b) = 0.9
		assert_eq!(s.sample(0.5, &mut SequenceSource::new(vec![0.89])), Some("b"));
		assert_eq!(s.sample(0.5, &mut SequenceSource::new(vec![0.91])), Some("c"));
		// Extremely low temperature must not produce NaN weights
		assert_eq!(s.sample(1e-9, &mut SequenceSource::new(vec![0.5])), Some("b"));
	}

	#[test]
	fn empty_state_samples_nothing() {
		assert_eq!(State::new().sample(1.0, &mut SequenceSource::new(vec![0.5])), None);
		assert_eq!(State::new().most_likely(), None);
	}

	#[test]
	fn malformed_entries_are_skipped() {
		let value = json!({
			"a b": {"c": 2},
			"a": {},
			"b c": {"d": "three"},
			"c d": {"e": 0},
			"d e": [1, 2]
		});
		let chain = parse_chain(Some(&value), "chain").unwrap();
		assert_eq!(chain.len(), 1);
		assert_eq!(chain["a b"].count("c"), 2);
	}

	#[test]
	fn non_object_chain_is_rejected() {
		assert!(matches!(
			parse_chain(Some(&json!([1, 2])), "chain"),
			Err(ModelError::InvalidModelData(_))
		));
		assert!(parse_chain(None, "chain").is_err());
	}
}
