use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::{
	Capabilities, LanguageModel, ModelKind, ModelStats, StatsDetail, TrainOptions, TrainingInput,
	check_model_type, positive_field, string_list_field,
};
use super::context::{FinishReason, GenerationContext, GenerationResult};
use super::markov::is_sentence_terminal;
use super::random::{RandomSource, choose_index};
use super::state::{Chain, State, parse_chain, state_key};
use super::vocab::Vocabulary;
use crate::error::{ModelError, Result};
use crate::tokenizer::prompt_tokens;

/// Persisted form of a [`VariableMarkovModel`].
///
/// `chains[k - 1]` holds the contexts of `k` tokens.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VlmmData {
	pub model_type: ModelKind,
	pub max_order: usize,
	pub min_count: usize,
	pub chains: Vec<BTreeMap<String, State>>,
	pub start_states: Vec<String>,
	pub total_tokens: usize,
	pub vocabulary: Vocabulary,
	#[serde(default)]
	pub case_sensitive: bool,
}

/// Variable-length Markov model.
///
/// Counts contexts of every length from 1 to `max_order` and, at each
/// generation step, continues from the longest suffix of the history that
/// was observed often enough.
///
/// # Responsibilities
/// - Build one chain per context length
/// - Select the context by back-off: longest observed suffix first, one
///   token shorter until a context qualifies
/// - Generate with temperature, stop tokens and repetition control
///
/// # Invariants
/// - `max_order >= 1` and `min_count >= 1`
/// - `chains.len() == max_order`
/// - Contexts of length 1 always qualify, so `min_count` only prunes the
///   longer ones
#[derive(Clone, Debug, PartialEq)]
pub struct VariableMarkovModel {
	max_order: usize,
	/// Occurrences a context of length > 1 needs before it is used.
	min_count: usize,
	chains: Vec<Chain>,
	/// Tokens observed at the beginning of a sentence.
	start_states: BTreeSet<String>,
	total_tokens: usize,
	vocabulary: Vocabulary,
	case_sensitive: bool,
	trained: bool,
}

impl VariableMarkovModel {
	/// Creates an untrained model.
	///
	/// # Errors
	/// Returns an error if `max_order` or `min_count` is 0.
	pub fn new(max_order: usize, min_count: usize) -> Result<Self> {
		if max_order == 0 {
			return Err(ModelError::invalid_input("maxOrder must be a positive integer"));
		}
		if min_count == 0 {
			return Err(ModelError::invalid_input("minCount must be a positive integer"));
		}
		Ok(Self {
			max_order,
			min_count,
			chains: vec![Chain::new(); max_order],
			start_states: BTreeSet::new(),
			total_tokens: 0,
			vocabulary: Vocabulary::new(),
			case_sensitive: false,
			trained: false,
		})
	}

	pub fn max_order(&self) -> usize {
		self.max_order
	}

	pub fn min_count(&self) -> usize {
		self.min_count
	}

	pub fn total_tokens(&self) -> usize {
		self.total_tokens
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocabulary
	}

	pub fn start_states(&self) -> impl Iterator<Item = &str> {
		self.start_states.iter().map(String::as_str)
	}

	/// Raw counts of a context, or `None` if it was never observed.
	pub fn state(&self, context: &[String]) -> Option<&State> {
		let order = context.len();
		if order == 0 || order > self.max_order {
			return None;
		}
		self.chains[order - 1].get(&state_key(context))
	}

	/// Length of the context the model would continue `history` from.
	///
	/// Returns `None` if not even the last token has been observed with a continuation.
	pub fn context_order(&self, history: &[String]) -> Option<usize> {
		self.select(history).map(|(order, _)| order)
	}

	/// Builds the persisted form.
	pub fn to_data(&self) -> VlmmData {
		VlmmData {
			model_type: ModelKind::Vlmm,
			max_order: self.max_order,
			min_count: self.min_count,
			chains: self.chains.clone(),
			start_states: self.start_states.iter().cloned().collect(),
			total_tokens: self.total_tokens,
			vocabulary: self.vocabulary.clone(),
			case_sensitive: self.case_sensitive,
		}
	}

	/// Rebuilds a trained model.
	///
	/// Missing trailing chains are treated as empty.
	///
	/// # Errors
	/// Returns [`ModelError::InvalidModelData`] on a wrong tag, a zero
	/// `maxOrder` / `minCount`, or more chains than `maxOrder`.
	pub fn from_data(data: VlmmData) -> Result<Self> {
		if data.model_type != ModelKind::Vlmm {
			return Err(ModelError::invalid_data(format!("expected a vlmm model, got {}", data.model_type)));
		}
		if data.max_order == 0 || data.min_count == 0 {
			return Err(ModelError::invalid_data("'maxOrder' and 'minCount' must be positive integers"));
		}
		if data.chains.len() > data.max_order {
			return Err(ModelError::invalid_data(format!(
				"{} chains for a maximum order of {}",
				data.chains.len(),
				data.max_order
			)));
		}

		let mut chains: Vec<Chain> = data
			.chains
			.into_iter()
			.map(|chain| chain.into_iter().filter(|(_, state)| !state.is_empty()).collect())
			.collect();
		chains.resize(data.max_order, Chain::new());

		Ok(Self {
			max_order: data.max_order,
			min_count: data.min_count,
			chains,
			start_states: data.start_states.into_iter().collect(),
			total_tokens: data.total_tokens,
			vocabulary: data.vocabulary,
			case_sensitive: data.case_sensitive,
			trained: true,
		})
	}

	/// Longest qualifying suffix of `history` and its state.
	fn select(&self, history: &[String]) -> Option<(usize, &State)> {
		let longest = self.max_order.min(history.len());
		(1..=longest).rev().find_map(|order| {
			let key = state_key(&history[history.len() - order..]);
			self.chains[order - 1]
				.get(&key)
				.filter(|state| !state.is_empty() && (order == 1 || state.total() >= self.min_count))
				.map(|state| (order, state))
		})
	}

	fn random_start(&self, rng: &mut dyn RandomSource) -> Option<&str> {
		let pool: Vec<&String> = if self.start_states.is_empty() {
			self.chains[0].keys().collect()
		} else {
			self.start_states.iter().collect()
		};
		choose_index(pool.len(), rng).map(|index| pool[index].as_str())
	}

	/// Initial history: the prompt tokens if their last token is known, else a start token.
	fn initial_history(&self, prompt: Option<&str>, rng: &mut dyn RandomSource) -> Result<Vec<String>> {
		if let Some(prompt) = prompt {
			let tokens = prompt_tokens(prompt, self.case_sensitive);
			if tokens.last().is_some_and(|last| self.chains[0].contains_key(last)) {
				return Ok(tokens);
			}
			debug!("Prompt '{prompt}' ends in an unknown token, using a random start");
		}

		self.random_start(rng)
			.map(|token| vec![token.to_owned()])
			.ok_or(ModelError::NoValidStartState)
	}
}

impl LanguageModel for VariableMarkovModel {
	fn model_type(&self) -> ModelKind {
		ModelKind::Vlmm
	}

	/// Counts every context of length `1..=max_order` in every sub-sequence.
	///
	/// # Errors
	/// Returns [`ModelError::InsufficientData`] if no sub-sequence has two tokens.
	fn train(&mut self, input: TrainingInput<'_>, options: &TrainOptions) -> Result<()> {
		let sequences = input.sequences();
		let longest = sequences.iter().map(|s| s.len()).max().unwrap_or(0);
		if longest < 2 {
			return Err(ModelError::InsufficientData(format!(
				"a variable-order model needs at least 2 tokens in a sequence, got {longest}"
			)));
		}

		self.chains = vec![Chain::new(); self.max_order];
		self.start_states.clear();
		self.vocabulary = Vocabulary::new();
		self.total_tokens = 0;
		self.case_sensitive = options.case_sensitive;

		for sequence in sequences {
			let tokens: Vec<String> = sequence.iter().map(|t| options.normalize(t)).collect();
			for token in &tokens {
				self.vocabulary.insert(token);
			}
			self.total_tokens += tokens.len();

			for i in 0..tokens.len().saturating_sub(1) {
				if i == 0 || is_sentence_terminal(&tokens[i - 1]) {
					self.start_states.insert(tokens[i].clone());
				}
			}

			// For each context length
			for order in 1..=self.max_order {
				if tokens.len() <= order {
					break;
				}
				let chain = &mut self.chains[order - 1];
				for i in 0..tokens.len() - order {
					chain.entry(state_key(&tokens[i..i + order])).or_default().add_transition(&tokens[i + order]);
				}
			}
		}

		self.trained = true;
		info!(
			"Trained vlmm (max order {}, min count {}): contexts per order {:?}, {} tokens, vocabulary {}",
			self.max_order,
			self.min_count,
			self.chains.iter().map(|c| c.len()).collect::<Vec<_>>(),
			self.total_tokens,
			self.vocabulary.len()
		);
		Ok(())
	}

	fn is_trained(&self) -> bool {
		self.trained
	}

	/// Generates by repeated back-off lookups.
	///
	/// The output starts with the start token (or the prompt's last token).
	/// Each step samples from the longest qualifying context with the
	/// context temperature. Dead ends and repetition rejections behave as in
	/// the fixed-order model.
	fn generate(&self, context: &GenerationContext, rng: &mut dyn RandomSource) -> Result<GenerationResult> {
		context.validate()?;
		if !self.trained {
			return Err(ModelError::UntrainedModel);
		}
		if self.chains[0].is_empty() {
			return Err(ModelError::NoValidStartState);
		}

		let mut history = self.initial_history(context.prompt.as_deref(), rng)?;
		let mut tokens: Vec<String> = history.last().into_iter().take(context.max_tokens).cloned().collect();
		let mut finish_reason = FinishReason::Length;
		let budget = context.attempt_budget();
		let mut attempts = 0;

		while tokens.len() < context.max_tokens && attempts < budget {
			attempts += 1;

			let Some((order, state)) = self.select(&history) else {
				match self.random_start(rng) {
					Some(token) => {
						debug!("No context for '{}', jumping to '{token}'", history.last().map_or("", String::as_str));
						history = vec![token.to_owned()];
						continue;
					}
					None => break,
				}
			};

			let Some(next) = state.sample(context.temperature, rng) else {
				break;
			};

			if !context.allow_repetition && tokens.last().is_some_and(|last| last == next) {
				if order == 1 && state.len() == 1 {
					if let Some(token) = self.random_start(rng) {
						history = vec![token.to_owned()];
					}
				}
				continue;
			}

			let next = next.to_owned();
			history.push(next.clone());
			if history.len() > self.max_order {
				history.remove(0);
			}
			tokens.push(next);

			if context.is_stop(&tokens[tokens.len() - 1], tokens.len()) {
				finish_reason = FinishReason::Stop;
				break;
			}
		}

		Ok(GenerationResult::new(tokens, ModelKind::Vlmm, finish_reason))
	}

	fn to_json(&self) -> Value {
		serde_json::to_value(self.to_data()).unwrap_or(Value::Null)
	}

	/// Rebuilds the model from JSON.
	///
	/// `minCount` defaults to 1 when absent. Malformed chain entries are
	/// skipped with a warning.
	fn from_json(data: &Value) -> Result<Self> {
		check_model_type(data, ModelKind::Vlmm)?;
		let max_order = positive_field(data, "maxOrder")?;
		let min_count = match data.get("minCount") {
			Some(_) => positive_field(data, "minCount")?,
			None => 1,
		};
		let chains = data
			.get("chains")
			.and_then(Value::as_array)
			.ok_or_else(|| ModelError::invalid_data("'chains' must be an array"))?
			.iter()
			.enumerate()
			.map(|(index, chain)| parse_chain(Some(chain), &format!("chains[{index}]")))
			.collect::<Result<Vec<Chain>>>()?;
		let vocabulary = string_list_field(data, "vocabulary")?;
		let start_states = string_list_field(data, "startStates")?;

		Self::from_data(VlmmData {
			model_type: ModelKind::Vlmm,
			max_order,
			min_count,
			chains,
			start_states,
			total_tokens: data.get("totalTokens").and_then(Value::as_u64).unwrap_or(0) as usize,
			vocabulary: Vocabulary::from(vocabulary),
			case_sensitive: data.get("caseSensitive").and_then(Value::as_bool).unwrap_or(false),
		})
	}

	fn stats(&self) -> ModelStats {
		ModelStats {
			model_type: ModelKind::Vlmm,
			trained: self.trained,
			vocabulary_size: self.vocabulary.len(),
			total_tokens: self.total_tokens,
			detail: StatsDetail::Vlmm {
				max_order: self.max_order,
				min_count: self.min_count,
				states_per_order: self.chains.iter().map(|c| c.len()).collect(),
				start_states: self.start_states.len(),
			},
		}
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			supports_temperature: true,
			supports_constrained_generation: true,
			supports_batch_generation: true,
			max_order: self.max_order,
			model_type: ModelKind::Vlmm,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::random::SequenceSource;

	fn tokens(text: &str) -> Vec<String> {
		text.split_whitespace().map(str::to_owned).collect()
	}

	fn trained(corpus: &str, max_order: usize, min_count: usize) -> VariableMarkovModel {
		let mut model = VariableMarkovModel::new(max_order, min_count).unwrap();
		model.train(TrainingInput::from(&tokens(corpus)), &TrainOptions::default()).unwrap();
		model
	}

	#[test]
	fn zero_parameters_are_rejected() {
		assert!(VariableMarkovModel::new(0, 1).is_err());
		assert!(VariableMarkovModel::new(2, 0).is_err());
	}

	#[test]
	fn every_order_is_counted() {
		let model = trained("a b c a b d", 3, 1);
		assert_eq!(model.state(&tokens("a")).unwrap().count("b"), 2);
		assert_eq!(model.state(&tokens("a b")).unwrap().count("c"), 1);
		assert_eq!(model.state(&tokens("a b")).unwrap().count("d"), 1);
		assert_eq!(model.state(&tokens("b c a")).unwrap().count("b"), 1);
		assert!(model.state(&tokens("a b c a")).is_none());
	}

	#[test]
	fn back_off_respects_min_count() {
		let model = trained("x a b c y a b d z q b e", 2, 2);
		// "a b" seen twice qualifies; "q b" seen once backs off to "b"
		assert_eq!(model.context_order(&tokens("a b")), Some(2));
		assert_eq!(model.context_order(&tokens("q b")), Some(1));
		assert_eq!(model.context_order(&tokens("unknown")), None);
	}

	#[test]
	fn temperature_zero_follows_longest_context() {
		let model = trained("a b c . a b c . x b d . x b d . z b d .", 2, 1);
		let context = GenerationContext {
			prompt: Some("a b".to_owned()),
			temperature: 0.0,
			max_tokens: 2,
			min_tokens: 0,
			..GenerationContext::default()
		};
		let result = model.generate(&context, &mut SequenceSource::new(vec![0.0])).unwrap();
		// Order 1 alone would pick "d" (3 of 5); the "a b" context only continues with "c"
		assert_eq!(result.tokens, vec!["b", "c"]);
	}

	#[test]
	fn json_round_trip_is_exact() {
		let model = trained("the cat sat . the dog sat . the cat ran .", 3, 1);
		let restored = VariableMarkovModel::from_json(&model.to_json()).unwrap();
		assert_eq!(restored, model);
	}

	#[test]
	fn extra_chains_are_rejected() {
		let model = trained("a b a c", 1, 1);
		let mut data = model.to_json();
		data["chains"] = serde_json::json!([{}, {}]);
		assert!(matches!(VariableMarkovModel::from_json(&data), Err(ModelError::InvalidModelData(_))));
	}
}
