use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::{
	Capabilities, LanguageModel, ModelKind, ModelStats, StatsDetail, TrainOptions, TrainingInput,
	check_model_type, positive_field, string_list_field,
};
use super::context::{FinishReason, GenerationContext, GenerationResult};
use super::random::{RandomSource, choose_index};
use super::state::{Chain, State, parse_chain, state_key};
use super::vocab::Vocabulary;
use crate::error::{ModelError, Result};
use crate::tokenizer::prompt_tokens;

/// Tokens that end a sentence. A window right after one of them is a start state.
pub(crate) const SENTENCE_TERMINALS: [&str; 3] = [".", "!", "?"];

pub(crate) fn is_sentence_terminal(token: &str) -> bool {
	SENTENCE_TERMINALS.contains(&token)
}

/// Persisted form of a [`MarkovModel`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkovData {
	pub model_type: ModelKind,
	pub order: usize,
	pub chain: BTreeMap<String, State>,
	pub start_states: Vec<String>,
	pub total_tokens: usize,
	pub vocabulary: Vocabulary,
	#[serde(default)]
	pub case_sensitive: bool,
}

/// Represents a fixed-order n-gram model over word tokens.
///
/// The `MarkovModel` stores one [`State`] per observed window of `order`
/// consecutive tokens and generates text by walking the chain.
///
/// # Responsibilities
/// - Build the chain from a token sequence (or from sentence-grouped sequences)
/// - Track the states that open a sentence, to start generation plausibly
/// - Generate with temperature, stop tokens and repetition control
/// - Serialize to / rebuild from plain data
///
/// # Invariants
/// - `order` is always >= 1
/// - Every state key joins exactly `order` tokens with a single space
/// - All state transitions have occurrence counts >= 1
#[derive(Clone, Debug, PartialEq)]
pub struct MarkovModel {
	/// Number of tokens in a state.
	order: usize,

	/// Mapping from a state key to its transitions.
	chain: Chain,

	/// States observed at the beginning of a sentence.
	start_states: BTreeSet<String>,

	total_tokens: usize,
	vocabulary: Vocabulary,
	case_sensitive: bool,
	trained: bool,
}

impl MarkovModel {
	/// Creates an untrained model of order `order`.
	///
	/// # Errors
	/// Returns an error if `order == 0`.
	pub fn new(order: usize) -> Result<Self> {
		if order == 0 {
			return Err(ModelError::invalid_input("order must be a positive integer"));
		}
		Ok(Self {
			order,
			chain: Chain::new(),
			start_states: BTreeSet::new(),
			total_tokens: 0,
			vocabulary: Vocabulary::new(),
			case_sensitive: false,
			trained: false,
		})
	}

	pub fn order(&self) -> usize {
		self.order
	}

	pub fn total_tokens(&self) -> usize {
		self.total_tokens
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocabulary
	}

	/// All state keys, in order.
	pub fn states(&self) -> impl Iterator<Item = &str> {
		self.chain.keys().map(String::as_str)
	}

	/// Sentence-opening state keys, in order.
	pub fn start_states(&self) -> impl Iterator<Item = &str> {
		self.start_states.iter().map(String::as_str)
	}

	/// Raw counts of a state.
	pub fn state(&self, key: &str) -> Option<&State> {
		self.chain.get(key)
	}

	/// Next-token probabilities of `state`, or `None` if the state is unknown.
	///
	/// The probabilities of a known state sum to 1.
	pub fn transitions(&self, state: &str) -> Option<Vec<(String, f64)>> {
		self.chain.get(state).map(State::probabilities)
	}

	/// Builds the persisted form.
	pub fn to_data(&self) -> MarkovData {
		MarkovData {
			model_type: ModelKind::Markov,
			order: self.order,
			chain: self.chain.clone(),
			start_states: self.start_states.iter().cloned().collect(),
			total_tokens: self.total_tokens,
			vocabulary: self.vocabulary.clone(),
			case_sensitive: self.case_sensitive,
		}
	}

	/// Rebuilds a trained model from its persisted form.
	///
	/// # Errors
	/// Returns [`ModelError::InvalidModelData`] if `order` is 0 or the tag is wrong.
	pub fn from_data(data: MarkovData) -> Result<Self> {
		if data.model_type != ModelKind::Markov {
			return Err(ModelError::invalid_data(format!("expected a markov model, got {}", data.model_type)));
		}
		if data.order == 0 {
			return Err(ModelError::invalid_data("'order' must be a positive integer"));
		}
		let chain: Chain = data.chain.into_iter().filter(|(_, state)| !state.is_empty()).collect();
		Ok(Self {
			order: data.order,
			chain,
			start_states: data.start_states.into_iter().collect(),
			total_tokens: data.total_tokens,
			vocabulary: data.vocabulary,
			case_sensitive: data.case_sensitive,
			trained: true,
		})
	}

	/// Picks a start state uniformly (from the start-state set if any, else
	/// from all states) and returns its window.
	fn random_start(&self, rng: &mut dyn RandomSource) -> Option<Vec<String>> {
		let pool: Vec<&String> = if self.start_states.is_empty() {
			self.chain.keys().collect()
		} else {
			self.start_states.iter().collect()
		};
		choose_index(pool.len(), rng).and_then(|index| self.window_of(pool[index]))
	}

	/// Rebuilds the window of `order` tokens a state key was joined from.
	///
	/// Tokens may contain spaces (sentence mode), so the key is segmented
	/// into known vocabulary tokens instead of being split on every space.
	/// Keys that do not segment fall back to a plain split when it yields
	/// exactly `order` parts.
	fn window_of(&self, key: &str) -> Option<Vec<String>> {
		if self.order == 1 {
			return Some(vec![key.to_owned()]);
		}
		let words: Vec<&str> = key.split(' ').collect();
		let mut window = Vec::with_capacity(self.order);
		if self.segment(&words, &mut window) {
			return Some(window);
		}
		(words.len() == self.order).then(|| words.iter().map(|w| (*w).to_owned()).collect())
	}

	/// Backtracking split of `words` into the tokens still missing from `window`.
	fn segment(&self, words: &[&str], window: &mut Vec<String>) -> bool {
		let remaining = self.order - window.len();
		if remaining == 0 {
			return words.is_empty();
		}
		// Every remaining token needs at least one word
		let longest = words.len().saturating_sub(remaining - 1);
		for end in 1..=longest {
			let token = words[..end].join(" ");
			if self.vocabulary.contains(&token) {
				window.push(token);
				if self.segment(&words[end..], window) {
					return true;
				}
				window.pop();
			}
		}
		false
	}

	/// Chooses the initial window of tokens.
	///
	/// The last `order` tokens of the prompt are used if that state exists;
	/// otherwise a random start state.
	fn initial_state(&self, prompt: Option<&str>, rng: &mut dyn RandomSource) -> Result<Vec<String>> {
		if let Some(prompt) = prompt {
			let tokens = prompt_tokens(prompt, self.case_sensitive);
			if tokens.len() >= self.order {
				let window = &tokens[tokens.len() - self.order..];
				if self.chain.contains_key(&state_key(window)) {
					return Ok(window.to_vec());
				}
			}
			debug!("Prompt '{prompt}' does not end in a known state, using a random start");
		}

		self.random_start(rng).ok_or(ModelError::NoValidStartState)
	}
}

impl LanguageModel for MarkovModel {
	fn model_type(&self) -> ModelKind {
		ModelKind::Markov
	}

	/// Builds the chain by sliding a window of `order` tokens over every sub-sequence.
	///
	/// # Notes
	/// - Fully resets previously learned state.
	/// - No window crosses a sub-sequence boundary; the first window of each
	///   sub-sequence is a start state, as is every window that follows a
	///   sentence-terminal token.
	/// - Sub-sequences shorter than `order + 1` still count towards the
	///   vocabulary and `total_tokens`.
	///
	/// # Errors
	/// Returns [`ModelError::InsufficientData`] if no sub-sequence has at least
	/// `order + 1` tokens. The model is left untouched in that case.
	fn train(&mut self, input: TrainingInput<'_>, options: &TrainOptions) -> Result<()> {
		let sequences = input.sequences();
		let longest = sequences.iter().map(|s| s.len()).max().unwrap_or(0);
		if longest <= self.order {
			return Err(ModelError::InsufficientData(format!(
				"order {} needs at least {} tokens, got {}",
				self.order,
				self.order + 1,
				longest
			)));
		}

		self.chain.clear();
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

			if tokens.len() <= self.order {
				continue;
			}

			// For each window followed by a token
			for i in 0..tokens.len() - self.order {
				let key = state_key(&tokens[i..i + self.order]);
				if i == 0 || is_sentence_terminal(&tokens[i - 1]) {
					self.start_states.insert(key.clone());
				}
				self.chain.entry(key).or_default().add_transition(&tokens[i + self.order]);
			}
		}

		self.trained = true;
		info!(
			"Trained markov model (order {}): {} states, {} start states, {} tokens, vocabulary {}",
			self.order,
			self.chain.len(),
			self.start_states.len(),
			self.total_tokens,
			self.vocabulary.len()
		);
		Ok(())
	}

	fn is_trained(&self) -> bool {
		self.trained
	}

	/// Walks the chain from a start state.
	///
	/// # Behavior
	/// - The output starts with the tokens of the start state (the prompt's
	///   last `order` tokens, or a random start state); they count towards
	///   `max_tokens`.
	/// - Each step samples the next token of the current state with the
	///   context temperature.
	/// - With `allow_repetition == false`, a token equal to the previous one
	///   is re-sampled; a state whose only continuation repeats jumps to a
	///   new start state instead.
	/// - A state without transitions jumps to a random start state (no token
	///   emitted).
	/// - Stops on `max_tokens`, on a stop token once `min_tokens` are emitted,
	///   or when the `3 × max_tokens` step budget runs out.
	fn generate(&self, context: &GenerationContext, rng: &mut dyn RandomSource) -> Result<GenerationResult> {
		context.validate()?;
		if !self.trained {
			return Err(ModelError::UntrainedModel);
		}
		if self.chain.is_empty() {
			return Err(ModelError::NoValidStartState);
		}

		let mut window = self.initial_state(context.prompt.as_deref(), rng)?;
		let mut tokens: Vec<String> = window.iter().take(context.max_tokens).cloned().collect();
		let mut finish_reason = FinishReason::Length;
		let budget = context.attempt_budget();
		let mut attempts = 0;

		while tokens.len() < context.max_tokens && attempts < budget {
			attempts += 1;

			let state = match self.chain.get(&state_key(&window)) {
				Some(state) if !state.is_empty() => state,
				_ => {
					// Dead end: restart from a fresh state without emitting it
					match self.random_start(rng) {
						Some(start) => {
							debug!("Dead end on '{}', jumping to '{}'", state_key(&window), state_key(&start));
							window = start;
							continue;
						}
						None => break,
					}
				}
			};

			let Some(next) = state.sample(context.temperature, rng) else {
				break;
			};

			if !context.allow_repetition && tokens.last().is_some_and(|last| last == next) {
				if state.len() == 1 {
					if let Some(start) = self.random_start(rng) {
						window = start;
					}
				}
				continue;
			}

			let next = next.to_owned();
			window.remove(0);
			window.push(next.clone());
			tokens.push(next);

			if context.is_stop(&tokens[tokens.len() - 1], tokens.len()) {
				finish_reason = FinishReason::Stop;
				break;
			}
		}

		Ok(GenerationResult::new(tokens, ModelKind::Markov, finish_reason))
	}

	fn to_json(&self) -> Value {
		serde_json::to_value(self.to_data()).unwrap_or(Value::Null)
	}

	/// Rebuilds the model from JSON.
	///
	/// `order` must be a positive integer, `chain` an object, `vocabulary`
	/// and `startStates` arrays of strings. Malformed chain entries are
	/// skipped with a warning.
	fn from_json(data: &Value) -> Result<Self> {
		check_model_type(data, ModelKind::Markov)?;
		let order = positive_field(data, "order")?;
		let chain = parse_chain(data.get("chain"), "chain")?;
		let vocabulary = string_list_field(data, "vocabulary")?;
		let start_states = string_list_field(data, "startStates")?;
		let total_tokens = data.get("totalTokens").and_then(Value::as_u64).unwrap_or(0) as usize;
		let case_sensitive = data.get("caseSensitive").and_then(Value::as_bool).unwrap_or(false);

		Self::from_data(MarkovData {
			model_type: ModelKind::Markov,
			order,
			chain,
			start_states,
			total_tokens,
			vocabulary: Vocabulary::from(vocabulary),
			case_sensitive,
		})
	}

	fn stats(&self) -> ModelStats {
		ModelStats {
			model_type: ModelKind::Markov,
			trained: self.trained,
			vocabulary_size: self.vocabulary.len(),
			total_tokens: self.total_tokens,
			detail: StatsDetail::Markov {
				order: self.order,
				states: self.chain.len(),
				start_states: self.start_states.len(),
				transitions: self.chain.values().map(State::len).sum(),
			},
		}
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			supports_temperature: true,
			supports_constrained_generation: true,
			supports_batch_generation: true,
			max_order: self.order,
			model_type: ModelKind::Markov,
		}
	}
}
