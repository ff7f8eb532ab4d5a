//! Hidden Markov Model over word tokens.
//!
//! Latent states are anonymous indices discovered by Baum-Welch (EM)
//! training; each state emits tokens from its own distribution.
//!
//! Parameters are stored densely:
//! - `initial`: `N` (sums to 1)
//! - `transitions`: `N × N` (rows sum to 1)
//! - `emissions`: `N × V` (rows sum to 1)
//!
//! The forward-backward recursion is scaled per time step, so sequences of
//! realistic length do not underflow. The sum of the log scale factors is
//! the sequence log-likelihood, used as the convergence signal.

use std::collections::HashMap;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::{
	Capabilities, LanguageModel, ModelKind, ModelStats, StatsDetail, TrainOptions, TrainingInput,
	check_model_type, positive_field, string_list_field,
};
use super::context::{FinishReason, GenerationContext, GenerationResult};
use super::matrix::{Matrix, normalize};
use super::random::{RandomSource, choose_index, sample_index};
use super::vocab::Vocabulary;
use crate::error::{ModelError, Result};
use crate::tokenizer::prompt_tokens;

/// Hyperparameters of a [`HiddenMarkovModel`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HmmConfig {
	/// Number of latent states.
	pub num_states: usize,
	/// Upper bound on EM iterations.
	pub max_iterations: usize,
	/// Training stops once the log-likelihood moves by less than this.
	pub tolerance: f64,
	/// Seed for parameter initialization. `None` uses the thread RNG.
	pub seed: Option<u64>,
}

impl Default for HmmConfig {
	fn default() -> Self {
		Self { num_states: 8, max_iterations: 100, tolerance: 1e-4, seed: None }
	}
}

impl HmmConfig {
	fn validate(&self) -> Result<()> {
		if self.num_states == 0 {
			return Err(ModelError::invalid_input("numStates must be a positive integer"));
		}
		if self.max_iterations == 0 {
			return Err(ModelError::invalid_input("maxIterations must be a positive integer"));
		}
		if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
			return Err(ModelError::invalid_input("tolerance must be a finite value > 0.0"));
		}
		Ok(())
	}
}

/// Log-likelihood trace of the last training run.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
	/// Log-likelihood of the parameters at the start of each EM iteration.
	pub log_likelihoods: Vec<f64>,
	/// Whether training stopped on tolerance rather than on `max_iterations`.
	pub converged: bool,
}

impl TrainingHistory {
	pub fn iterations(&self) -> usize {
		self.log_likelihoods.len()
	}

	pub fn final_log_likelihood(&self) -> Option<f64> {
		self.log_likelihoods.last().copied()
	}
}

/// Persisted form of a [`HiddenMarkovModel`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HmmData {
	pub model_type: ModelKind,
	pub num_states: usize,
	pub initial: Vec<f64>,
	pub transitions: Matrix,
	pub emissions: Matrix,
	pub vocabulary: Vocabulary,
	pub states: Vec<String>,
	#[serde(default)]
	pub total_tokens: usize,
	#[serde(default)]
	pub case_sensitive: bool,
	#[serde(default)]
	pub max_iterations: usize,
	#[serde(default)]
	pub tolerance: f64,
}

/// Expected counts gathered by one E-step over all sequences.
struct Expectations {
	log_likelihood: f64,
	initial: Vec<f64>,
	transitions: Matrix,
	transition_totals: Vec<f64>,
	emissions: Matrix,
	emission_totals: Vec<f64>,
	sequences: usize,
}

/// Hidden Markov Model implementing the model contract.
#[derive(Clone, Debug)]
pub struct HiddenMarkovModel {
	config: HmmConfig,
	vocabulary: Vocabulary,
	/// Latent state labels (`S0`, `S1`, ...), index-addressable.
	states: Vec<String>,
	state_index: HashMap<String, usize>,
	initial: Vec<f64>,
	transitions: Matrix,
	emissions: Matrix,
	total_tokens: usize,
	case_sensitive: bool,
	trained: bool,
	history: TrainingHistory,
}

impl HiddenMarkovModel {
	/// Creates an untrained model.
	///
	/// # Errors
	/// Returns an error if `num_states` or `max_iterations` is 0, or `tolerance` is not a positive finite value.
	pub fn new(config: HmmConfig) -> Result<Self> {
		config.validate()?;
		let states = state_labels(config.num_states);
		Ok(Self {
			state_index: index_states(&states),
			states,
			initial: Vec::new(),
			transitions: Matrix::zeros(0, 0),
			emissions: Matrix::zeros(0, 0),
			vocabulary: Vocabulary::new(),
			total_tokens: 0,
			case_sensitive: false,
			trained: false,
			history: TrainingHistory::default(),
			config,
		})
	}

	/// Shorthand for a model with `num_states` states and default settings.
	pub fn with_states(num_states: usize) -> Result<Self> {
		Self::new(HmmConfig { num_states, ..HmmConfig::default() })
	}

	pub fn config(&self) -> &HmmConfig {
		&self.config
	}

	pub fn num_states(&self) -> usize {
		self.config.num_states
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocabulary
	}

	pub fn initial(&self) -> &[f64] {
		&self.initial
	}

	pub fn transitions(&self) -> &Matrix {
		&self.transitions
	}

	pub fn emissions(&self) -> &Matrix {
		&self.emissions
	}

	pub fn state_labels(&self) -> &[String] {
		&self.states
	}

	/// Index of a latent state label.
	pub fn state_index(&self, label: &str) -> Option<usize> {
		self.state_index.get(label).copied()
	}

	pub fn training_history(&self) -> &TrainingHistory {
		&self.history
	}

	/// Trains with an injected random source for parameter initialization.
	///
	/// # Behavior
	/// - Resets the vocabulary and all parameters.
	/// - Initializes `initial`, `transitions` and `emissions` with uniform
	///   random values, then normalizes them.
	/// - Runs EM until `max_iterations` or until the log-likelihood changes by
	///   less than `tolerance`.
	/// - Sub-sequences are trained jointly: expected counts are summed over
	///   all of them before each M-step.
	///
	/// # Errors
	/// Returns [`ModelError::InsufficientData`] if the input holds fewer than two tokens.
	pub fn train_with_source(
		&mut self,
		input: TrainingInput<'_>,
		options: &TrainOptions,
		rng: &mut dyn RandomSource,
	) -> Result<()> {
		let sequences: Vec<Vec<String>> = input
			.sequences()
			.iter()
			.map(|sequence| sequence.iter().map(|t| options.normalize(t)).collect::<Vec<_>>())
			.filter(|sequence| !sequence.is_empty())
			.collect();
		let total: usize = sequences.iter().map(Vec::len).sum();
		if total < 2 {
			return Err(ModelError::InsufficientData(format!(
				"a hidden markov model needs at least 2 tokens, got {total}"
			)));
		}

		self.vocabulary = Vocabulary::new();
		for token in sequences.iter().flatten() {
			self.vocabulary.insert(token);
		}
		self.total_tokens = total;
		self.case_sensitive = options.case_sensitive;
		self.states = state_labels(self.config.num_states);
		self.state_index = index_states(&self.states);

		let encoded: Vec<Vec<usize>> = sequences
			.iter()
			.map(|sequence| sequence.iter().filter_map(|t| self.vocabulary.index_of(t)).collect())
			.collect();

		self.initialize(rng);
		self.history = TrainingHistory::default();

		let mut previous: Option<f64> = None;
		for iteration in 0..self.config.max_iterations {
			let expectations = self.expectation(&encoded);
			let log_likelihood = expectations.log_likelihood;
			self.history.log_likelihoods.push(log_likelihood);
			debug!("EM iteration {}: log-likelihood {:.6}", iteration + 1, log_likelihood);

			if let Some(previous) = previous {
				if (log_likelihood - previous).abs() < self.config.tolerance {
					self.history.converged = true;
					break;
				}
			}

			self.maximize(&expectations);
			previous = Some(log_likelihood);
		}

		self.trained = true;
		info!(
			"Trained hmm ({} states): vocabulary {}, {} iterations, log-likelihood {:?}, converged {}",
			self.config.num_states,
			self.vocabulary.len(),
			self.history.iterations(),
			self.history.final_log_likelihood(),
			self.history.converged
		);
		Ok(())
	}

	/// Most probable latent-state path for `observations` (Viterbi).
	///
	/// The output has one state index per observation. Computed in log
	/// space; tokens outside the vocabulary carry no emission evidence.
	///
	/// # Errors
	/// Returns [`ModelError::UntrainedModel`] before training.
	pub fn viterbi(&self, observations: &[String]) -> Result<Vec<usize>> {
		if !self.trained {
			return Err(ModelError::UntrainedModel);
		}
		if observations.is_empty() {
			return Ok(Vec::new());
		}

		let n = self.num_states();
		let observed: Vec<Option<usize>> =
			observations.iter().map(|t| self.vocabulary.index_of(&self.normalize(t))).collect();
		let emission = |state: usize, token: Option<usize>| -> f64 {
			token.map_or(0.0, |v| self.emissions.get(state, v).ln())
		};

		let mut scores = Matrix::zeros(observed.len(), n);
		let mut backpointers = vec![vec![0usize; n]; observed.len()];

		for i in 0..n {
			scores.set(0, i, self.initial[i].ln() + emission(i, observed[0]));
		}

		for t in 1..observed.len() {
			for j in 0..n {
				let mut best = f64::NEG_INFINITY;
				let mut best_index = 0;
				for i in 0..n {
					let score = scores.get(t - 1, i) + self.transitions.get(i, j).ln();
					if score > best {
						best = score;
						best_index = i;
					}
				}
				scores.set(t, j, best + emission(j, observed[t]));
				backpointers[t][j] = best_index;
			}
		}

		let last = observed.len() - 1;
		let mut state = argmax(scores.row(last));
		let mut path = vec![0usize; observed.len()];
		path[last] = state;
		for t in (1..observed.len()).rev() {
			state = backpointers[t][state];
			path[t - 1] = state;
		}
		Ok(path)
	}

	/// Log-likelihood of `tokens` under the model (scaled forward pass).
	///
	/// # Errors
	/// - [`ModelError::UntrainedModel`] before training
	/// - [`ModelError::InvalidInput`] for an empty sequence or an unknown token
	pub fn log_likelihood(&self, tokens: &[String]) -> Result<f64> {
		if !self.trained {
			return Err(ModelError::UntrainedModel);
		}
		if tokens.is_empty() {
			return Err(ModelError::invalid_input("cannot score an empty sequence"));
		}
		let observed = tokens
			.iter()
			.map(|t| {
				self.vocabulary
					.index_of(&self.normalize(t))
					.ok_or_else(|| ModelError::invalid_input(format!("token '{t}' is not in the vocabulary")))
			})
			.collect::<Result<Vec<usize>>>()?;
		let (_, scales) = self.forward(&observed);
		Ok(scales.iter().map(|c| c.ln()).sum())
	}

	/// Builds the persisted form.
	pub fn to_data(&self) -> HmmData {
		HmmData {
			model_type: ModelKind::Hmm,
			num_states: self.config.num_states,
			initial: self.initial.clone(),
			transitions: self.transitions.clone(),
			emissions: self.emissions.clone(),
			vocabulary: self.vocabulary.clone(),
			states: self.states.clone(),
			total_tokens: self.total_tokens,
			case_sensitive: self.case_sensitive,
			max_iterations: self.config.max_iterations,
			tolerance: self.config.tolerance,
		}
	}

	/// Rebuilds a trained model, validating every shape.
	///
	/// # Errors
	/// Returns [`ModelError::InvalidModelData`] on a wrong tag, a zero state
	/// count, an empty vocabulary, mismatched matrix shapes or invalid
	/// probabilities.
	pub fn from_data(data: HmmData) -> Result<Self> {
		if data.model_type != ModelKind::Hmm {
			return Err(ModelError::invalid_data(format!("expected an hmm model, got {}", data.model_type)));
		}
		let n = data.num_states;
		if n == 0 {
			return Err(ModelError::invalid_data("'numStates' must be a positive integer"));
		}
		if data.vocabulary.is_empty() {
			return Err(ModelError::invalid_data("'vocabulary' must not be empty"));
		}
		if data.states.len() != n {
			return Err(ModelError::invalid_data(format!("expected {n} state labels, got {}", data.states.len())));
		}
		if data.initial.len() != n {
			return Err(ModelError::invalid_data(format!("'initial' must have {n} entries")));
		}
		if data.transitions.rows() != n || data.transitions.cols() != n {
			return Err(ModelError::invalid_data(format!("'transitions' must be {n}x{n}")));
		}
		if data.emissions.rows() != n || data.emissions.cols() != data.vocabulary.len() {
			return Err(ModelError::invalid_data(format!(
				"'emissions' must be {n}x{}",
				data.vocabulary.len()
			)));
		}
		let probabilities_valid = data
			.initial
			.iter()
			.chain((0..n).flat_map(|i| data.transitions.row(i).iter()))
			.chain((0..n).flat_map(|i| data.emissions.row(i).iter()))
			.all(|p| p.is_finite() && *p >= 0.0);
		if !probabilities_valid {
			return Err(ModelError::invalid_data("probabilities must be finite and non-negative"));
		}

		let defaults = HmmConfig::default();
		let config = HmmConfig {
			num_states: n,
			max_iterations: if data.max_iterations > 0 { data.max_iterations } else { defaults.max_iterations },
			tolerance: if data.tolerance > 0.0 { data.tolerance } else { defaults.tolerance },
			seed: None,
		};

		Ok(Self {
			state_index: index_states(&data.states),
			states: data.states,
			initial: data.initial,
			transitions: data.transitions,
			emissions: data.emissions,
			vocabulary: data.vocabulary,
			total_tokens: data.total_tokens,
			case_sensitive: data.case_sensitive,
			trained: true,
			history: TrainingHistory::default(),
			config,
		})
	}

	fn normalize(&self, token: &str) -> String {
		if self.case_sensitive { token.to_owned() } else { token.to_lowercase() }
	}

	/// Random row-stochastic starting parameters.
	fn initialize(&mut self, rng: &mut dyn RandomSource) {
		let n = self.config.num_states;
		let v = self.vocabulary.len();

		self.initial = (0..n).map(|_| rng.next_f64()).collect();
		normalize(&mut self.initial);

		self.transitions = Matrix::random(n, n, rng);
		self.transitions.normalize_rows();

		self.emissions = Matrix::random(n, v, rng);
		self.emissions.normalize_rows();
	}

	/// Scaled forward pass: returns α (each row sums to 1) and the scale factors.
	fn forward(&self, observed: &[usize]) -> (Matrix, Vec<f64>) {
		let n = self.num_states();
		let mut alpha = Matrix::zeros(observed.len(), n);
		let mut scales = vec![0.0; observed.len()];

		for i in 0..n {
			alpha.set(0, i, self.initial[i] * self.emissions.get(i, observed[0]));
		}
		scales[0] = rescale(alpha.row_mut(0));

		for t in 1..observed.len() {
			for j in 0..n {
				let mut sum = 0.0;
				for i in 0..n {
					sum += alpha.get(t - 1, i) * self.transitions.get(i, j);
				}
				alpha.set(t, j, sum * self.emissions.get(j, observed[t]));
			}
			scales[t] = rescale(alpha.row_mut(t));
		}

		(alpha, scales)
	}

	/// Backward pass reusing the forward scale factors.
	fn backward(&self, observed: &[usize], scales: &[f64]) -> Matrix {
		let n = self.num_states();
		let mut beta = Matrix::filled(observed.len(), n, 1.0);

		for t in (0..observed.len().saturating_sub(1)).rev() {
			for i in 0..n {
				let mut sum = 0.0;
				for j in 0..n {
					sum += self.transitions.get(i, j) * self.emissions.get(j, observed[t + 1]) * beta.get(t + 1, j);
				}
				beta.set(t, i, sum / scales[t + 1]);
			}
		}

		beta
	}

	/// E-step: posterior occupancies (γ) and transitions (ξ), summed over all sequences.
	fn expectation(&self, sequences: &[Vec<usize>]) -> Expectations {
		let n = self.num_states();
		let v = self.vocabulary.len();
		let mut expectations = Expectations {
			log_likelihood: 0.0,
			initial: vec![0.0; n],
			transitions: Matrix::zeros(n, n),
			transition_totals: vec![0.0; n],
			emissions: Matrix::zeros(n, v),
			emission_totals: vec![0.0; n],
			sequences: 0,
		};

		let mut gamma = vec![0.0; n];
		let mut xi = Matrix::zeros(n, n);

		for observed in sequences.iter().filter(|s| !s.is_empty()) {
			let (alpha, scales) = self.forward(observed);
			let beta = self.backward(observed, &scales);
			expectations.log_likelihood += scales.iter().map(|c| c.ln()).sum::<f64>();
			expectations.sequences += 1;

			for (t, &token) in observed.iter().enumerate() {
				for i in 0..n {
					gamma[i] = alpha.get(t, i) * beta.get(t, i);
				}
				normalize(&mut gamma);

				for i in 0..n {
					if t == 0 {
						expectations.initial[i] += gamma[i];
					}
					if t + 1 < observed.len() {
						expectations.transition_totals[i] += gamma[i];
					}
					expectations.emissions.add(i, token, gamma[i]);
					expectations.emission_totals[i] += gamma[i];
				}

				if t + 1 < observed.len() {
					let next = observed[t + 1];
					let mut total = 0.0;
					for i in 0..n {
						for j in 0..n {
							let value = alpha.get(t, i)
								* self.transitions.get(i, j)
								* self.emissions.get(j, next)
								* beta.get(t + 1, j)
								/ scales[t + 1];
							xi.set(i, j, value);
							total += value;
						}
					}
					if total > 0.0 && total.is_finite() {
						for i in 0..n {
							for j in 0..n {
								expectations.transitions.add(i, j, xi.get(i, j) / total);
							}
						}
					}
				}
			}
		}

		expectations
	}

	/// M-step: re-estimates every parameter from the expected counts.
	fn maximize(&mut self, expectations: &Expectations) {
		let n = self.num_states();
		let v = self.vocabulary.len();

		let sequences = expectations.sequences.max(1) as f64;
		self.initial = expectations.initial.iter().map(|g| g / sequences).collect();
		normalize(&mut self.initial);

		for i in 0..n {
			let total = expectations.transition_totals[i];
			for j in 0..n {
				let value = if total > 0.0 { expectations.transitions.get(i, j) / total } else { 1.0 / n as f64 };
				self.transitions.set(i, j, value);
			}

			let total = expectations.emission_totals[i];
			for k in 0..v {
				let value = if total > 0.0 { expectations.emissions.get(i, k) / total } else { 1.0 / v as f64 };
				self.emissions.set(i, k, value);
			}
		}

		self.transitions.normalize_rows();
		self.emissions.normalize_rows();
	}

	/// Latent state the generation starts from.
	///
	/// With a fully known prompt, the state is drawn from the predictive
	/// distribution after filtering the prompt; otherwise from `initial`.
	fn first_state(&self, prompt: Option<&str>, rng: &mut dyn RandomSource) -> usize {
		let n = self.num_states();
		let observed: Option<Vec<usize>> = prompt.and_then(|prompt| {
			let tokens = prompt_tokens(prompt, self.case_sensitive);
			if tokens.is_empty() {
				return None;
			}
			tokens.iter().map(|t| self.vocabulary.index_of(t)).collect()
		});

		let distribution = match observed {
			Some(observed) => {
				let (alpha, _) = self.forward(&observed);
				let last = alpha.row(observed.len() - 1);
				let mut predictive: Vec<f64> =
					(0..n).map(|j| (0..n).map(|i| last[i] * self.transitions.get(i, j)).sum()).collect();
				normalize(&mut predictive);
				predictive
			}
			None => self.initial.clone(),
		};

		sample_index(&distribution, rng).or_else(|| choose_index(n, rng)).unwrap_or(0)
	}
}

impl LanguageModel for HiddenMarkovModel {
	fn model_type(&self) -> ModelKind {
		ModelKind::Hmm
	}

	/// Trains with the configured seed (or the thread RNG) for initialization.
	fn train(&mut self, input: TrainingInput<'_>, options: &TrainOptions) -> Result<()> {
		match self.config.seed {
			Some(seed) => self.train_with_source(input, options, &mut StdRng::seed_from_u64(seed)),
			None => self.train_with_source(input, options, &mut rand::rng()),
		}
	}

	fn is_trained(&self) -> bool {
		self.trained
	}

	/// Samples a latent path and its emissions.
	///
	/// Each step emits a token from the current state, checks the stop
	/// condition, then moves to the next state. Temperature does not apply.
	/// With `allow_repetition == false`, an emission equal to the previous
	/// token is dropped and the walk continues from the next state.
	fn generate(&self, context: &GenerationContext, rng: &mut dyn RandomSource) -> Result<GenerationResult> {
		context.validate()?;
		if !self.trained {
			return Err(ModelError::UntrainedModel);
		}

		let mut state = self.first_state(context.prompt.as_deref(), rng);
		let mut tokens: Vec<String> = Vec::new();
		let mut finish_reason = FinishReason::Length;
		let budget = context.attempt_budget();
		let mut attempts = 0;

		while tokens.len() < context.max_tokens && attempts < budget {
			attempts += 1;

			let Some(token) = sample_index(self.emissions.row(state), rng).and_then(|v| self.vocabulary.token(v))
			else {
				break;
			};

			let repeated = !context.allow_repetition && tokens.last().is_some_and(|last| last == token);
			if !repeated {
				tokens.push(token.to_owned());
				if context.is_stop(token, tokens.len()) {
					finish_reason = FinishReason::Stop;
					break;
				}
			}

			state = sample_index(self.transitions.row(state), rng).unwrap_or(state);
		}

		Ok(GenerationResult::new(tokens, ModelKind::Hmm, finish_reason))
	}

	fn to_json(&self) -> Value {
		serde_json::to_value(self.to_data()).unwrap_or(Value::Null)
	}

	fn from_json(data: &Value) -> Result<Self> {
		check_model_type(data, ModelKind::Hmm)?;
		let num_states = positive_field(data, "numStates")?;
		let vocabulary = string_list_field(data, "vocabulary")?;
		let states = match data.get("states") {
			Some(_) => string_list_field(data, "states")?,
			None => state_labels(num_states),
		};
		let initial: Vec<f64> = field_from_value(data, "initial")?;
		let transitions: Matrix = field_from_value(data, "transitions")?;
		let emissions: Matrix = field_from_value(data, "emissions")?;

		Self::from_data(HmmData {
			model_type: ModelKind::Hmm,
			num_states,
			initial,
			transitions,
			emissions,
			vocabulary: Vocabulary::from(vocabulary),
			states,
			total_tokens: data.get("totalTokens").and_then(Value::as_u64).unwrap_or(0) as usize,
			case_sensitive: data.get("caseSensitive").and_then(Value::as_bool).unwrap_or(false),
			max_iterations: data.get("maxIterations").and_then(Value::as_u64).unwrap_or(0) as usize,
			tolerance: data.get("tolerance").and_then(Value::as_f64).unwrap_or(0.0),
		})
	}

	fn stats(&self) -> ModelStats {
		ModelStats {
			model_type: ModelKind::Hmm,
			trained: self.trained,
			vocabulary_size: self.vocabulary.len(),
			total_tokens: self.total_tokens,
			detail: StatsDetail::Hmm {
				num_states: self.config.num_states,
				iterations: self.history.iterations(),
				converged: self.history.converged,
				log_likelihood: self.history.final_log_likelihood(),
			},
		}
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			supports_temperature: false,
			supports_constrained_generation: false,
			supports_batch_generation: true,
			max_order: 1,
			model_type: ModelKind::Hmm,
		}
	}
}

fn state_labels(num_states: usize) -> Vec<String> {
	(0..num_states).map(|i| format!("S{i}")).collect()
}

fn index_states(states: &[String]) -> HashMap<String, usize> {
	states.iter().enumerate().map(|(i, label)| (label.clone(), i)).collect()
}

/// Divides `row` by its sum and returns the sum.
///
/// A row with no mass becomes uniform and reports the smallest positive
/// scale, so the log-likelihood stays finite.
fn rescale(row: &mut [f64]) -> f64 {
	let sum: f64 = row.iter().sum();
	if sum > 0.0 && sum.is_finite() {
		row.iter_mut().for_each(|v| *v /= sum);
		sum
	} else {
		normalize(row);
		f64::MIN_POSITIVE
	}
}

fn argmax(values: &[f64]) -> usize {
	let mut best = 0;
	for (index, value) in values.iter().enumerate() {
		if *value > values[best] {
			best = index;
		}
	}
	best
}

fn field_from_value<T: serde::de::DeserializeOwned>(data: &Value, field: &str) -> Result<T> {
	let value = data
		.get(field)
		.ok_or_else(|| ModelError::invalid_data(format!("missing '{field}'")))?;
	serde_json::from_value(value.clone())
		.map_err(|e| ModelError::invalid_data(format!("malformed '{field}': {e}")))
}
