//! The capability set shared by every model variant.
//!
//! Callers select a variant by [`ModelKind`] and then only talk to it through
//! [`LanguageModel`]; nothing outside this contract is variant-specific.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::model::context::{GenerationContext, GenerationResult};
use crate::model::random::RandomSource;

/// Model variant tag, as it appears in `modelType`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
	Markov,
	Hmm,
	Vlmm,
}

impl ModelKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ModelKind::Markov => "markov",
			ModelKind::Hmm => "hmm",
			ModelKind::Vlmm => "vlmm",
		}
	}
}

impl fmt::Display for ModelKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ModelKind {
	type Err = ModelError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_lowercase().as_str() {
			"markov" => Ok(ModelKind::Markov),
			"hmm" => Ok(ModelKind::Hmm),
			"vlmm" => Ok(ModelKind::Vlmm),
			other => Err(ModelError::invalid_input(format!("unknown model type '{other}'"))),
		}
	}
}

/// Training corpus: one flat sequence, or independent sub-sequences
/// (typically one per sentence).
///
/// Sub-sequences are accumulated jointly: statistics never cross a
/// sub-sequence boundary, and every sub-sequence contributes to the same model.
#[derive(Clone, Copy, Debug)]
pub enum TrainingInput<'a> {
	Tokens(&'a [String]),
	Sequences(&'a [Vec<String>]),
}

impl<'a> TrainingInput<'a> {
	/// The input as a list of sub-sequences.
	pub(crate) fn sequences(&self) -> Vec<&'a [String]> {
		match *self {
			TrainingInput::Tokens(tokens) => vec![tokens],
			TrainingInput::Sequences(sequences) => sequences.iter().map(Vec::as_slice).collect(),
		}
	}

	/// Total number of tokens across all sub-sequences.
	pub fn token_count(&self) -> usize {
		self.sequences().iter().map(|s| s.len()).sum()
	}
}

impl<'a> From<&'a [String]> for TrainingInput<'a> {
	fn from(tokens: &'a [String]) -> Self {
		TrainingInput::Tokens(tokens)
	}
}

impl<'a> From<&'a Vec<String>> for TrainingInput<'a> {
	fn from(tokens: &'a Vec<String>) -> Self {
		TrainingInput::Tokens(tokens.as_slice())
	}
}

impl<'a> From<&'a [Vec<String>]> for TrainingInput<'a> {
	fn from(sequences: &'a [Vec<String>]) -> Self {
		TrainingInput::Sequences(sequences)
	}
}

impl<'a> From<&'a Vec<Vec<String>>> for TrainingInput<'a> {
	fn from(sequences: &'a Vec<Vec<String>>) -> Self {
		TrainingInput::Sequences(sequences.as_slice())
	}
}

/// Per-call training options.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainOptions {
	/// Keep token case. When false, tokens are lowercased before counting.
	pub case_sensitive: bool,
}

impl TrainOptions {
	pub(crate) fn normalize(&self, token: &str) -> String {
		if self.case_sensitive { token.to_owned() } else { token.to_lowercase() }
	}
}

/// Fixed descriptor of what a variant supports.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
	pub supports_temperature: bool,
	pub supports_constrained_generation: bool,
	pub supports_batch_generation: bool,
	pub max_order: usize,
	pub model_type: ModelKind,
}

/// Variant-specific statistics.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StatsDetail {
	Markov {
		order: usize,
		states: usize,
		start_states: usize,
		transitions: usize,
	},
	Hmm {
		num_states: usize,
		iterations: usize,
		converged: bool,
		log_likelihood: Option<f64>,
	},
	Vlmm {
		max_order: usize,
		min_count: usize,
		states_per_order: Vec<usize>,
		start_states: usize,
	},
}

/// Summary returned by [`LanguageModel::stats`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
	pub model_type: ModelKind,
	pub trained: bool,
	pub vocabulary_size: usize,
	pub total_tokens: usize,
	pub detail: StatsDetail,
}

/// The model contract.
///
/// # Lifecycle
/// A model is built with its hyperparameters, filled by `train` (a total
/// reset, never incremental) or `from_json`, then used read-only by any
/// number of `generate` calls, possibly from several threads.
pub trait LanguageModel: Send + Sync {
	fn model_type(&self) -> ModelKind;

	/// Rebuilds the model from scratch.
	///
	/// # Errors
	/// [`ModelError::InsufficientData`] if the corpus is too short for the model structure.
	fn train(&mut self, input: TrainingInput<'_>, options: &TrainOptions) -> Result<()>;

	/// Whether `train` or `from_json` populated the model.
	fn is_trained(&self) -> bool;

	/// Generates one sample, drawing every random decision from `rng`.
	///
	/// # Errors
	/// - [`ModelError::UntrainedModel`] before training
	/// - [`ModelError::InvalidInput`] if the context is invalid
	fn generate(&self, context: &GenerationContext, rng: &mut dyn RandomSource) -> Result<GenerationResult>;

	/// Plain-data representation, the persisted format.
	fn to_json(&self) -> Value;

	/// Rebuilds a model from [`LanguageModel::to_json`] output.
	///
	/// # Errors
	/// [`ModelError::InvalidModelData`] on structural violations.
	fn from_json(data: &Value) -> Result<Self>
	where
		Self: Sized;

	fn stats(&self) -> ModelStats;

	fn capabilities(&self) -> Capabilities;
}

/// Reads a required positive integer field of a serialized model.
pub(crate) fn positive_field(data: &Value, field: &str) -> Result<usize> {
	match data.get(field).and_then(Value::as_u64) {
		Some(value) if value > 0 => Ok(value as usize),
		_ => Err(ModelError::invalid_data(format!("'{field}' must be a positive integer"))),
	}
}

/// Checks the `modelType` tag of a serialized model, when present.
pub(crate) fn check_model_type(data: &Value, expected: ModelKind) -> Result<()> {
	if !data.is_object() {
		return Err(ModelError::invalid_data("model data must be an object"));
	}
	match data.get("modelType") {
		None => Ok(()),
		Some(Value::String(tag)) if tag == expected.as_str() => Ok(()),
		Some(other) => Err(ModelError::invalid_data(format!(
			"expected modelType '{expected}', got {other}"
		))),
	}
}

/// Reads a required array-of-strings field.
pub(crate) fn string_list_field(data: &Value, field: &str) -> Result<Vec<String>> {
	let items = data
		.get(field)
		.and_then(Value::as_array)
		.ok_or_else(|| ModelError::invalid_data(format!("'{field}' must be an array")))?;
	items
		.iter()
		.map(|item| {
			item.as_str()
				.map(str::to_owned)
				.ok_or_else(|| ModelError::invalid_data(format!("'{field}' must only contain strings")))
		})
		.collect()
}
