use std::path::Path;
use std::sync::mpsc;
use std::thread;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::io;
use crate::model::contract::{Capabilities, LanguageModel, ModelKind, ModelStats, TrainOptions, TrainingInput};
use crate::model::context::{GenerationContext, GenerationResult};
use crate::model::hmm::{HiddenMarkovModel, HmmConfig, HmmData};
use crate::model::markov::{MarkovData, MarkovModel};
use crate::model::random::RandomSource;
use crate::model::vlmm::{VariableMarkovModel, VlmmData};
use crate::tokenizer::{TokenizerOptions, tokenize, tokenize_into_sentences};

/// Options of the training entrypoint.
///
/// Deserializable from a partial JSON document; missing fields take their defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainingOptions {
	pub model_type: ModelKind,
	/// Markov order, or maximum context length of the variable-order model.
	pub order: usize,
	pub num_states: usize,
	pub max_iterations: usize,
	pub tolerance: f64,
	pub min_count: usize,
	pub case_sensitive: bool,
	/// Train raw text sentence by sentence instead of as one sequence.
	pub per_sentence: bool,
	/// Seed of the HMM parameter initialization.
	pub seed: Option<u64>,
	pub tokenizer: TokenizerOptions,
}

impl Default for TrainingOptions {
	fn default() -> Self {
		Self {
			model_type: ModelKind::Markov,
			order: 2,
			num_states: 8,
			max_iterations: 100,
			tolerance: 1e-4,
			min_count: 1,
			case_sensitive: false,
			per_sentence: false,
			seed: None,
			tokenizer: TokenizerOptions::default(),
		}
	}
}

/// Corpus handed to [`train_model`].
#[derive(Clone, Copy, Debug)]
pub enum TrainingSource<'a> {
	/// Raw text, tokenized with [`TrainingOptions::tokenizer`].
	Text(&'a str),
	Tokens(&'a [String]),
	Sequences(&'a [Vec<String>]),
}

/// Persisted form of any model variant, used by the binary encoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ModelData {
	Markov(MarkovData),
	Hmm(HmmData),
	Vlmm(VlmmData),
}

/// One model of any variant.
///
/// Implements [`LanguageModel`] by delegating to the wrapped model, so
/// callers can hold a trained model without knowing its variant.
#[derive(Clone, Debug)]
pub enum AnyModel {
	Markov(MarkovModel),
	Hmm(HiddenMarkovModel),
	Vlmm(VariableMarkovModel),
}

impl AnyModel {
	/// Creates an untrained model of the variant selected by `options.model_type`.
	///
	/// # Errors
	/// Returns [`ModelError::InvalidInput`] on invalid hyperparameters.
	pub fn new(options: &TrainingOptions) -> Result<Self> {
		Ok(match options.model_type {
			ModelKind::Markov => AnyModel::Markov(MarkovModel::new(options.order)?),
			ModelKind::Hmm => AnyModel::Hmm(HiddenMarkovModel::new(HmmConfig {
				num_states: options.num_states,
				max_iterations: options.max_iterations,
				tolerance: options.tolerance,
				seed: options.seed,
			})?),
			ModelKind::Vlmm => AnyModel::Vlmm(VariableMarkovModel::new(options.order, options.min_count)?),
		})
	}

	pub fn as_markov(&self) -> Option<&MarkovModel> {
		match self {
			AnyModel::Markov(model) => Some(model),
			_ => None,
		}
	}

	pub fn as_hmm(&self) -> Option<&HiddenMarkovModel> {
		match self {
			AnyModel::Hmm(model) => Some(model),
			_ => None,
		}
	}

	pub fn as_vlmm(&self) -> Option<&VariableMarkovModel> {
		match self {
			AnyModel::Vlmm(model) => Some(model),
			_ => None,
		}
	}

	pub fn to_data(&self) -> ModelData {
		match self {
			AnyModel::Markov(model) => ModelData::Markov(model.to_data()),
			AnyModel::Hmm(model) => ModelData::Hmm(model.to_data()),
			AnyModel::Vlmm(model) => ModelData::Vlmm(model.to_data()),
		}
	}

	/// # Errors
	/// Returns [`ModelError::InvalidModelData`] if the data breaks a model invariant.
	pub fn from_data(data: ModelData) -> Result<Self> {
		Ok(match data {
			ModelData::Markov(data) => AnyModel::Markov(MarkovModel::from_data(data)?),
			ModelData::Hmm(data) => AnyModel::Hmm(HiddenMarkovModel::from_data(data)?),
			ModelData::Vlmm(data) => AnyModel::Vlmm(VariableMarkovModel::from_data(data)?),
		})
	}

	fn inner(&self) -> &dyn LanguageModel {
		match self {
			AnyModel::Markov(model) => model,
			AnyModel::Hmm(model) => model,
			AnyModel::Vlmm(model) => model,
		}
	}

	fn inner_mut(&mut self) -> &mut dyn LanguageModel {
		match self {
			AnyModel::Markov(model) => model,
			AnyModel::Hmm(model) => model,
			AnyModel::Vlmm(model) => model,
		}
	}
}

impl LanguageModel for AnyModel {
	fn model_type(&self) -> ModelKind {
		self.inner().model_type()
	}

	fn train(&mut self, input: TrainingInput<'_>, options: &TrainOptions) -> Result<()> {
		self.inner_mut().train(input, options)
	}

	fn is_trained(&self) -> bool {
		self.inner().is_trained()
	}

	fn generate(&self, context: &GenerationContext, rng: &mut dyn RandomSource) -> Result<GenerationResult> {
		self.inner().generate(context, rng)
	}

	fn to_json(&self) -> Value {
		self.inner().to_json()
	}

	/// Dispatches on the `modelType` tag.
	///
	/// # Errors
	/// Returns [`ModelError::InvalidModelData`] if the tag is missing or unknown.
	fn from_json(data: &Value) -> Result<Self> {
		let kind = data
			.get("modelType")
			.and_then(Value::as_str)
			.ok_or_else(|| ModelError::invalid_data("'modelType' must be a string"))?
			.parse::<ModelKind>()
			.map_err(|e| ModelError::invalid_data(e.to_string()))?;

		Ok(match kind {
			ModelKind::Markov => AnyModel::Markov(MarkovModel::from_json(data)?),
			ModelKind::Hmm => AnyModel::Hmm(HiddenMarkovModel::from_json(data)?),
			ModelKind::Vlmm => AnyModel::Vlmm(VariableMarkovModel::from_json(data)?),
		})
	}

	fn stats(&self) -> ModelStats {
		self.inner().stats()
	}

	fn capabilities(&self) -> Capabilities {
		self.inner().capabilities()
	}
}

/// Trains a new model of the variant selected by `options`.
///
/// # Behavior
/// - `Text` is tokenized with `options.tokenizer`, sentence by sentence when
///   `options.per_sentence` is set. `case_sensitive` also preserves case
///   during tokenization.
/// - `Tokens` and `Sequences` are used as is.
///
/// # Errors
/// - [`ModelError::InvalidInput`] on invalid hyperparameters or empty text
/// - [`ModelError::InsufficientData`] if the corpus is too short for the model
pub fn train_model(source: TrainingSource<'_>, options: &TrainingOptions) -> Result<AnyModel> {
	let mut model = AnyModel::new(options)?;
	let train_options = TrainOptions { case_sensitive: options.case_sensitive };

	match source {
		TrainingSource::Text(text) => {
			let tokenizer = TokenizerOptions {
				preserve_case: options.tokenizer.preserve_case || options.case_sensitive,
				..options.tokenizer.clone()
			};
			if options.per_sentence {
				let sentences = tokenize_into_sentences(text, &tokenizer);
				model.train(TrainingInput::from(&sentences), &train_options)?;
			} else {
				let tokens = tokenize(text, &tokenizer)?;
				model.train(TrainingInput::from(&tokens), &train_options)?;
			}
		}
		TrainingSource::Tokens(tokens) => model.train(TrainingInput::Tokens(tokens), &train_options)?,
		TrainingSource::Sequences(sequences) => model.train(TrainingInput::Sequences(sequences), &train_options)?,
	}

	Ok(model)
}

/// Generates one sample with the random source described by the context.
///
/// # Errors
/// Propagates the model's generation errors.
pub fn generate(model: &dyn LanguageModel, context: &GenerationContext) -> Result<GenerationResult> {
	let mut rng = context.random_source();
	model.generate(context, rng.as_mut())
}

/// Generates `count` independent samples in parallel.
///
/// # Behavior
/// - Samples are spread over at most `num_cpus` worker threads.
/// - A seeded context gives sample `i` the seed `seed + i`; otherwise each
///   sample draws from its thread's RNG.
/// - Results are returned in sample order. A failing sample yields an `Err`
///   entry and does not abort the others.
pub fn generate_batch(
	model: &dyn LanguageModel,
	context: &GenerationContext,
	count: usize,
) -> Vec<Result<GenerationResult>> {
	if count == 0 {
		return Vec::new();
	}

	let workers = num_cpus::get().clamp(1, count);
	let chunk_size = count.div_ceil(workers);
	let indices: Vec<usize> = (0..count).collect();

	let mut results: Vec<(usize, Result<GenerationResult>)> = thread::scope(|scope| {
		let (tx, rx) = mpsc::channel();
		for chunk in indices.chunks(chunk_size) {
			let tx = tx.clone();
			scope.spawn(move || {
				for &index in chunk {
					let sample_context = GenerationContext {
						seed: context.seed.map(|seed| seed.wrapping_add(index as u64)),
						..context.clone()
					};
					if tx.send((index, generate(model, &sample_context))).is_err() {
						break;
					}
				}
			});
		}
		drop(tx);
		rx.iter().collect()
	});

	results.sort_by_key(|(index, _)| *index);
	results.into_iter().map(|(_, result)| result).collect()
}

/// Cache file written by [`load_or_train`]: the model and the options it was trained with.
#[derive(Serialize, Deserialize)]
struct CachedModel {
	options: TrainingOptions,
	model: ModelData,
}

/// Loads the model cached next to `corpus`, or trains one and caches it.
///
/// The cache is `<corpus stem>.<model type>.bin` in the corpus directory and
/// records the [`TrainingOptions`] it was built with. A cache that fails to
/// load, or was built with other options, is rebuilt.
///
/// # Errors
/// Returns an error if the corpus cannot be read, training fails, or the
/// cache cannot be written.
pub fn load_or_train<P: AsRef<Path>>(corpus: P, options: &TrainingOptions) -> Result<AnyModel> {
	let cache = io::build_output_path(&corpus, &format!("{}.bin", options.model_type))?;

	if cache.exists() {
		match io::read_binary::<CachedModel, _>(&cache) {
			Ok(cached) if cached.options == *options => match AnyModel::from_data(cached.model) {
				Ok(model) => {
					info!("Loaded cached model {}", cache.display());
					return Ok(model);
				}
				Err(e) => warn!("Invalid cached model {}: {e}, retraining", cache.display()),
			},
			Ok(_) => warn!("Cache {} was built with other options, retraining", cache.display()),
			Err(e) => warn!("Cannot load cache {}: {e}, retraining", cache.display()),
		}
	}

	let text = io::read_corpus(&corpus)?;
	let model = train_model(TrainingSource::Text(&text), options)?;
	io::write_binary(&cache, &CachedModel { options: options.clone(), model: model.to_data() })?;
	info!("Cached model to {}", cache.display());
	Ok(model)
}
