//! Statistical text-generation library.
//!
//! This crate learns token-transition statistics from a corpus and samples
//! new text from them:
//! - Tokenization of raw text into words, whitespace runs or sentences
//! - Fixed-order Markov, Hidden Markov and variable-length Markov models
//!   behind one contract
//! - Generation with temperature, stop tokens, prompts and repetition control
//! - Plain-data serialization and on-disk persistence (JSON or binary)

/// Error type shared by the whole crate.
pub mod error;

/// Text to token sequences.
pub mod tokenizer;

/// Models, generation parameters and entrypoints.
pub mod model;

/// Corpus reading, path helpers and model persistence.
pub mod io;

pub use error::{ModelError, Result};
pub use model::context::{FinishReason, GenerationContext, GenerationResult};
pub use model::contract::{Capabilities, LanguageModel, ModelKind, ModelStats, TrainOptions, TrainingInput};
pub use model::generator::{
	AnyModel, TrainingOptions, TrainingSource, generate, generate_batch, load_or_train, train_model,
};
pub use model::hmm::HiddenMarkovModel;
pub use model::markov::MarkovModel;
pub use model::random::{FnSource, RandomSource, SequenceSource};
pub use model::vlmm::VariableMarkovModel;
pub use tokenizer::{TokenizeMethod, TokenizerOptions, tokenize, tokenize_into_sentences};
