//! Statistical language models and the generation entrypoints.
//!
//! This module provides:
//! - The model contract shared by every variant (`LanguageModel`)
//! - A fixed-order Markov model (`MarkovModel`)
//! - A Hidden Markov Model trained with Baum-Welch (`HiddenMarkovModel`)
//! - A variable-length Markov model with back-off (`VariableMarkovModel`)
//! - Generation parameters and results (`GenerationContext`, `GenerationResult`)
//! - Training, generation, batch and caching entrypoints (`generator`)

/// Model contract, variant tag, capabilities and statistics.
pub mod contract;

/// Generation parameters and results.
pub mod context;

/// Injected randomness and sampling helpers.
pub mod random;

/// Ordered token ↔ index bijection.
pub mod vocab;

/// One Markov state: next-token counts and temperature sampling.
pub mod state;

/// Dense row-major matrices used by the HMM.
pub mod matrix;

/// Fixed-order n-gram model.
pub mod markov;

/// Hidden Markov Model.
pub mod hmm;

/// Variable-length Markov model.
pub mod vlmm;

/// Entrypoints over any model variant.
pub mod generator;

/// Token-to-text formatting. Not exposed.
pub(crate) mod postprocess;
