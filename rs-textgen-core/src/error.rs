use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the tokenizer, the models and the persistence helpers.
///
/// Every variant is a local condition the caller can recover from; the
/// library never panics on bad input.
#[derive(Error, Debug)]
pub enum ModelError {
	/// Bad tokenizer argument or invalid hyperparameter.
	#[error("invalid input: {0}")]
	InvalidInput(String),

	/// Corpus too short for the requested model structure.
	#[error("insufficient data: {0}")]
	InsufficientData(String),

	/// Generation or decoding requested before `train` / `from_json`.
	#[error("model has not been trained")]
	UntrainedModel,

	/// The chain is empty at generation time.
	#[error("no valid start state available")]
	NoValidStartState,

	/// Malformed serialized state.
	#[error("invalid model data: {0}")]
	InvalidModelData(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("binary encoding error: {0}")]
	Binary(#[from] postcard::Error),
}

impl ModelError {
	pub(crate) fn invalid_data<S: Into<String>>(msg: S) -> Self {
		ModelError::InvalidModelData(msg.into())
	}

	pub(crate) fn invalid_input<S: Into<String>>(msg: S) -> Self {
		ModelError::InvalidInput(msg.into())
	}
}
