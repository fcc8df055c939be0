//! Error types for the Markov chain engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by training, merging, generation and persistence.
///
/// None of these leave a `Model` or `CompiledModel` half-updated: every
/// mutating operation either completes or returns before touching state.
#[derive(Error, Debug)]
pub enum MarkovError {
	/// Merge attempted across models with different window widths.
	#[error("Incompatible state size: expected {expected}, found {found}")]
	IncompatibleStateSize { expected: usize, found: usize },

	/// No state of the compiled model matches the requested seed.
	#[error("Seed not found in model: {seed:?}")]
	SeedNotFound { seed: String },

	/// Retry budget exhausted without a qualifying candidate.
	#[error("No viable sentence after {tries} tries")]
	NoViableSentence { tries: usize },

	/// Persisted input does not decode into a consistent model.
	#[error("Malformed persisted model: {0}")]
	MalformedPersistedModel(String),

	/// State size must be at least 1.
	#[error("Invalid state size: {0}")]
	InvalidStateSize(usize),

	/// Seed is empty or wider than the model's state.
	#[error("Invalid seed: {0}")]
	InvalidSeed(String),

	/// Summed weights of one state would not fit in a `u64`.
	#[error("Weight overflow: {0}")]
	WeightOverflow(String),

	/// Invalid configuration
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// Failure while encoding a model.
	#[error("Encode error: {0}")]
	Encode(String),

	/// I/O error with file context
	#[error("I/O error for {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MarkovError>;
