use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, Result};

/// How a seed is matched against the states of a compiled model.
///
/// # Variants
/// - `Anywhere`: any state whose trailing tokens equal the seed.
/// - `SentenceStart`: only the state made of `Start` padding followed by the
///   seed, so the output begins a sentence with the seed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeedMode {
	#[default]
	Anywhere,
	SentenceStart,
}

/// Parameters shared by every generation operation.
///
/// # Responsibilities
/// - Bound each random walk (`max_tokens`)
/// - Filter candidates on their word count (`min_words`, `max_words`)
/// - Drive the overlap check (`test_output`, `max_overlap_ratio`,
///   `max_overlap_total`) when the model retained its sentences
/// - Select the seed matching strategy
///
/// # Invariants
/// - `max_overlap_ratio` is within `0.0..=1.0`
/// - `max_tokens >= 1`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
	/// Tokens a walk may emit before it is discarded as runaway.
	pub max_tokens: usize,

	/// Reject candidates with fewer words (terminators not counted).
	pub min_words: Option<usize>,

	/// Reject candidates with more words (terminators not counted).
	pub max_words: Option<usize>,

	/// Apply the overlap check when the model has retained sentences.
	pub test_output: bool,

	/// Maximum fraction of tokens allowed inside verbatim runs.
	pub(crate) max_overlap_ratio: f64,

	/// Longest verbatim run allowed, in tokens.
	pub max_overlap_total: usize,

	pub seed_mode: SeedMode,
}

impl Default for GenerationConfig {
	fn default() -> Self {
		Self {
			max_tokens: 256,
			min_words: None,
			max_words: None,
			test_output: true,
			max_overlap_ratio: 0.7,
			max_overlap_total: 15,
			seed_mode: SeedMode::Anywhere,
		}
	}
}

impl GenerationConfig {
	pub fn max_overlap_ratio(&self) -> f64 {
		self.max_overlap_ratio
	}

	/// Sets the overlap ratio threshold.
	///
	/// # Errors
	/// Returns `InvalidConfig` if the value is outside `0.0..=1.0`.
	pub fn set_max_overlap_ratio(&mut self, ratio: f64) -> Result<()> {
		if !(0.0..=1.0).contains(&ratio) {
			return Err(MarkovError::InvalidConfig(format!(
				"max_overlap_ratio must be between 0.0 and 1.0, got {ratio}"
			)));
		}
		self.max_overlap_ratio = ratio;
		Ok(())
	}

	/// Checks invariants, for configs that came through serde.
	pub fn validate(&self) -> Result<()> {
		if !(0.0..=1.0).contains(&self.max_overlap_ratio) {
			return Err(MarkovError::InvalidConfig(format!(
				"max_overlap_ratio must be between 0.0 and 1.0, got {}",
				self.max_overlap_ratio
			)));
		}
		if self.max_tokens == 0 {
			return Err(MarkovError::InvalidConfig("max_tokens must be >= 1".to_owned()));
		}
		if let (Some(min), Some(max)) = (self.min_words, self.max_words) {
			if min > max {
				return Err(MarkovError::InvalidConfig(format!("min_words {min} > max_words {max}")));
			}
		}
		Ok(())
	}
}
