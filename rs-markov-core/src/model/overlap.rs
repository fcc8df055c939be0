use std::collections::HashSet;

use super::token::Token;

/// Why a candidate was rejected by the overlap check.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlapVerdict {
	Accepted,
	/// The candidate is a training sentence, word for word.
	Duplicate,
	/// Too large a share of its tokens sits in verbatim runs.
	RatioExceeded(f64),
	/// A single verbatim run is longer than allowed.
	RunTooLong(usize),
}

/// Lookup structures over the retained training sentences.
///
/// A run of `state_size + 1` tokens is the shortest copy the chain can
/// produce that is not implied by a single transition, so those grams are
/// the unit of coverage.
#[derive(Clone, Debug)]
pub struct OverlapIndex {
	gram_len: usize,
	grams: HashSet<Vec<Token>>,
	exact: HashSet<Vec<Token>>,
	sentences: Vec<Vec<Token>>,
}

impl OverlapIndex {
	pub fn new(state_size: usize, sentences: Vec<Vec<Token>>) -> Self {
		let gram_len = state_size + 1;
		let mut grams = HashSet::new();
		for sentence in &sentences {
			for window in sentence.windows(gram_len) {
				grams.insert(window.to_vec());
			}
		}
		let exact = sentences.iter().cloned().collect();
		Self { gram_len, grams, exact, sentences }
	}

	pub fn sentences(&self) -> &[Vec<Token>] {
		&self.sentences
	}

	/// Fraction of `candidate` tokens covered by runs of at least
	/// `state_size + 1` tokens found verbatim in a retained sentence.
	pub fn coverage(&self, candidate: &[Token]) -> f64 {
		if candidate.len() < self.gram_len {
			return 0.0;
		}
		let mut covered = vec![false; candidate.len()];
		for (start, window) in candidate.windows(self.gram_len).enumerate() {
			if self.grams.contains(window) {
				covered[start..start + self.gram_len].iter_mut().for_each(|c| *c = true);
			}
		}
		covered.iter().filter(|&&c| c).count() as f64 / candidate.len() as f64
	}

	/// True if some run of `len` consecutive candidate tokens appears
	/// verbatim inside one retained sentence.
	pub fn contains_run(&self, candidate: &[Token], len: usize) -> bool {
		if len == 0 || len > candidate.len() {
			return false;
		}
		candidate.windows(len).any(|run| {
			// every gram of a copied run is itself a copied gram
			if len >= self.gram_len && !run.windows(self.gram_len).all(|g| self.grams.contains(g)) {
				return false;
			}
			self.sentences.iter().any(|s| s.windows(len).any(|w| w == run))
		})
	}

	/// Applies the full check.
	///
	/// - `max_ratio`: reject when coverage is strictly above it
	/// - `max_total`: reject when a verbatim run is longer than this
	pub fn check(&self, candidate: &[Token], max_ratio: f64, max_total: usize) -> OverlapVerdict {
		if self.exact.contains(candidate) {
			return OverlapVerdict::Duplicate;
		}
		let ratio = self.coverage(candidate);
		if ratio > max_ratio {
			return OverlapVerdict::RatioExceeded(ratio);
		}
		if self.contains_run(candidate, max_total + 1) {
			return OverlapVerdict::RunTooLong(max_total + 1);
		}
		OverlapVerdict::Accepted
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::tokenizer::Tokenizer;

	fn index(lines: &[&str], state_size: usize) -> (Tokenizer, OverlapIndex) {
		let tokenizer = Tokenizer::default();
		let sentences = lines.iter().map(|l| tokenizer.tokenize(l)).collect();
		(tokenizer, OverlapIndex::new(state_size, sentences))
	}

	#[test]
	fn test_coverage() {
		let (t, idx) = index(&["the quick brown fox jumps"], 2);
		assert_eq!(idx.coverage(&t.tokenize("the quick brown fox jumps")), 1.0);
		// "the quick brown" copied, "cat sleeps now" new
		let c = idx.coverage(&t.tokenize("the quick brown cat sleeps now"));
		assert!((c - 0.5).abs() < 1e-9);
		assert_eq!(idx.coverage(&t.tokenize("a b")), 0.0);
	}

	#[test]
	fn test_grams_do_not_cross_sentences() {
		let (t, idx) = index(&["one two", "three four"], 1);
		assert_eq!(idx.coverage(&t.tokenize("two three")), 0.0);
	}

	#[test]
	fn test_check_verdicts() {
		let (t, idx) = index(&["a b c d e f g h", "x y"], 2);
		assert_eq!(idx.check(&t.tokenize("x y"), 0.7, 15), OverlapVerdict::Duplicate);
		assert!(matches!(
			idx.check(&t.tokenize("a b c d e f z"), 0.7, 15),
			OverlapVerdict::RatioExceeded(_)
		));
		assert_eq!(idx.check(&t.tokenize("a b c d e f z"), 0.9, 4), OverlapVerdict::RunTooLong(5));
		assert_eq!(idx.check(&t.tokenize("q a b c r s t u"), 0.7, 15), OverlapVerdict::Accepted);
	}

	#[test]
	fn test_contains_run_needs_single_sentence() {
		let (t, idx) = index(&["a b c", "b c d"], 1);
		// every 2-gram of "a b c d" exists, but no sentence holds all four
		let candidate = t.tokenize("a b c d");
		assert!(idx.contains_run(&candidate, 3));
		assert!(!idx.contains_run(&candidate, 4));
	}
}
