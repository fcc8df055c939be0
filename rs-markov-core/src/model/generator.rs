use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;

use super::compiled::CompiledModel;
use super::generation_config::{GenerationConfig, SeedMode};
use super::overlap::{OverlapIndex, OverlapVerdict};
use super::token::{State, Token};
use super::tokenizer::Tokenizer;
use crate::error::{MarkovError, Result};

/// Whether generated candidates go through the overlap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapFilter {
	Active,
	/// The model kept no source sentences: nothing to compare against.
	DisabledNoRetainedSentences,
	/// `GenerationConfig::test_output` is off.
	DisabledByConfig,
}

/// Constrained random walks over a compiled model.
///
/// # Responsibilities
/// - Free generation from the sentence-start state (`generate`)
/// - Continuation of caller-supplied tokens (`generate_with_seed`)
/// - Generation bounded by rendered length (`generate_short`)
/// - Rejection of candidates failing the word bounds or the overlap check
///
/// All three operations share one walk primitive. Randomness only comes
/// from the RNG passed to each call, so a seeded RNG reproduces the output.
#[derive(Debug, Clone)]
pub struct Generator<'m> {
	model: &'m CompiledModel,
	tokenizer: Tokenizer,
	config: GenerationConfig,
}

impl<'m> Generator<'m> {
	/// Creates a generator with the default tokenizer and configuration.
	pub fn new(model: &'m CompiledModel) -> Self {
		let generator = Self { model, tokenizer: Tokenizer::default(), config: GenerationConfig::default() };
		generator.log_overlap_filter();
		generator
	}

	/// # Errors
	/// Returns `InvalidConfig` if `config` fails validation.
	pub fn with_config(model: &'m CompiledModel, tokenizer: Tokenizer, config: GenerationConfig) -> Result<Self> {
		config.validate()?;
		let generator = Self { model, tokenizer, config };
		generator.log_overlap_filter();
		Ok(generator)
	}

	pub fn config(&self) -> &GenerationConfig {
		&self.config
	}

	pub fn tokenizer(&self) -> &Tokenizer {
		&self.tokenizer
	}

	/// Reports whether the overlap check will run.
	pub fn overlap_filter(&self) -> OverlapFilter {
		match (self.config.test_output, self.model.overlap()) {
			(false, _) => OverlapFilter::DisabledByConfig,
			(true, None) => OverlapFilter::DisabledNoRetainedSentences,
			(true, Some(_)) => OverlapFilter::Active,
		}
	}

	fn log_overlap_filter(&self) {
		if self.overlap_filter() == OverlapFilter::DisabledNoRetainedSentences {
			debug!("Overlap check disabled: model has no retained sentences");
		}
	}

	fn active_overlap(&self) -> Option<&OverlapIndex> {
		if self.config.test_output { self.model.overlap() } else { None }
	}

	/// Renders tokens with the generator's tokenizer.
	pub fn render(&self, tokens: &[Token]) -> String {
		self.tokenizer.render(tokens)
	}

	/// Walks from `state` until `End`.
	///
	/// Returns `None` when the walk is discarded: more than `max_tokens`
	/// tokens, or a state with no outgoing edges.
	fn walk<R: Rng + ?Sized>(&self, rng: &mut R, mut state: State) -> Option<Vec<Token>> {
		let mut output = Vec::new();
		loop {
			let next = self.model.sample(&state, rng)?;
			if *next == Token::End {
				return Some(output);
			}
			if output.len() >= self.config.max_tokens || next.is_sentinel() {
				return None;
			}
			output.push(next.clone());
			state = state.shift(next.clone());
		}
	}

	fn word_count(&self, tokens: &[Token]) -> usize {
		tokens.iter().filter(|t| !self.tokenizer.is_terminator(t)).count()
	}

	/// Applies word bounds and the overlap check to a finished candidate.
	fn accept(&self, candidate: &[Token]) -> bool {
		if candidate.is_empty() {
			return false;
		}
		let words = self.word_count(candidate);
		if self.config.min_words.is_some_and(|min| words < min) {
			debug!("Rejected candidate: {words} words, below minimum");
			return false;
		}
		if self.config.max_words.is_some_and(|max| words > max) {
			debug!("Rejected candidate: {words} words, above maximum");
			return false;
		}
		if let Some(index) = self.active_overlap() {
			let verdict = index.check(candidate, self.config.max_overlap_ratio(), self.config.max_overlap_total);
			if verdict != OverlapVerdict::Accepted {
				debug!("Rejected candidate by overlap check: {verdict:?}");
				return false;
			}
		}
		true
	}

	/// Generates a sentence from the sentence-start state.
	///
	/// Discarded walks and rejected candidates each use one try.
	///
	/// # Errors
	/// Returns `NoViableSentence` once `max_tries` attempts failed.
	pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, max_tries: usize) -> Result<Vec<Token>> {
		let start = State::start(self.model.state_size());
		for _ in 0..max_tries {
			if let Some(candidate) = self.walk(rng, start.clone()) {
				if self.accept(&candidate) {
					return Ok(candidate);
				}
			}
		}
		Err(MarkovError::NoViableSentence { tries: max_tries })
	}

	/// Generates a sentence continuing `seed`, which is included at the
	/// front of the output.
	///
	/// `seed` holds 1 to `state_size` word tokens. With `SeedMode::Anywhere`
	/// every state ending with the seed is a candidate start; several
	/// candidates are tried in an order shuffled by `rng`.
	///
	/// # Errors
	/// - `InvalidSeed` for an empty, too long or sentinel-bearing seed
	/// - `SeedNotFound` if no state matches; there is no silent fallback
	/// - `NoViableSentence` once `max_tries` attempts failed
	pub fn generate_with_seed<R: Rng + ?Sized>(
		&self,
		rng: &mut R,
		seed: &[Token],
		max_tries: usize,
	) -> Result<Vec<Token>> {
		let state_size = self.model.state_size();
		if seed.is_empty() || seed.len() > state_size {
			return Err(MarkovError::InvalidSeed(format!(
				"expected 1 to {state_size} tokens, got {}",
				seed.len()
			)));
		}
		if seed.iter().any(Token::is_sentinel) {
			return Err(MarkovError::InvalidSeed("seed contains a sentinel".to_owned()));
		}

		let mut candidates: Vec<State> = match self.config.seed_mode {
			SeedMode::Anywhere => self.model.states_ending_with(seed).into_iter().cloned().collect(),
			SeedMode::SentenceStart => {
				let state = State::anchored(state_size, seed);
				if self.model.contains_state(&state) { vec![state] } else { Vec::new() }
			}
		};
		if candidates.is_empty() {
			return Err(MarkovError::SeedNotFound { seed: self.render(seed) });
		}
		candidates.shuffle(rng);

		for attempt in 0..max_tries {
			let state = candidates[attempt % candidates.len()].clone();
			if let Some(walked) = self.walk(rng, state) {
				let mut candidate = seed.to_vec();
				candidate.extend(walked);
				if self.accept(&candidate) {
					return Ok(candidate);
				}
			}
		}
		Err(MarkovError::NoViableSentence { tries: max_tries })
	}

	/// Generates a sentence whose rendered text is at most `max_chars`
	/// characters long.
	///
	/// # Errors
	/// Returns `NoViableSentence` if none of `max_tries` free generations
	/// qualifies.
	pub fn generate_short<R: Rng + ?Sized>(&self, rng: &mut R, max_chars: usize, max_tries: usize) -> Result<String> {
		for _ in 0..max_tries {
			let Ok(candidate) = self.generate(rng, 1) else { continue };
			let text = self.render(&candidate);
			if text.chars().count() <= max_chars {
				return Ok(text);
			}
			debug!("Rejected candidate: longer than {max_chars} chars");
		}
		Err(MarkovError::NoViableSentence { tries: max_tries })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::chain::{ChainBuilder, Model, build};
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn model(lines: &[&str], state_size: usize) -> Model {
		let tokenizer = Tokenizer::default();
		build(lines.iter().map(|l| tokenizer.tokenize(l)), state_size).unwrap()
	}

	fn retained_model(lines: &[&str], state_size: usize) -> Model {
		let tokenizer = Tokenizer::default();
		let mut builder = ChainBuilder::new(state_size, true).unwrap();
		builder.add_sentences(lines.iter().map(|l| tokenizer.tokenize(l)));
		builder.finish()
	}

	#[test]
	fn test_the_cat_frequencies() {
		let compiled = model(&["the cat sat", "the cat ran"], 2).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(2024);

		let mut sat = 0;
		for _ in 0..2000 {
			let text = generator.render(&generator.generate(&mut rng, 10).unwrap());
			match text.as_str() {
				"the cat sat" => sat += 1,
				"the cat ran" => (),
				other => panic!("unexpected sentence {other:?}"),
			}
		}
		assert!((900..1100).contains(&sat), "sat drawn {sat} times");
	}

	#[test]
	fn test_generation_is_deterministic() {
		let compiled = model(&["a b c d", "a c b d", "b a d c", "d c b a"], 1).compile();
		let generator = Generator::new(&compiled);
		let run = |seed| {
			let mut rng = StdRng::seed_from_u64(seed);
			(0..10).map(|_| generator.generate(&mut rng, 50).ok()).collect::<Vec<_>>()
		};
		assert_eq!(run(9), run(9));
	}

	#[test]
	fn test_runaway_walks_are_discarded() {
		// the only sentence has six tokens, more than the walk may emit
		let compiled = model(&["a b c d e f"], 1).compile();

		let config = GenerationConfig { max_tokens: 3, ..Default::default() };
		let generator = Generator::with_config(&compiled, Tokenizer::default(), config).unwrap();
		let mut rng = StdRng::seed_from_u64(1);
		let result = generator.generate(&mut rng, 5);
		assert!(matches!(result, Err(MarkovError::NoViableSentence { tries: 5 })));
	}

	#[test]
	fn test_zero_tries_fails() {
		let compiled = model(&["x y"], 1).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(0);
		assert!(matches!(generator.generate(&mut rng, 0), Err(MarkovError::NoViableSentence { tries: 0 })));
	}

	#[test]
	fn test_seed_continuation() {
		let compiled = model(&["the cat sat on the mat", "a dog ran"], 2).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(3);

		let seed = [Token::word("cat")];
		let out = generator.generate_with_seed(&mut rng, &seed, 10).unwrap();
		assert_eq!(generator.render(&out), "cat sat on the mat");

		let seed = [Token::word("the"), Token::word("cat")];
		let out = generator.generate_with_seed(&mut rng, &seed, 10).unwrap();
		assert_eq!(generator.render(&out), "the cat sat on the mat");
	}

	#[test]
	fn test_unknown_seed_never_falls_back() {
		let compiled = model(&["the cat sat", "the cat ran"], 2).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(5);
		for seed in [vec![Token::word("dog")], vec![Token::word("cat"), Token::word("the")]] {
			let result = generator.generate_with_seed(&mut rng, &seed, 100);
			assert!(matches!(result, Err(MarkovError::SeedNotFound { .. })));
		}
	}

	#[test]
	fn test_invalid_seeds() {
		let compiled = model(&["the cat sat"], 2).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(5);
		assert!(matches!(generator.generate_with_seed(&mut rng, &[], 5), Err(MarkovError::InvalidSeed(_))));
		let long = [Token::word("the"), Token::word("cat"), Token::word("sat")];
		assert!(matches!(generator.generate_with_seed(&mut rng, &long, 5), Err(MarkovError::InvalidSeed(_))));
		assert!(matches!(generator.generate_with_seed(&mut rng, &[Token::Start], 5), Err(MarkovError::InvalidSeed(_))));
	}

	#[test]
	fn test_sentence_start_seed_mode() {
		let compiled = model(&["cat food is good", "the cat sat"], 2).compile();
		let config = GenerationConfig { seed_mode: SeedMode::SentenceStart, ..Default::default() };
		let generator = Generator::with_config(&compiled, Tokenizer::default(), config).unwrap();
		let mut rng = StdRng::seed_from_u64(8);

		let out = generator.generate_with_seed(&mut rng, &[Token::word("cat")], 10).unwrap();
		assert_eq!(generator.render(&out), "cat food is good");

		let result = generator.generate_with_seed(&mut rng, &[Token::word("sat")], 10);
		assert!(matches!(result, Err(MarkovError::SeedNotFound { .. })));
	}

	#[test]
	fn test_generate_short() {
		let compiled = model(&["tiny one", "a much much longer sentence than the other"], 1).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(11);
		for _ in 0..20 {
			let text = generator.generate_short(&mut rng, 10, 200).unwrap();
			assert!(text.chars().count() <= 10, "{text:?}");
		}
		let result = generator.generate_short(&mut rng, 2, 50);
		assert!(matches!(result, Err(MarkovError::NoViableSentence { tries: 50 })));
	}

	#[test]
	fn test_word_bounds() {
		let compiled = model(&["one two three four five", "six seven"], 2).compile();
		let config = GenerationConfig { min_words: Some(3), ..Default::default() };
		let generator = Generator::with_config(&compiled, Tokenizer::default(), config).unwrap();
		let mut rng = StdRng::seed_from_u64(4);
		for _ in 0..20 {
			let out = generator.generate(&mut rng, 100).unwrap();
			assert_eq!(generator.render(&out), "one two three four five");
		}
	}

	#[test]
	fn test_overlap_filter_status() {
		let plain = model(&["the cat sat"], 2).compile();
		assert_eq!(Generator::new(&plain).overlap_filter(), OverlapFilter::DisabledNoRetainedSentences);

		let retained = retained_model(&["the cat sat"], 2).compile();
		assert_eq!(Generator::new(&retained).overlap_filter(), OverlapFilter::Active);

		let config = GenerationConfig { test_output: false, ..Default::default() };
		let off = Generator::with_config(&retained, Tokenizer::default(), config).unwrap();
		assert_eq!(off.overlap_filter(), OverlapFilter::DisabledByConfig);
	}

	#[test]
	fn test_overlap_rejects_verbatim_copies() {
		// every walk reproduces the single training sentence
		let compiled = retained_model(&["only one possible sentence here"], 2).compile();
		let generator = Generator::new(&compiled);
		let mut rng = StdRng::seed_from_u64(6);
		assert!(matches!(generator.generate(&mut rng, 20), Err(MarkovError::NoViableSentence { .. })));

		let config = GenerationConfig { test_output: false, ..Default::default() };
		let lenient = Generator::with_config(&compiled, Tokenizer::default(), config).unwrap();
		let out = lenient.generate(&mut rng, 1).unwrap();
		assert_eq!(lenient.render(&out), "only one possible sentence here");
	}
}
