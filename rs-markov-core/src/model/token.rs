use std::fmt;

use serde::{Deserialize, Serialize};

/// An atomic unit of text, or one of the two reserved sentinels.
///
/// Sentinels are separate variants, so no word can ever compare equal to
/// `Start` or `End` whatever its spelling.
///
/// The derived ordering (`Start < End < Word`, words lexicographic) is the
/// fixed order used when compiling and persisting models.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
	/// Padding before the first word of a sentence.
	Start,
	/// Marks the end of a sentence.
	End,
	/// A word, punctuation attached.
	Word(String),
}

impl Token {
	/// Creates a word token.
	pub fn word(text: &str) -> Self {
		Token::Word(text.to_owned())
	}

	/// Returns the word text, or `None` for sentinels.
	pub fn as_word(&self) -> Option<&str> {
		match self {
			Token::Word(w) => Some(w),
			_ => None,
		}
	}

	pub fn is_sentinel(&self) -> bool {
		!matches!(self, Token::Word(_))
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Token::Start => f.write_str("<START>"),
			Token::End => f.write_str("<END>"),
			Token::Word(w) => f.write_str(w),
		}
	}
}

/// A fixed-width window of consecutive tokens: the n-gram key.
///
/// # Invariants
/// - Width never changes after construction (`shift` keeps it).
/// - `Start` may only appear as a leading run, `End` never appears.
///   Both are guaranteed by the chain builder and checked on load.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State(Vec<Token>);

impl State {
	pub fn new(tokens: Vec<Token>) -> Self {
		Self(tokens)
	}

	/// The all-`Start` state every sentence begins from.
	pub fn start(state_size: usize) -> Self {
		Self(vec![Token::Start; state_size])
	}

	/// Builds a state out of plain words.
	pub fn from_words(words: &[&str]) -> Self {
		Self(words.iter().map(|w| Token::word(w)).collect())
	}

	/// Builds the sentence-start state ending with `seed`: the leading
	/// positions are `Start`, the trailing ones are the seed.
	///
	/// `seed` must not be wider than `state_size`.
	pub(crate) fn anchored(state_size: usize, seed: &[Token]) -> Self {
		let mut tokens = vec![Token::Start; state_size - seed.len()];
		tokens.extend_from_slice(seed);
		Self(tokens)
	}

	pub fn tokens(&self) -> &[Token] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Slides the window by one: drops the oldest token, appends `next`.
	pub fn shift(&self, next: Token) -> Self {
		let mut tokens = Vec::with_capacity(self.0.len());
		tokens.extend_from_slice(&self.0[1..]);
		tokens.push(next);
		Self(tokens)
	}

	/// True when the last `seed.len()` positions equal `seed`.
	pub fn ends_with(&self, seed: &[Token]) -> bool {
		self.0.ends_with(seed)
	}

	/// Checks sentinel placement: a leading run of `Start`, then words.
	pub(crate) fn is_well_formed(&self) -> bool {
		self.0
			.iter()
			.skip_while(|t| **t == Token::Start)
			.all(|t| matches!(t, Token::Word(_)))
	}
}

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let parts: Vec<String> = self.0.iter().map(Token::to_string).collect();
		write!(f, "({})", parts.join(", "))
	}
}
