use log::warn;
use serde::{Deserialize, Serialize};

use super::token::Token;

/// Tokenizer settings.
///
/// # Fields
/// - `terminators`: characters ending a sentence. A trailing run of them is
///   split off its word into its own token.
/// - `reject_ill_formed`: skip training units containing quotes or brackets
///   that a chain cannot balance (`"`, `(`, `)`, `[`, `]`, or a word
///   starting/ending with `'`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TokenizerConfig {
	pub terminators: Vec<char>,
	pub reject_ill_formed: bool,
}

impl Default for TokenizerConfig {
	fn default() -> Self {
		Self { terminators: vec!['.', '!', '?'], reject_ill_formed: true }
	}
}

/// Splits text units into tokens and sentences, and renders tokens back.
///
/// `render(tokenize(s))` equals `s` up to whitespace: runs of whitespace
/// collapse to one space, and a terminator glued to its word stays glued.
#[derive(Clone, Debug, Default)]
pub struct Tokenizer {
	config: TokenizerConfig,
}

impl Tokenizer {
	pub fn new(config: TokenizerConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &TokenizerConfig {
		&self.config
	}

	fn is_terminator_char(&self, c: char) -> bool {
		self.config.terminators.contains(&c)
	}

	/// True if the token consists only of terminator characters.
	pub fn is_terminator(&self, token: &Token) -> bool {
		match token.as_word() {
			Some(w) => !w.is_empty() && w.chars().all(|c| self.is_terminator_char(c)),
			None => false,
		}
	}

	/// Splits `text` into an ordered list of word tokens.
	///
	/// Empty or whitespace-only input yields an empty list.
	pub fn tokenize(&self, text: &str) -> Vec<Token> {
		let mut tokens = Vec::new();
		for word in text.split_whitespace() {
			let body = word.trim_end_matches(|c| self.is_terminator_char(c));
			if body.is_empty() {
				tokens.push(Token::word(word));
				continue;
			}
			tokens.push(Token::word(body));
			let tail = &word[body.len()..];
			if !tail.is_empty() {
				tokens.push(Token::word(tail));
			}
		}
		tokens
	}

	/// Splits `text` into sentences, each closed by its terminator token
	/// (the last sentence may have none).
	pub fn sentences(&self, text: &str) -> Vec<Vec<Token>> {
		let mut sentences = Vec::new();
		let mut current = Vec::new();
		for token in self.tokenize(text) {
			let ends = self.is_terminator(&token);
			current.push(token);
			if ends {
				sentences.push(std::mem::take(&mut current));
			}
		}
		if !current.is_empty() {
			sentences.push(current);
		}
		sentences
	}

	/// Checks a raw unit against the reject filter.
	pub fn is_well_formed(&self, text: &str) -> bool {
		if !self.config.reject_ill_formed {
			return true;
		}
		if text.chars().any(|c| matches!(c, '"' | '(' | ')' | '[' | ']')) {
			return false;
		}
		!text.split_whitespace().any(|w| w.starts_with('\'') || w.ends_with('\''))
	}

	/// Sentences ready for the chain builder.
	///
	/// A unit failing the reject filter is skipped (logged, no error): a bad
	/// unit must never abort the batch it belongs to.
	pub fn training_sentences(&self, text: &str) -> Vec<Vec<Token>> {
		if !self.is_well_formed(text) {
			warn!("Skipping ill-formed unit: {:?}", truncate(text, 60));
			return Vec::new();
		}
		self.sentences(text)
	}

	/// Joins tokens back into displayable text.
	///
	/// Sentinels are dropped. Terminator tokens attach to the previous word.
	pub fn render(&self, tokens: &[Token]) -> String {
		let mut out = String::new();
		for token in tokens {
			let Some(word) = token.as_word() else { continue };
			if !out.is_empty() && !self.is_terminator(token) {
				out.push(' ');
			}
			out.push_str(word);
		}
		out
	}
}

fn truncate(text: &str, max: usize) -> String {
	text.chars().take(max).collect()
}
