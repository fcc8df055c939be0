use std::collections::HashMap;

use log::warn;

use super::compiled::CompiledModel;
use super::token::{State, Token};
use super::transitions::Transitions;
use crate::error::{MarkovError, Result};

/// Weighted `State -> Token -> count` graph learned from a corpus.
pub type TransitionTable = HashMap<State, Transitions>;

/// A word-level n-gram model: a transition table keyed by windows of
/// `state_size` tokens.
///
/// # Responsibilities
/// - Accumulate transition counts while a `ChainBuilder` feeds it sentences
/// - Merge with other models of the same `state_size`
/// - Optionally keep the source sentences for the overlap check
///
/// # Invariants
/// - `state_size >= 1`
/// - Every state has exactly `state_size` tokens and at least one edge
/// - All edge weights are >= 1
///
/// A model is only mutated through `ChainBuilder` or the merge functions.
/// Once compiled, the `CompiledModel` owns its own copy of the data.
#[derive(Clone, Debug)]
pub struct Model {
	state_size: usize,
	table: TransitionTable,

	/// Source sentences, kept only when explicitly requested. `None` means
	/// the overlap check is disabled for anything generated from this model.
	retained: Option<Vec<Vec<Token>>>,
}

impl Model {
	/// Creates an empty model that does not retain its source sentences.
	///
	/// # Errors
	/// Returns `InvalidStateSize` if `state_size == 0`.
	pub fn new(state_size: usize) -> Result<Self> {
		Self::with_retention(state_size, false)
	}

	/// Creates an empty model, retaining source sentences if `retain` is set.
	///
	/// Retention keeps every training sentence in memory; leave it off for
	/// large corpora.
	pub fn with_retention(state_size: usize, retain: bool) -> Result<Self> {
		if state_size == 0 {
			return Err(MarkovError::InvalidStateSize(state_size));
		}
		Ok(Self {
			state_size,
			table: HashMap::new(),
			retained: retain.then(Vec::new),
		})
	}

	/// Assembles a model from already validated parts.
	pub(crate) fn from_parts(
		state_size: usize,
		table: TransitionTable,
		retained: Option<Vec<Vec<Token>>>,
	) -> Self {
		Self { state_size, table, retained }
	}

	pub fn state_size(&self) -> usize {
		self.state_size
	}

	pub fn table(&self) -> &TransitionTable {
		&self.table
	}

	pub fn transitions(&self, state: &State) -> Option<&Transitions> {
		self.table.get(state)
	}

	/// Weight of the `state -> next` edge, 0 when absent.
	pub fn weight(&self, state: &State, next: &Token) -> u64 {
		self.table.get(state).map_or(0, |t| t.weight(next))
	}

	pub fn retains_sentences(&self) -> bool {
		self.retained.is_some()
	}

	pub fn retained_sentences(&self) -> Option<&[Vec<Token>]> {
		self.retained.as_deref()
	}

	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}

	pub fn state_count(&self) -> usize {
		self.table.len()
	}

	pub fn edge_count(&self) -> usize {
		self.table.values().map(Transitions::len).sum()
	}

	/// Sum of every edge weight, saturating at `u64::MAX`.
	pub fn total_weight(&self) -> u64 {
		self.table.values().map(Transitions::total).fold(0, u64::saturating_add)
	}

	/// Compiles the model for sampling. The model itself is left untouched.
	pub fn compile(&self) -> CompiledModel {
		CompiledModel::compile(self)
	}

	/// Adds one sentence to the table.
	///
	/// The sentence is padded with `state_size` `Start`s and one `End`, then
	/// a window of `state_size` slides over it, each position adding one
	/// observation of the token that follows the window.
	///
	/// Sentences with no words, or containing sentinels, are skipped.
	/// Returns whether the sentence was used.
	pub(crate) fn add_sentence(&mut self, sentence: &[Token]) -> bool {
		if sentence.is_empty() || sentence.iter().any(Token::is_sentinel) {
			return false;
		}

		let mut padded = Vec::with_capacity(self.state_size + sentence.len() + 1);
		padded.resize(self.state_size, Token::Start);
		padded.extend_from_slice(sentence);
		padded.push(Token::End);

		for window in padded.windows(self.state_size + 1) {
			let (key, next) = window.split_at(self.state_size);
			self.table
				.entry(State::new(key.to_vec()))
				.or_default()
				.add_transition(next[0].clone());
		}

		if let Some(retained) = self.retained.as_mut() {
			retained.push(sentence.to_vec());
		}
		true
	}

	/// Merges another model into this one, consuming it.
	///
	/// Weights of matching edges are summed, new states and edges are
	/// inserted. Retained sentences survive only when both sides keep them.
	///
	/// # Errors
	/// - `IncompatibleStateSize` if the widths differ
	/// - `WeightOverflow` if a shared state's summed weights exceed `u64::MAX`
	///
	/// `self` is left unchanged on error.
	pub fn absorb(&mut self, other: Model) -> Result<()> {
		self.check_compatible(&other)?;
		self.check_weights_fit(&other.table)?;

		if self.table.is_empty() && self.retained.is_none() && other.retained.is_none() {
			self.table = other.table;
			return Ok(());
		}

		for (state, transitions) in other.table {
			match self.table.get_mut(&state) {
				Some(existing) => existing.merge(&transitions)?,
				None => {
					self.table.insert(state, transitions);
				}
			}
		}
		self.merge_retained(other.retained);
		Ok(())
	}

	/// Merges another model into this one without consuming it.
	///
	/// # Errors
	/// Same as `absorb`; `self` is left unchanged on error.
	pub fn merge_from(&mut self, other: &Model) -> Result<()> {
		self.check_compatible(other)?;
		self.check_weights_fit(&other.table)?;

		for (state, transitions) in &other.table {
			if let Some(existing) = self.table.get_mut(state) {
				existing.merge(transitions)?;
			} else {
				self.table.insert(state.clone(), transitions.clone());
			}
		}
		self.merge_retained(other.retained.clone());
		Ok(())
	}

	fn check_compatible(&self, other: &Model) -> Result<()> {
		if self.state_size != other.state_size {
			return Err(MarkovError::IncompatibleStateSize {
				expected: self.state_size,
				found: other.state_size,
			});
		}
		Ok(())
	}

	/// Checked up front so a failing merge never leaves `self` half-updated.
	fn check_weights_fit(&self, other: &TransitionTable) -> Result<()> {
		for (state, theirs) in other {
			if let Some(mine) = self.table.get(state) {
				if !mine.fits(theirs.total()) {
					return Err(MarkovError::WeightOverflow(format!("state {state} exceeds u64::MAX")));
				}
			}
		}
		Ok(())
	}

	fn merge_retained(&mut self, other: Option<Vec<Vec<Token>>>) {
		let Some(mine) = self.retained.as_mut() else {
			if let Some(theirs) = other.filter(|t| !t.is_empty()) {
				warn!("Dropping {} retained sentences, target model does not retain", theirs.len());
			}
			return;
		};
		match other {
			Some(theirs) => mine.extend(theirs),
			None => {
				warn!("Merged model does not retain sentences, dropping {} retained", mine.len());
				self.retained = None;
			}
		}
	}
}

/// Merges any number of models of width `state_size` into one.
///
/// - Zero models yield an empty model.
/// - One model is returned with its table unchanged.
/// - Otherwise edge weights are summed; the result does not depend on the
///   order or grouping of the inputs.
///
/// # Errors
/// Returns `IncompatibleStateSize` if any input has a different width,
/// `WeightOverflow` if summed weights do not fit, or `InvalidStateSize` if
/// `state_size == 0`.
pub fn merge<I>(state_size: usize, models: I) -> Result<Model>
where
	I: IntoIterator<Item = Model>,
{
	let mut models = models.into_iter();
	let mut merged = match models.next() {
		Some(first) => first,
		None => return Model::new(state_size),
	};
	if merged.state_size != state_size {
		return Err(MarkovError::IncompatibleStateSize { expected: state_size, found: merged.state_size });
	}
	for model in models {
		merged.absorb(model)?;
	}
	Ok(merged)
}

/// Accumulates sentences into a model it owns exclusively.
///
/// The builder is a pure reduction over the sentences it is given, so a
/// caller can feed one bounded batch, `finish`, hand the model to the
/// merger and drop the batch before reading the next one.
#[derive(Debug)]
pub struct ChainBuilder {
	model: Model,
	sentences: usize,
	skipped: usize,
}

impl ChainBuilder {
	/// # Errors
	/// Returns `InvalidStateSize` if `state_size == 0`.
	pub fn new(state_size: usize, retain_sentences: bool) -> Result<Self> {
		Ok(Self {
			model: Model::with_retention(state_size, retain_sentences)?,
			sentences: 0,
			skipped: 0,
		})
	}

	pub fn state_size(&self) -> usize {
		self.model.state_size
	}

	/// Feeds one sentence. Returns whether it was used.
	pub fn add_sentence(&mut self, sentence: &[Token]) -> bool {
		let used = self.model.add_sentence(sentence);
		if used {
			self.sentences += 1;
		} else {
			self.skipped += 1;
		}
		used
	}

	/// Feeds many sentences, returning how many were used.
	pub fn add_sentences<I, S>(&mut self, sentences: I) -> usize
	where
		I: IntoIterator<Item = S>,
		S: AsRef<[Token]>,
	{
		sentences
			.into_iter()
			.filter(|s| self.add_sentence(s.as_ref()))
			.count()
	}

	/// Number of sentences used so far.
	pub fn sentence_count(&self) -> usize {
		self.sentences
	}

	pub fn skipped_count(&self) -> usize {
		self.skipped
	}

	/// Yields the built model. The builder is consumed.
	pub fn finish(self) -> Model {
		self.model
	}
}

/// Builds a transition table from a corpus of tokenized sentences.
///
/// # Errors
/// Returns `InvalidStateSize` if `state_size == 0`.
pub fn build<I, S>(corpus: I, state_size: usize) -> Result<Model>
where
	I: IntoIterator<Item = S>,
	S: AsRef<[Token]>,
{
	let mut builder = ChainBuilder::new(state_size, false)?;
	builder.add_sentences(corpus);
	Ok(builder.finish())
}
