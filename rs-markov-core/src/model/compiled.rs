use std::collections::{BTreeMap, HashMap};

use rand::Rng;

use super::chain::{Model, TransitionTable};
use super::overlap::OverlapIndex;
use super::token::{State, Token};
use super::transitions::Transitions;

/// Frozen outgoing distribution of one state.
///
/// Tokens are sorted, `cumulative[i]` is the sum of the weights of
/// `tokens[..=i]`, so the last entry is the total weight. `Transitions`
/// keeps its total within `u64`, so the running sum cannot overflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
	tokens: Vec<Token>,
	cumulative: Vec<u64>,
}

impl Row {
	fn from_transitions(transitions: &Transitions) -> Self {
		let edges = transitions.sorted();
		let mut tokens = Vec::with_capacity(edges.len());
		let mut cumulative = Vec::with_capacity(edges.len());
		let mut running = 0u64;
		for (token, weight) in edges {
			running += weight;
			tokens.push(token.clone());
			cumulative.push(running);
		}
		Self { tokens, cumulative }
	}

	pub fn total(&self) -> u64 {
		self.cumulative.last().copied().unwrap_or(0)
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	/// Raw per-edge weights, recovered as differences of consecutive
	/// cumulative entries.
	pub fn weights(&self) -> impl Iterator<Item = (&Token, u64)> + '_ {
		let previous = std::iter::once(0).chain(self.cumulative.iter().copied());
		self.tokens
			.iter()
			.zip(self.cumulative.iter().zip(previous))
			.map(|(token, (c, p))| (token, c - p))
	}

	/// Draws a token with probability proportional to its weight.
	///
	/// Picks `r` uniformly in `[1, total]` and returns the first token
	/// whose cumulative weight is `>= r` (binary search).
	pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Token> {
		let total = self.total();
		if total == 0 {
			return None;
		}
		let draw = rng.random_range(1..=total);
		let index = self.cumulative.partition_point(|&c| c < draw);
		self.tokens.get(index)
	}
}

/// Read-only, sampling-ready form of a `Model`.
///
/// Rows live in a `BTreeMap` so every walk over states (seed lookup,
/// decompilation, persistence) sees them in the same order. Randomness only
/// ever comes from the RNG handed to `Row::sample`.
///
/// A compiled model owns its data: it never aliases the table it was built
/// from, and is `Send + Sync`, so one instance can serve any number of
/// concurrent generators.
#[derive(Clone, Debug)]
pub struct CompiledModel {
	state_size: usize,
	rows: BTreeMap<State, Row>,
	overlap: Option<OverlapIndex>,
}

impl CompiledModel {
	/// Freezes every state of `model` into a cumulative row.
	///
	/// Pure: `model` is not modified and can be compiled again.
	pub fn compile(model: &Model) -> Self {
		let rows = model
			.table()
			.iter()
			.filter(|(_, transitions)| !transitions.is_empty())
			.map(|(state, transitions)| (state.clone(), Row::from_transitions(transitions)))
			.collect();
		let overlap = model
			.retained_sentences()
			.map(|sentences| OverlapIndex::new(model.state_size(), sentences.to_vec()));

		Self { state_size: model.state_size(), rows, overlap }
	}

	pub fn state_size(&self) -> usize {
		self.state_size
	}

	pub fn state_count(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn row(&self, state: &State) -> Option<&Row> {
		self.rows.get(state)
	}

	pub fn contains_state(&self, state: &State) -> bool {
		self.rows.contains_key(state)
	}

	/// Index over retained sentences, `None` when the model was trained
	/// without retention (overlap rejection disabled).
	pub fn overlap(&self) -> Option<&OverlapIndex> {
		self.overlap.as_ref()
	}

	/// Draws the token following `state`. `None` means a dead end.
	pub fn sample<R: Rng + ?Sized>(&self, state: &State, rng: &mut R) -> Option<&Token> {
		self.rows.get(state)?.sample(rng)
	}

	/// States whose trailing tokens equal `seed`, in key order.
	pub fn states_ending_with(&self, seed: &[Token]) -> Vec<&State> {
		self.rows.keys().filter(|state| state.ends_with(seed)).collect()
	}

	/// Recovers the raw transition table so the model can be merged or
	/// persisted again.
	pub fn decompile(&self) -> Model {
		let table: TransitionTable = self
			.rows
			.iter()
			.map(|(state, row)| {
				let edges: HashMap<Token, u64> = row.weights().map(|(t, w)| (t.clone(), w)).collect();
				(state.clone(), Transitions::from_edges(edges, row.total()))
			})
			.collect();
		let retained = self.overlap.as_ref().map(|o| o.sentences().to_vec());
		Model::from_parts(self.state_size, table, retained)
	}

	/// Iterates rows in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&State, &Row)> {
		self.rows.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::chain::build;
	use crate::model::tokenizer::Tokenizer;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn model(lines: &[&str], state_size: usize) -> Model {
		let tokenizer = Tokenizer::default();
		build(lines.iter().map(|l| tokenizer.tokenize(l)), state_size).unwrap()
	}

	#[test]
	fn test_cumulative_rows() {
		let m = model(&["a b", "a c", "a c"], 1);
		let compiled = m.compile();
		let row = compiled.row(&State::from_words(&["a"])).unwrap();
		assert_eq!(row.total(), 3);
		let weights: Vec<(String, u64)> = row.weights().map(|(t, w)| (t.to_string(), w)).collect();
		assert_eq!(weights, vec![("b".to_owned(), 1), ("c".to_owned(), 2)]);
	}

	#[test]
	fn test_compile_is_pure_and_repeatable() {
		let m = model(&["the cat sat", "the dog sat"], 2);
		let before = m.table().clone();
		let first = m.compile();
		let second = m.compile();
		assert_eq!(m.table(), &before);
		assert_eq!(first.rows, second.rows);
	}

	#[test]
	fn test_decompile_recovers_weights() {
		let m = model(&["x y z", "x y w", "x y z"], 2);
		let back = m.compile().decompile();
		assert_eq!(back.table(), m.table());
		assert_eq!(back.state_size(), 2);
	}

	#[test]
	fn test_sample_respects_weights() {
		let m = model(&["a b", "a c", "a c", "a c"], 1);
		let compiled = m.compile();
		let state = State::from_words(&["a"]);
		let mut rng = StdRng::seed_from_u64(7);
		let mut c_count = 0;
		for _ in 0..4000 {
			if compiled.sample(&state, &mut rng) == Some(&Token::word("c")) {
				c_count += 1;
			}
		}
		// expected 3000
		assert!((2800..3200).contains(&c_count), "c drawn {c_count} times");
	}

	#[test]
	fn test_sample_deterministic_for_seed() {
		let compiled = model(&["a b", "a c", "a d", "a e"], 1).compile();
		let state = State::from_words(&["a"]);
		let draw = |seed| {
			let mut rng = StdRng::seed_from_u64(seed);
			(0..20).map(|_| compiled.sample(&state, &mut rng).cloned()).collect::<Vec<_>>()
		};
		assert_eq!(draw(42), draw(42));
	}

	#[test]
	fn test_states_ending_with() {
		let compiled = model(&["the cat sat", "a cat ran"], 2).compile();
		let seed = [Token::word("cat")];
		let found = compiled.states_ending_with(&seed);
		assert_eq!(found.len(), 2);
		assert!(found.contains(&&State::from_words(&["the", "cat"])));
		assert!(found.contains(&&State::from_words(&["a", "cat"])));
	}

	#[test]
	fn test_unknown_state_is_dead_end() {
		let compiled = model(&["a b"], 1).compile();
		let mut rng = StdRng::seed_from_u64(1);
		assert!(compiled.sample(&State::from_words(&["zzz"]), &mut rng).is_none());
	}
}
