use std::collections::HashMap;

use super::token::Token;
use crate::error::{MarkovError, Result};

/// Outgoing edges of one state in the transition table.
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Responsibilities:
/// - Accumulate transition occurrences during learning
/// - Merge with the edges of the same state from another table
///
/// Sampling never happens here: the map has no stable iteration order, so
/// the compiler freezes it into a sorted cumulative row first.
///
/// ## Invariants
/// - Each weight is strictly positive
/// - `Start` is never a next token
/// - The sum of all weights fits in a `u64`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transitions {
	/// Example: { "sat" => 42, "ran" => 3 }
	edges: HashMap<Token, u64>,
	total: u64,
}

impl Transitions {
	pub fn new() -> Self {
		Self { edges: HashMap::new(), total: 0 }
	}

	/// Rebuilds a node from edges whose sum is already known to be `total`.
	pub(crate) fn from_edges(edges: HashMap<Token, u64>, total: u64) -> Self {
		Self { edges, total }
	}

	/// Records one occurrence of a transition toward `next`.
	///
	/// A node whose total already reached `u64::MAX` ignores the observation.
	pub fn add_transition(&mut self, next: Token) {
		if self.total < u64::MAX {
			self.insert(next, 1);
		}
	}

	/// Adds `weight` observations of `next`. A zero weight is ignored so the
	/// positive-weight invariant holds.
	///
	/// # Errors
	/// Returns `WeightOverflow` if the total would exceed `u64::MAX`; the
	/// node is left unchanged.
	pub fn add_weight(&mut self, next: Token, weight: u64) -> Result<()> {
		if weight == 0 {
			return Ok(());
		}
		if !self.fits(weight) {
			return Err(MarkovError::WeightOverflow(format!("adding {weight} toward {next}")));
		}
		self.insert(next, weight);
		Ok(())
	}

	/// Sums another state's edges into this one (absent edges count as 0).
	///
	/// # Errors
	/// Returns `WeightOverflow` if the combined total would exceed
	/// `u64::MAX`; the node is left unchanged.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if !self.fits(other.total) {
			return Err(MarkovError::WeightOverflow(format!(
				"merging totals {} and {}",
				self.total, other.total
			)));
		}
		for (next, weight) in &other.edges {
			self.insert(next.clone(), *weight);
		}
		Ok(())
	}

	/// Whether `weight` more observations keep the total within `u64`.
	pub fn fits(&self, weight: u64) -> bool {
		self.total.checked_add(weight).is_some()
	}

	// every edge is bounded by the total, so only the total needs checking
	fn insert(&mut self, next: Token, weight: u64) {
		*self.edges.entry(next).or_insert(0) += weight;
		self.total += weight;
	}

	/// Weight of the edge toward `next`, 0 when absent.
	pub fn weight(&self, next: &Token) -> u64 {
		self.edges.get(next).copied().unwrap_or(0)
	}

	pub fn total(&self) -> u64 {
		self.total
	}

	pub fn len(&self) -> usize {
		self.edges.len()
	}

	pub fn is_empty(&self) -> bool {
		self.edges.is_empty()
	}

	/// Edges sorted by token, the deterministic order used everywhere a
	/// sequence is produced from this node.
	pub fn sorted(&self) -> Vec<(&Token, u64)> {
		let mut edges: Vec<(&Token, u64)> = self.edges.iter().map(|(t, w)| (t, *w)).collect();
		edges.sort_by(|a, b| a.0.cmp(b.0));
		edges
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_add_and_merge() {
		let mut a = Transitions::new();
		a.add_transition(Token::word("c"));

		let mut b = Transitions::new();
		b.add_weight(Token::word("c"), 2).unwrap();
		b.add_transition(Token::word("d"));

		a.merge(&b).unwrap();
		assert_eq!(a.weight(&Token::word("c")), 3);
		assert_eq!(a.weight(&Token::word("d")), 1);
		assert_eq!(a.weight(&Token::word("e")), 0);
		assert_eq!(a.total(), 4);
	}

	#[test]
	fn test_zero_weight_ignored() {
		let mut t = Transitions::new();
		t.add_weight(Token::End, 0).unwrap();
		assert!(t.is_empty());
	}

	#[test]
	fn test_total_overflow_is_rejected() {
		let mut t = Transitions::new();
		t.add_weight(Token::word("a"), u64::MAX).unwrap();
		let before = t.clone();

		let result = t.add_weight(Token::word("b"), 2);
		assert!(matches!(result, Err(MarkovError::WeightOverflow(_))));
		assert_eq!(t, before);

		let mut other = Transitions::new();
		other.add_transition(Token::word("a"));
		assert!(matches!(t.merge(&other), Err(MarkovError::WeightOverflow(_))));
		assert_eq!(t, before);

		t.add_transition(Token::End);
		assert_eq!(t, before);
		assert_eq!(t.total(), u64::MAX);
	}

	#[test]
	fn test_sorted_is_deterministic() {
		let mut t = Transitions::new();
		for w in ["zeta", "alpha", "mid"] {
			t.add_transition(Token::word(w));
		}
		t.add_transition(Token::End);
		let order: Vec<String> = t.sorted().iter().map(|(tok, _)| tok.to_string()).collect();
		assert_eq!(order, vec!["<END>", "alpha", "mid", "zeta"]);
	}
}
