use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::chain::{Model, TransitionTable};
use super::compiled::CompiledModel;
use super::token::{State, Token};
use super::transitions::Transitions;
use crate::error::{MarkovError, Result};

const FORMAT_VERSION: u32 = 1;

/// Encodings of a persisted model.
///
/// - `Json`: human-readable text, via `serde_json`
/// - `Binary`: compact bytes, via `postcard`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
	Json,
	Binary,
}

impl Format {
	/// Guesses the encoding from the payload: JSON always opens with `{`,
	/// a postcard payload opens with the version varint.
	pub fn detect(bytes: &[u8]) -> Self {
		match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
			Some(b'{') => Format::Json,
			_ => Format::Binary,
		}
	}
}

/// On-disk shape of a model. Chain entries and retained sentences are
/// sorted so the same model always encodes to the same bytes, whatever
/// order parallel training merged its parts in.
#[derive(Serialize, Deserialize, Debug)]
struct PortableModel {
	version: u32,
	state_size: usize,
	chain: Vec<PortableEntry>,
	retained: Option<Vec<Vec<Token>>>,
}

#[derive(Serialize, Deserialize, Debug)]
struct PortableEntry {
	state: Vec<Token>,
	next: Vec<(Token, u64)>,
}

/// Conversion to the persisted representation.
///
/// Compiled models are decompiled first: merging needs raw weights, and the
/// cumulative rows are cheap to rebuild on load.
pub trait Portable {
	fn to_portable(&self, format: Format) -> Result<Vec<u8>>;
}

impl Portable for Model {
	fn to_portable(&self, format: Format) -> Result<Vec<u8>> {
		let mut chain: Vec<PortableEntry> = self
			.table()
			.iter()
			.map(|(state, transitions)| PortableEntry {
				state: state.tokens().to_vec(),
				next: transitions.sorted().into_iter().map(|(t, w)| (t.clone(), w)).collect(),
			})
			.collect();
		chain.sort_by(|a, b| a.state.cmp(&b.state));

		let retained = self.retained_sentences().map(|sentences| {
			let mut sorted = sentences.to_vec();
			sorted.sort();
			sorted
		});

		let portable = PortableModel { version: FORMAT_VERSION, state_size: self.state_size(), chain, retained };

		match format {
			Format::Json => serde_json::to_vec(&portable).map_err(|e| MarkovError::Encode(e.to_string())),
			Format::Binary => postcard::to_stdvec(&portable).map_err(|e| MarkovError::Encode(e.to_string())),
		}
	}
}

impl Portable for CompiledModel {
	fn to_portable(&self, format: Format) -> Result<Vec<u8>> {
		self.decompile().to_portable(format)
	}
}

/// Restores a model from its persisted representation.
///
/// The whole payload is validated before a model is returned, so a caller
/// never sees a partially loaded table.
///
/// # Errors
/// Returns `MalformedPersistedModel` if the payload does not decode, or
/// decodes into an inconsistent table:
/// - unknown version, or `state_size == 0`
/// - a state of the wrong width, with misplaced sentinels, or repeated
/// - an empty edge list, a zero weight, a repeated or `Start` next token
/// - a state whose weights sum past `u64::MAX`
/// - a retained sentence containing sentinels
pub fn from_portable(bytes: &[u8], format: Format) -> Result<Model> {
	let portable: PortableModel = match format {
		Format::Json => serde_json::from_slice(bytes).map_err(malformed)?,
		Format::Binary => postcard::from_bytes(bytes).map_err(malformed)?,
	};

	if portable.version != FORMAT_VERSION {
		return Err(malformed(format!("unsupported version {}", portable.version)));
	}
	let state_size = portable.state_size;
	if state_size == 0 {
		return Err(malformed("state_size must be >= 1"));
	}

	let mut table: TransitionTable = HashMap::with_capacity(portable.chain.len());
	for entry in portable.chain {
		let state = State::new(entry.state);
		if state.len() != state_size {
			return Err(malformed(format!("state {state} has width {}, expected {state_size}", state.len())));
		}
		if !state.is_well_formed() {
			return Err(malformed(format!("state {state} has misplaced sentinels")));
		}
		if entry.next.is_empty() {
			return Err(malformed(format!("state {state} has no transitions")));
		}

		let mut transitions = Transitions::new();
		for (token, weight) in entry.next {
			if weight == 0 {
				return Err(malformed(format!("zero weight on {state} -> {token}")));
			}
			if token == Token::Start {
				return Err(malformed(format!("state {state} transitions to the start sentinel")));
			}
			if transitions.weight(&token) != 0 {
				return Err(malformed(format!("repeated transition {state} -> {token}")));
			}
			transitions
				.add_weight(token, weight)
				.map_err(|_| malformed(format!("total weight of {state} exceeds u64::MAX")))?;
		}

		if table.contains_key(&state) {
			return Err(malformed(format!("repeated state {state}")));
		}
		table.insert(state, transitions);
	}

	if let Some(sentences) = &portable.retained {
		if sentences.iter().flatten().any(Token::is_sentinel) {
			return Err(malformed("retained sentence contains a sentinel"));
		}
	}

	Ok(Model::from_parts(state_size, table, portable.retained))
}

fn malformed<E: ToString>(err: E) -> MarkovError {
	MarkovError::MalformedPersistedModel(err.to_string())
}
