//! Top-level module for the Markov chain engine.
//!
//! This module provides a word-level n-gram text generator, including:
//! - Tokens, sentinels and n-gram keys (`Token`, `State`)
//! - Text splitting and rendering (`Tokenizer`)
//! - Transition tables, the chain builder and the merger (`Model`, `ChainBuilder`)
//! - The sampling-ready form (`CompiledModel`)
//! - Constrained generation (`Generator`, `GenerationConfig`)
//! - Persistence (`Portable`, `from_portable`)

/// Atomic tokens and fixed-width states.
pub mod token;

/// Whitespace tokenizer with sentence-terminator handling.
///
/// Turns raw text units into sentences for training, and generated
/// tokens back into text.
pub mod tokenizer;

/// Outgoing edge counts of a single state.
///
/// Supports accumulation during learning and merging.
pub mod transitions;

/// Transition table, chain builder and merge operator.
///
/// Handles sentence ingestion, transition counting and model merging.
pub mod chain;

/// Cumulative-weight rows for O(log k) weighted sampling.
pub mod compiled;

/// Retained-sentence index backing the overlap check.
pub mod overlap;

/// Generation parameters.
pub mod generation_config;

/// Free, seeded and length-bounded generation over a compiled model.
pub mod generator;

/// JSON and binary encodings of a model.
pub mod serializer;
