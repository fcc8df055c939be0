//! Markov chain text generation library.
//!
//! This crate provides a word-level n-gram engine including:
//! - Chain building from streamed, batched corpora
//! - Order-independent merging of partial models
//! - Compilation into a sampling-ready form
//! - Free, seeded and length-bounded generation with overlap rejection
//! - JSON / binary persistence
//!
//! # Example
//! ```
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use rs_markov_core::model::chain::build;
//! use rs_markov_core::model::generator::Generator;
//! use rs_markov_core::model::tokenizer::Tokenizer;
//!
//! let tokenizer = Tokenizer::default();
//! let corpus = ["the cat sat", "the cat ran"].map(|s| tokenizer.tokenize(s));
//! let compiled = build(corpus, 2).unwrap().compile();
//!
//! let generator = Generator::new(&compiled);
//! let mut rng = StdRng::seed_from_u64(1);
//! let sentence = generator.render(&generator.generate(&mut rng, 10).unwrap());
//! assert!(sentence == "the cat sat" || sentence == "the cat ran");
//! ```

/// Error type shared by every operation.
pub mod error;

/// Core n-gram models and generation logic.
pub mod model;

/// Batched and parallel training over text units.
pub mod training;

/// I/O utilities (batched line reading, model files).
pub mod io;

pub use error::{MarkovError, Result};
