use std::sync::mpsc;
use std::thread;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, Result};
use crate::model::chain::{ChainBuilder, Model};
use crate::model::compiled::CompiledModel;
use crate::model::tokenizer::{Tokenizer, TokenizerConfig};

/// Training parameters.
///
/// # Fields
/// - `state_size`: width of the n-gram window (2 is loose, 3 reads better)
/// - `batch_size`: units trained between two merges into the accumulated
///   model by `Trainer::ingest`
/// - `retain_original`: keep source sentences for the overlap check.
///   Memory grows with the corpus, leave off for large inputs.
/// - `shards`: partial models built in parallel per batch
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
	pub state_size: usize,
	pub batch_size: usize,
	pub retain_original: bool,
	pub shards: usize,
	pub tokenizer: TokenizerConfig,
}

impl Default for TrainingConfig {
	fn default() -> Self {
		Self {
			state_size: 2,
			batch_size: 50_000,
			retain_original: false,
			shards: num_cpus::get() * 8,
			tokenizer: TokenizerConfig::default(),
		}
	}
}

/// Builds a model from raw text units on the calling thread.
///
/// Each unit is split into sentences; ill-formed units are skipped.
pub fn build_unit_model<S: AsRef<str>>(
	units: &[S],
	tokenizer: &Tokenizer,
	state_size: usize,
	retain_original: bool,
) -> Result<Model> {
	let mut builder = ChainBuilder::new(state_size, retain_original)?;
	for unit in units {
		for sentence in tokenizer.training_sentences(unit.as_ref()) {
			builder.add_sentence(&sentence);
		}
	}
	debug!("Shard built: {} sentences, {} skipped", builder.sentence_count(), builder.skipped_count());
	Ok(builder.finish())
}

/// Splits `units` into `config.shards` chunks, builds one partial model per
/// chunk on its own thread, and merges the partial models as they arrive.
///
/// Arrival order does not matter: merging is commutative and associative.
///
/// # Notes
/// - Uses an MPSC channel to collect models from scoped threads, so shards
///   borrow `units` instead of copying them.
pub fn train_parallel<S: AsRef<str> + Sync>(units: &[S], config: &TrainingConfig) -> Result<Model> {
	let mut merged = Model::with_retention(config.state_size, config.retain_original)?;
	if units.is_empty() {
		return Ok(merged);
	}

	let tokenizer = Tokenizer::new(config.tokenizer.clone());
	let shards = config.shards.max(1);
	let chunk_size = units.len().div_ceil(shards);

	let (tx, rx) = mpsc::channel();
	thread::scope(|scope| -> Result<()> {
		for chunk in units.chunks(chunk_size) {
			let tx = tx.clone();
			let tokenizer = &tokenizer;
			scope.spawn(move || {
				let partial = build_unit_model(chunk, tokenizer, config.state_size, config.retain_original);
				if tx.send(partial).is_err() {
					warn!("Shard result dropped: receiver closed");
				}
			});
		}
		drop(tx);

		for partial in rx.iter() {
			merged.absorb(partial?)?;
		}
		Ok(())
	})?;

	Ok(merged)
}

/// Batched trainer over a stream of text units.
///
/// The accumulated model is valid after every completed batch: a batch is
/// fully built before it is merged, and an interrupted run can compile or
/// persist whatever has been merged so far.
#[derive(Debug)]
pub struct Trainer {
	config: TrainingConfig,
	model: Model,
	units: usize,
	batches: usize,
}

impl Trainer {
	/// # Errors
	/// Returns `InvalidStateSize` if `config.state_size == 0`, or
	/// `InvalidConfig` if `config.batch_size == 0`.
	pub fn new(config: TrainingConfig) -> Result<Self> {
		if config.batch_size == 0 {
			return Err(MarkovError::InvalidConfig("batch_size must be >= 1".to_owned()));
		}
		let model = Model::with_retention(config.state_size, config.retain_original)?;
		Ok(Self { config, model, units: 0, batches: 0 })
	}

	pub fn config(&self) -> &TrainingConfig {
		&self.config
	}

	/// Trains on one batch and merges it into the accumulated model.
	///
	/// On error the accumulated model is unchanged.
	pub fn ingest_batch<S: AsRef<str> + Sync>(&mut self, batch: &[S]) -> Result<()> {
		if batch.is_empty() {
			return Ok(());
		}
		let partial = train_parallel(batch, &self.config)?;
		self.model.absorb(partial)?;
		self.units += batch.len();
		self.batches += 1;
		info!(
			"Progress: {} units merged in {} batches ({} states)",
			self.units,
			self.batches,
			self.model.state_count()
		);
		Ok(())
	}

	/// Trains on `units` in batches of `config.batch_size`, merging each
	/// batch before the next one is built.
	///
	/// On error, batches merged before the failing one are kept.
	pub fn ingest<S: AsRef<str> + Sync>(&mut self, units: &[S]) -> Result<()> {
		for batch in units.chunks(self.config.batch_size) {
			self.ingest_batch(batch)?;
		}
		Ok(())
	}

	/// The model accumulated so far.
	pub fn model(&self) -> &Model {
		&self.model
	}

	pub fn units_seen(&self) -> usize {
		self.units
	}

	pub fn batches(&self) -> usize {
		self.batches
	}

	/// Compiles the current state of training.
	pub fn snapshot(&self) -> CompiledModel {
		self.model.compile()
	}

	pub fn finish(self) -> Model {
		self.model
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(shards: usize) -> TrainingConfig {
		TrainingConfig { state_size: 2, batch_size: 3, retain_original: false, shards, tokenizer: TokenizerConfig::default() }
	}

	fn corpus() -> Vec<String> {
		[
			"the cat sat on the mat.",
			"the dog sat on the log.",
			"a cat and a dog. they sat together!",
			"(ignored unit)",
			"nobody sat on the cat",
			"",
			"the end",
		]
		.iter()
		.map(|s| s.to_string())
		.collect()
	}

	#[test]
	fn test_parallel_matches_sequential() {
		let units = corpus();
		let tokenizer = Tokenizer::default();
		let sequential = build_unit_model(&units, &tokenizer, 2, false).unwrap();
		for shards in [1, 2, 3, 16] {
			let parallel = train_parallel(&units, &config(shards)).unwrap();
			assert_eq!(parallel.table(), sequential.table(), "shards={shards}");
		}
	}

	#[test]
	fn test_trainer_batches_match_whole() {
		let units = corpus();
		let whole = train_parallel(&units, &config(4)).unwrap();

		let mut trainer = Trainer::new(config(2)).unwrap();
		for batch in units.chunks(3) {
			trainer.ingest_batch(batch).unwrap();
		}
		assert_eq!(trainer.batches(), 3);
		assert_eq!(trainer.units_seen(), units.len());
		assert_eq!(trainer.finish().table(), whole.table());
	}

	#[test]
	fn test_ingest_splits_by_batch_size() {
		let units = corpus();
		let whole = train_parallel(&units, &config(4)).unwrap();

		let mut trainer = Trainer::new(config(2)).unwrap();
		trainer.ingest(&units).unwrap();
		// 7 units, batch_size 3
		assert_eq!(trainer.batches(), 3);
		assert_eq!(trainer.units_seen(), 7);
		assert_eq!(trainer.finish().table(), whole.table());
	}

	#[test]
	fn test_zero_batch_size_is_rejected() {
		let cfg = TrainingConfig { batch_size: 0, ..config(1) };
		assert!(matches!(Trainer::new(cfg), Err(MarkovError::InvalidConfig(_))));
	}

	#[test]
	fn test_trainer_is_usable_between_batches() {
		let units = corpus();
		let mut trainer = Trainer::new(config(2)).unwrap();
		assert!(trainer.snapshot().is_empty());
		trainer.ingest_batch(&units[..2]).unwrap();
		let snapshot = trainer.snapshot();
		assert!(!snapshot.is_empty());
		trainer.ingest_batch(&units[2..]).unwrap();
		assert!(trainer.snapshot().state_count() > snapshot.state_count());
	}

	#[test]
	fn test_empty_input() {
		let empty: Vec<String> = Vec::new();
		assert!(train_parallel(&empty, &config(4)).unwrap().is_empty());
		let mut trainer = Trainer::new(config(4)).unwrap();
		trainer.ingest_batch(&empty).unwrap();
		assert_eq!(trainer.batches(), 0);
	}

	#[test]
	fn test_retention_survives_parallel_merge() {
		let units = corpus();
		let cfg = TrainingConfig { retain_original: true, ..config(3) };
		let model = train_parallel(&units, &cfg).unwrap();
		// 7 units: 1 ill-formed, 1 empty, one holding two sentences
		assert_eq!(model.retained_sentences().map(<[_]>::len), Some(6));
	}
}
