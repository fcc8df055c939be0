use std::path::PathBuf;

use clap::Parser;
use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use rs_markov_core::io::{build_output_path, format_for_path, read_batches, save_model};
use rs_markov_core::model::generator::Generator;
use rs_markov_core::training::{Trainer, TrainingConfig};

/// Trains a Markov chain model from a line-oriented text corpus.
///
/// Each line is one unit (a message, a post). Lines are streamed in batches,
/// each batch is trained in parallel shards and merged into the model.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Corpus file, one unit per line
	input: PathBuf,

	/// Model file to write (`.json` for text, anything else for binary).
	/// Defaults to the input path with a `.json` extension.
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Width of the n-gram window
	#[arg(long, default_value_t = 2)]
	state_size: usize,

	/// Units read between two merges
	#[arg(long, default_value_t = 50_000)]
	batch_size: usize,

	/// Parallel shards per batch (defaults to CPU count x 8)
	#[arg(long)]
	shards: Option<usize>,

	/// Keep source sentences in the model for the overlap check
	#[arg(long)]
	retain_original: bool,

	/// Keep only units longer than this many characters after cleaning
	#[arg(long, default_value_t = 20)]
	min_chars: usize,

	/// Stop after this many units
	#[arg(long)]
	limit: Option<usize>,

	/// Sample sentences printed after training
	#[arg(long, default_value_t = 5)]
	samples: usize,

	/// RNG seed for the samples
	#[arg(long)]
	seed: Option<u64>,
}

/// Units that are removal notices or bot boilerplate rather than text.
const JUNK_MARKERS: &[&str] = &[
	"I am a bot",
	"automatically removed",
	"[removed]",
	"[deleted]",
	"Hi! Thank-you for your comment",
];

/// Markdown characters stripped from every unit.
const MARKDOWN_CHARS: &[char] = &['*', '_', '~', '>', '`', '#'];

/// Cleans one corpus unit, or drops it.
///
/// - Junk units (removal notices, bot replies) are dropped
/// - Links and `/u/`, `/r/` tags are removed, they only add unique tokens
/// - Markdown characters are stripped and whitespace normalized
/// - Units of `min_chars` characters or fewer are dropped
fn clean_unit(line: &str, min_chars: usize) -> Option<String> {
	if JUNK_MARKERS.iter().any(|marker| line.contains(marker)) {
		return None;
	}
	let text = line
		.split_whitespace()
		.map(strip_tags)
		.map(|w| w.replace(MARKDOWN_CHARS, ""))
		.filter(|w| !w.is_empty())
		.collect::<Vec<_>>()
		.join(" ");
	(text.chars().count() > min_chars).then_some(text)
}

/// Cuts a word at the first link or user/subreddit tag.
fn strip_tags(word: &str) -> &str {
	let cut = ["http", "/u/", "/r/"].iter().filter_map(|tag| word.find(tag)).min();
	match cut {
		Some(at) => &word[..at],
		None => word,
	}
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	let output = match &args.output {
		Some(path) => path.clone(),
		None => build_output_path(&args.input, "json")?,
	};

	let mut config = TrainingConfig {
		state_size: args.state_size,
		batch_size: args.batch_size,
		retain_original: args.retain_original,
		..TrainingConfig::default()
	};
	if let Some(shards) = args.shards {
		config.shards = shards;
	}
	let mut trainer = Trainer::new(config)?;

	info!("Reading {}...", args.input.display());
	let limit = args.limit.unwrap_or(usize::MAX);
	let mut read = 0usize;
	for batch in read_batches(&args.input, trainer.config().batch_size)? {
		let batch = match batch {
			Ok(batch) => batch,
			Err(e) => {
				// keep what was merged so far
				warn!("Read error, stopping early: {e}");
				break;
			}
		};
		let remaining = limit - read;
		let units: Vec<String> = batch
			.iter()
			.take(remaining)
			.filter_map(|line| clean_unit(line, args.min_chars))
			.collect();
		read += batch.len().min(remaining);

		if let Err(e) = trainer.ingest(&units) {
			error!("Batch failed, skipping: {e}");
		}
		if read >= limit {
			info!("Limit of {limit} units reached");
			break;
		}
	}

	if trainer.model().is_empty() {
		warn!("No data was processed");
		return Ok(());
	}

	info!("Compiling and saving model...");
	let compiled = trainer.snapshot();
	save_model(&output, &compiled, format_for_path(&output))?;
	info!(
		"Saved {} units ({} states) to {}",
		trainer.units_seen(),
		compiled.state_count(),
		output.display()
	);

	let generator = Generator::new(&compiled);
	let mut rng = match args.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_rng(&mut rand::rng()),
	};
	println!("{}", "=".repeat(30));
	println!("SAMPLE OUTPUT:");
	for _ in 0..args.samples {
		match generator.generate(&mut rng, 100) {
			Ok(tokens) => println!("> {}", generator.render(&tokens)),
			Err(e) => println!("> ({e})"),
		}
	}
	println!("{}", "=".repeat(30));

	Ok(())
}
