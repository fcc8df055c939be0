use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{MarkovError, Result};
use crate::model::chain::Model;
use crate::model::serializer::{Format, Portable, from_portable};

/// Streams a text file as batches of at most `batch_size` lines.
///
/// - Lines are read lazily, only one batch is resident at a time
/// - Splits on `\n` / `\r\n`
/// - Lines that are not valid UTF-8 are skipped with a warning
pub struct LineBatches<R> {
	reader: R,
	batch_size: usize,
	line_number: usize,
	buffer: Vec<u8>,
	done: bool,
}

impl<R: BufRead> LineBatches<R> {
	pub fn new(reader: R, batch_size: usize) -> Self {
		Self { reader, batch_size: batch_size.max(1), line_number: 0, buffer: Vec::new(), done: false }
	}

	/// Reads the next valid line. `Ok(None)` at end of input.
	fn next_line(&mut self) -> io::Result<Option<String>> {
		loop {
			self.buffer.clear();
			if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
				return Ok(None);
			}
			self.line_number += 1;
			while matches!(self.buffer.last(), Some(b'\n' | b'\r')) {
				self.buffer.pop();
			}
			match String::from_utf8(std::mem::take(&mut self.buffer)) {
				Ok(line) => return Ok(Some(line)),
				Err(_) => warn!("Skipping line {}: invalid UTF-8", self.line_number),
			}
		}
	}
}

impl<R: BufRead> Iterator for LineBatches<R> {
	type Item = io::Result<Vec<String>>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}
		let mut batch = Vec::with_capacity(self.batch_size.min(4096));
		while batch.len() < self.batch_size {
			match self.next_line() {
				Ok(Some(line)) => batch.push(line),
				Ok(None) => {
					self.done = true;
					break;
				}
				Err(e) => {
					self.done = true;
					return Some(Err(e));
				}
			}
		}
		if batch.is_empty() { None } else { Some(Ok(batch)) }
	}
}

/// Opens `filename` for batched reading.
pub fn read_batches<P: AsRef<Path>>(filename: P, batch_size: usize) -> Result<LineBatches<BufReader<File>>> {
	let path = filename.as_ref();
	let file = File::open(path).map_err(|source| io_error(path, source))?;
	Ok(LineBatches::new(BufReader::new(file), batch_size))
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `data/input.txt` + `"json"` → `data/input.json`
pub fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Format implied by a file extension: `.json` is JSON, anything else binary.
pub fn format_for_path<P: AsRef<Path>>(path: P) -> Format {
	match path.as_ref().extension().and_then(|e| e.to_str()) {
		Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
		_ => Format::Binary,
	}
}

/// Writes a model to `path`.
///
/// The bytes go to a sibling temporary file first, then replace `path`
/// in one rename, so a crash never leaves a truncated artifact.
pub fn save_model<P: AsRef<Path>, M: Portable>(path: P, model: &M, format: Format) -> Result<()> {
	let path = path.as_ref();
	let bytes = model.to_portable(format)?;

	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	let tmp = PathBuf::from(tmp);

	fs::write(&tmp, &bytes).map_err(|source| io_error(&tmp, source))?;
	fs::rename(&tmp, path).map_err(|source| io_error(path, source))?;
	info!("Saved model to {} ({} bytes)", path.display(), bytes.len());
	Ok(())
}

/// Loads a model from `path`, detecting the format from its content.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model> {
	let path = path.as_ref();
	let bytes = fs::read(path).map_err(|source| io_error(path, source))?;
	let model = from_portable(&bytes, Format::detect(&bytes))?;
	info!(
		"Loaded model from {}: state_size={}, {} states, {} edges",
		path.display(),
		model.state_size(),
		model.state_count(),
		model.edge_count()
	);
	Ok(model)
}

fn io_error(path: &Path, source: io::Error) -> MarkovError {
	MarkovError::Io { path: path.to_path_buf(), source }
}
