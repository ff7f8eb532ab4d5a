use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::model::contract::LanguageModel;
use crate::model::generator::{AnyModel, ModelData};

/// On-disk encoding of a saved model, chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ModelFormat {
	/// `.json`: the plain-data representation, pretty-printed.
	Json,
	/// `.bin`: compact `postcard` encoding.
	Binary,
}

impl ModelFormat {
	fn from_path(path: &Path) -> Result<Self> {
		match path.extension().and_then(OsStr::to_str) {
			Some("json") => Ok(ModelFormat::Json),
			Some("bin") => Ok(ModelFormat::Binary),
			_ => Err(ModelError::invalid_input(format!(
				"unsupported model file '{}', expected a .json or .bin extension",
				path.display()
			))),
		}
	}
}

/// Reads a whole corpus file.
pub fn read_corpus<P: AsRef<Path>>(filename: P) -> Result<String> {
	Ok(fs::read_to_string(filename)?)
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `data/input.txt` + `"bin"` → `data/input.bin`
pub fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> std::io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Extracts the base filename without extension.
///
/// Examples:
/// - `"./data/corpus.txt"` → `"corpus"`
/// - `"corpus.txt"` → `"corpus"`
pub fn get_filename<P: AsRef<Path>>(input_path: P) -> std::io::Result<String> {
	let stem = input_path
		.as_ref()
		.file_stem()
		.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no filename"))?;

	Ok(stem.to_string_lossy().to_string())
}

/// Lists the files with a given extension in a directory, sorted by name.
///
/// Returns file names only (no paths). Subdirectories are ignored.
pub fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> std::io::Result<Vec<String>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		if path.is_file() && path.extension() == Some(OsStr::new(extension)) {
			if let Some(name) = path.file_name() {
				files.push(name.to_string_lossy().to_string());
			}
		}
	}

	files.sort();
	Ok(files)
}

/// Writes `model` to `path` as JSON (`.json`) or postcard (`.bin`).
///
/// # Errors
/// Returns an error on an unsupported extension, an encoding failure or an I/O failure.
pub fn save_model<P: AsRef<Path>>(model: &AnyModel, path: P) -> Result<()> {
	let path = path.as_ref();
	match ModelFormat::from_path(path)? {
		ModelFormat::Json => fs::write(path, serde_json::to_string_pretty(&model.to_json())?)?,
		ModelFormat::Binary => write_binary(path, &model.to_data())?,
	}
	Ok(())
}

/// Writes any serializable value as postcard bytes.
pub(crate) fn write_binary<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
	fs::write(path, postcard::to_stdvec(value)?)?;
	Ok(())
}

/// Reads a value written by [`write_binary`].
pub(crate) fn read_binary<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
	Ok(postcard::from_bytes(&fs::read(path)?)?)
}

/// Reads a model written by [`save_model`].
///
/// # Errors
/// Returns an error on an unsupported extension, an I/O failure, or data
/// that does not describe a valid model.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<AnyModel> {
	let path = path.as_ref();
	match ModelFormat::from_path(path)? {
		ModelFormat::Json => {
			let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
			AnyModel::from_json(&value)
		}
		ModelFormat::Binary => {
			let data: ModelData = read_binary(path)?;
			AnyModel::from_data(data)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn output_path_replaces_extension() {
		let path = build_output_path("data/input.txt", "markov.bin").unwrap();
		assert_eq!(path, PathBuf::from("data/input.markov.bin"));
		assert_eq!(get_filename("./data/corpus.txt").unwrap(), "corpus");
	}

	#[test]
	fn unknown_extension_is_rejected() {
		assert!(matches!(ModelFormat::from_path(Path::new("model.dat")), Err(ModelError::InvalidInput(_))));
		assert_eq!(ModelFormat::from_path(Path::new("a/model.json")).unwrap(), ModelFormat::Json);
		assert_eq!(ModelFormat::from_path(Path::new("model.bin")).unwrap(), ModelFormat::Binary);
	}
}
