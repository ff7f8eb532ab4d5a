//! Raw text to token sequences.
//!
//! Three splitting strategies are available (`word`, `whitespace`, `sentence`),
//! plus [`tokenize_into_sentences`] which groups word tokens per sentence for
//! models trained sentence by sentence.
//!
//! Sentence boundaries are detected with a heuristic: a terminal mark
//! followed by whitespace ends a sentence unless the word before the period
//! looks like an abbreviation (`Mr.`, `Dr.`, `e.g.`) or an initial (`J.`).
//! It is approximate; "U.S." at the true end of a sentence, for instance,
//! is not split.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static PUNCTUATION_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r#"([.,!?;:"()\[\]{}…“”«»—])"#).expect("valid punctuation regex"));
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").expect("valid word regex"));
static WORD_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// Words that end with a period without ending the sentence.
const ABBREVIATIONS: [&str; 24] = [
	"mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "inc", "ltd", "co", "mt",
	"gen", "col", "lt", "sgt", "rev", "no", "vol", "fig", "jan", "feb",
];

/// Splitting strategy used by [`tokenize`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenizeMethod {
	/// `\w+` runs or single punctuation characters.
	#[default]
	Word,
	/// Runs of whitespace only.
	Whitespace,
	/// One token per sentence.
	Sentence,
}

/// Tokenizer options.
///
/// Deserializable from a partial JSON document; missing fields take their
/// defaults (`word`, punctuation preserved, case folded).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TokenizerOptions {
	pub method: TokenizeMethod,
	/// Keep punctuation as standalone tokens. When false, punctuation is dropped.
	pub preserve_punctuation: bool,
	/// Skip the final lowercase pass.
	pub preserve_case: bool,
}

impl Default for TokenizerOptions {
	fn default() -> Self {
		Self { method: TokenizeMethod::Word, preserve_punctuation: true, preserve_case: false }
	}
}

/// Splits `text` into tokens.
///
/// # Behavior
/// - Whitespace is collapsed to single spaces and trimmed.
/// - Punctuation is padded with spaces (or removed when
///   `preserve_punctuation` is false). Sentence mode skips the padding so
///   that abbreviations stay recognizable.
/// - The text is split according to `options.method`.
/// - Tokens are lowercased unless `preserve_case` is set; empty tokens are dropped.
///
/// # Errors
/// Returns [`ModelError::InvalidInput`] if `text` is empty or only whitespace.
pub fn tokenize(text: &str, options: &TokenizerOptions) -> Result<Vec<String>> {
	if text.trim().is_empty() {
		return Err(ModelError::invalid_input("text to tokenize must be a non-empty string"));
	}

	let normalized = normalize_whitespace(text);

	let tokens: Vec<String> = match options.method {
		TokenizeMethod::Word => {
			let prepared = prepare_punctuation(&normalized, options.preserve_punctuation);
			let re: &Regex = if options.preserve_punctuation { &*WORD_RE } else { &*WORD_ONLY_RE };
			re.find_iter(&prepared).map(|m| m.as_str().to_owned()).collect()
		}
		TokenizeMethod::Whitespace => {
			let prepared = prepare_punctuation(&normalized, options.preserve_punctuation);
			prepared.split_whitespace().map(str::to_owned).collect()
		}
		TokenizeMethod::Sentence => split_sentences(&normalized)
			.into_iter()
			.map(|sentence| {
				if options.preserve_punctuation {
					sentence
				} else {
					normalize_whitespace(&PUNCTUATION_RE.replace_all(&sentence, " "))
				}
			})
			.collect(),
	};

	Ok(tokens
		.into_iter()
		.map(|token| if options.preserve_case { token } else { token.to_lowercase() })
		.filter(|token| !token.is_empty())
		.collect())
}

/// Splits `text` into sentences, then each sentence into tokens.
///
/// Sentences are tokenized with `options`, except that `sentence` mode
/// falls back to `word` inside a sentence.
///
/// Always returns at least one (possibly empty) sentence: empty input gives `[[]]`.
pub fn tokenize_into_sentences(text: &str, options: &TokenizerOptions) -> Vec<Vec<String>> {
	if text.trim().is_empty() {
		return vec![Vec::new()];
	}

	let inner = TokenizerOptions {
		method: match options.method {
			TokenizeMethod::Sentence => TokenizeMethod::Word,
			method => method,
		},
		..options.clone()
	};

	let sentences: Vec<Vec<String>> = split_sentences(&normalize_whitespace(text))
		.iter()
		.filter_map(|sentence| tokenize(sentence, &inner).ok())
		.filter(|tokens| !tokens.is_empty())
		.collect();

	if sentences.is_empty() { vec![Vec::new()] } else { sentences }
}

/// Tokenizes a generation prompt the way training text is tokenized by default.
///
/// An empty prompt gives no tokens.
pub(crate) fn prompt_tokens(prompt: &str, case_sensitive: bool) -> Vec<String> {
	let options = TokenizerOptions { preserve_case: case_sensitive, ..TokenizerOptions::default() };
	tokenize(prompt, &options).unwrap_or_default()
}

fn normalize_whitespace(text: &str) -> String {
	WHITESPACE_RE.replace_all(text, " ").trim().to_owned()
}

fn prepare_punctuation(text: &str, preserve: bool) -> String {
	if preserve {
		PUNCTUATION_RE.replace_all(text, " $1 ").into_owned()
	} else {
		PUNCTUATION_RE.replace_all(text, " ").into_owned()
	}
}

/// Splits whitespace-normalized text on sentence-terminal punctuation.
fn split_sentences(text: &str) -> Vec<String> {
	let chars: Vec<char> = text.chars().collect();
	let mut sentences = Vec::new();
	let mut start = 0;

	for i in 1..chars.len() {
		if chars[i].is_whitespace() && is_sentence_end(&chars, i) {
			let sentence: String = chars[start..i].iter().collect();
			let sentence = sentence.trim();
			if !sentence.is_empty() {
				sentences.push(sentence.to_owned());
			}
			start = i + 1;
		}
	}

	if start < chars.len() {
		let sentence: String = chars[start..].iter().collect();
		let sentence = sentence.trim();
		if !sentence.is_empty() {
			sentences.push(sentence.to_owned());
		}
	}

	sentences
}

/// `chars[i]` is a whitespace; decides whether the text before it closes a sentence.
fn is_sentence_end(chars: &[char], i: usize) -> bool {
	// Closing quotes and brackets may follow the mark: `He left." Then`
	let mut mark = i;
	while mark > 0 && matches!(chars[mark - 1], '"' | '\'' | ')' | '”' | '’') {
		mark -= 1;
	}
	if mark == 0 {
		return false;
	}
	match chars[mark - 1] {
		'!' | '?' => return true,
		'.' => (),
		_ => return false,
	}

	let word_end = mark - 1;
	let mut word_start = word_end;
	while word_start > 0 && !chars[word_start - 1].is_whitespace() {
		word_start -= 1;
	}
	let word: String = chars[word_start..word_end]
		.iter()
		.skip_while(|c| !c.is_alphanumeric())
		.collect();

	// Initials ("J.") and dotted abbreviations ("e.g.", "U.S.")
	let mut letters = word.chars();
	if let (Some(c), None) = (letters.next(), letters.next()) {
		if c.is_alphabetic() {
			return false;
		}
	}
	if word.contains('.') {
		return false;
	}

	!ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn options(method: TokenizeMethod) -> TokenizerOptions {
		TokenizerOptions { method, ..TokenizerOptions::default() }
	}

	#[test]
	fn empty_text_is_rejected() {
		assert!(matches!(tokenize("", &TokenizerOptions::default()), Err(ModelError::InvalidInput(_))));
		assert!(matches!(tokenize("  \n\t", &TokenizerOptions::default()), Err(ModelError::InvalidInput(_))));
	}

	#[test]
	fn word_mode_splits_punctuation_and_folds_case() {
		let tokens = tokenize("Hello,   World! It works.", &options(TokenizeMethod::Word)).unwrap();
		assert_eq!(tokens, vec!["hello", ",", "world", "!", "it", "works", "."]);
	}

	#[test]
	fn word_mode_can_drop_punctuation_and_keep_case() {
		let opts = TokenizerOptions {
			method: TokenizeMethod::Word,
			preserve_punctuation: false,
			preserve_case: true,
		};
		let tokens = tokenize("Hello, World!", &opts).unwrap();
		assert_eq!(tokens, vec!["Hello", "World"]);
	}

	#[test]
	fn whitespace_mode_keeps_words_intact() {
		let opts = TokenizerOptions {
			method: TokenizeMethod::Whitespace,
			preserve_punctuation: false,
			preserve_case: false,
		};
		let tokens = tokenize("don't  stop\nnow", &opts).unwrap();
		assert_eq!(tokens, vec!["don't", "stop", "now"]);
	}

	#[test]
	fn whitespace_mode_pads_punctuation_when_preserved() {
		let tokens = tokenize("Stop. Go!", &options(TokenizeMethod::Whitespace)).unwrap();
		assert_eq!(tokens, vec!["stop", ".", "go", "!"]);
	}

	#[test]
	fn sentence_mode_skips_abbreviations_and_initials() {
		let opts = TokenizerOptions { preserve_case: true, ..options(TokenizeMethod::Sentence) };
		let tokens = tokenize("Mr. Smith met J. Doe today. Was it late? Yes!", &opts).unwrap();
		assert_eq!(tokens, vec!["Mr. Smith met J. Doe today.", "Was it late?", "Yes!"]);
	}

	#[test]
	fn sentence_mode_handles_closing_quotes() {
		let opts = TokenizerOptions { preserve_case: true, ..options(TokenizeMethod::Sentence) };
		let tokens = tokenize("He said \"go.\" Then he left.", &opts).unwrap();
		assert_eq!(tokens, vec!["He said \"go.\"", "Then he left."]);
	}

	#[test]
	fn sentences_are_grouped_into_word_tokens() {
		let sentences = tokenize_into_sentences("The cat sat. The dog ran!", &TokenizerOptions::default());
		assert_eq!(
			sentences,
			vec![vec!["the", "cat", "sat", "."], vec!["the", "dog", "ran", "!"]]
		);
	}

	#[test]
	fn empty_text_gives_one_empty_sentence() {
		assert_eq!(tokenize_into_sentences("", &TokenizerOptions::default()), vec![Vec::<String>::new()]);
		assert_eq!(tokenize_into_sentences("   ", &TokenizerOptions::default()), vec![Vec::<String>::new()]);
	}

	#[test]
	fn options_deserialize_with_defaults() {
		let opts: TokenizerOptions = serde_json::from_str(r#"{"method":"whitespace"}"#).unwrap();
		assert_eq!(opts.method, TokenizeMethod::Whitespace);
		assert!(opts.preserve_punctuation);
		assert!(!opts.preserve_case);
	}
}
