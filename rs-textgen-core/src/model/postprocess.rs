//! Turns generated tokens into readable text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FIRST_LETTER_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r#"^(["“(\[]*)(\p{Ll})"#).expect("valid capitalization regex"));
static SENTENCE_START_RE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r#"([.!?]["”’)\]]*\s+["“(\[]*)(\p{Ll})"#).expect("valid capitalization regex")
});
static REPEATED_WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid whitespace regex"));

/// Tokens attached to the previous token.
const CLOSING: [&str; 14] = [".", ",", "!", "?", ";", ":", ")", "]", "}", "»", "”", "’", "…", "%"];
/// Tokens the next token is attached to.
const OPENING: [&str; 5] = ["(", "[", "{", "«", "“"];

/// Joins tokens with single spaces and normalizes punctuation spacing.
///
/// - no space before closing punctuation, one space after it
/// - no space after opening brackets; straight double quotes alternate
///   between opening and closing
/// - `'` is glued on both sides (`don ' t` → `don't`)
/// - the first letter of the text, and the first letter after each
///   sentence-terminal mark, is capitalized
pub(crate) fn format_tokens(tokens: &[String]) -> String {
	let mut text = String::new();
	let mut quote_open = false;
	let mut glue_next = false;

	for token in tokens {
		let token = token.as_str();
		let mut space_before = !text.is_empty() && !glue_next;
		glue_next = false;

		if CLOSING.contains(&token) {
			space_before = false;
		} else if token == "\"" {
			if quote_open {
				space_before = false;
			} else {
				glue_next = true;
			}
			quote_open = !quote_open;
		} else if token == "'" {
			space_before = false;
			glue_next = true;
		} else if OPENING.contains(&token) {
			glue_next = true;
		}

		if space_before {
			text.push(' ');
		}
		text.push_str(token);
	}

	let text = REPEATED_WHITESPACE_RE.replace_all(text.trim(), " ");
	let text = FIRST_LETTER_RE.replace(&text, capitalize_last_group);
	SENTENCE_START_RE.replace_all(&text, capitalize_last_group).into_owned()
}

fn capitalize_last_group(caps: &Captures) -> String {
	format!("{}{}", &caps[1], caps[2].to_uppercase())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tokens(words: &[&str]) -> Vec<String> {
		words.iter().map(|w| (*w).to_owned()).collect()
	}

	#[test]
	fn punctuation_is_attached_and_sentences_capitalized() {
		let text = format_tokens(&tokens(&["the", "cat", "sat", ",", "then", "left", ".", "it", "rained", "!"]));
		assert_eq!(text, "The cat sat, then left. It rained!");
	}

	#[test]
	fn quotes_and_brackets_hug_their_content() {
		let text = format_tokens(&tokens(&["he", "said", "\"", "go", "\"", "(", "twice", ")", "."]));
		assert_eq!(text, "He said \"go\" (twice).");
	}

	#[test]
	fn apostrophes_rebuild_contractions() {
		assert_eq!(format_tokens(&tokens(&["don", "'", "t", "stop"])), "Don't stop");
	}

	#[test]
	fn capitalizes_after_quoted_sentence_end() {
		let text = format_tokens(&tokens(&["\"", "stop", "!", "\"", "she", "cried", "."]));
		assert_eq!(text, "\"Stop!\" She cried.");
	}

	#[test]
	fn empty_tokens_give_empty_text() {
		assert_eq!(format_tokens(&[]), "");
	}
}
