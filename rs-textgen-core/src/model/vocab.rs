use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Ordered set of distinct tokens with a token ↔ index bijection.
///
/// Models address tokens by index internally and expose strings externally.
/// Serialized as the plain token list; the reverse index is rebuilt on load.
///
/// # Invariants
/// - Indices are contiguous from `0` to `len - 1`
/// - `index[tokens[i]] == i` for every `i`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
	tokens: Vec<String>,
	index: HashMap<String, usize>,
}

impl Vocabulary {
	/// Creates an empty vocabulary.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `token` if unseen and returns its index.
	pub fn insert(&mut self, token: &str) -> usize {
		if let Some(&id) = self.index.get(token) {
			return id;
		}
		let id = self.tokens.len();
		self.tokens.push(token.to_owned());
		self.index.insert(token.to_owned(), id);
		id
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	/// Index of `token`, or `None` if unknown.
	pub fn index_of(&self, token: &str) -> Option<usize> {
		self.index.get(token).copied()
	}

	/// Token at `id`, or `None` if out of range.
	pub fn token(&self, id: usize) -> Option<&str> {
		self.tokens.get(id).map(String::as_str)
	}

	pub fn contains(&self, token: &str) -> bool {
		self.index.contains_key(token)
	}

	/// Tokens in index order.
	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}
}

impl From<Vec<String>> for Vocabulary {
	/// Duplicates are skipped; the first occurrence keeps its position.
	fn from(tokens: Vec<String>) -> Self {
		let mut vocabulary = Vocabulary::new();
		for token in &tokens {
			vocabulary.insert(token);
		}
		vocabulary
	}
}

impl From<Vocabulary> for Vec<String> {
	fn from(vocabulary: Vocabulary) -> Self {
		vocabulary.tokens
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_is_idempotent() {
		let mut vocab = Vocabulary::new();
		assert_eq!(vocab.insert("a"), 0);
		assert_eq!(vocab.insert("b"), 1);
		assert_eq!(vocab.insert("a"), 0);
		assert_eq!(vocab.len(), 2);
		assert_eq!(vocab.token(1), Some("b"));
		assert_eq!(vocab.index_of("b"), Some(1));
		assert_eq!(vocab.index_of("z"), None);
	}

	#[test]
	fn serializes_as_plain_list() {
		let vocab = Vocabulary::from(vec!["x".to_owned(), "y".to_owned(), "x".to_owned()]);
		let json = serde_json::to_string(&vocab).unwrap();
		assert_eq!(json, r#"["x","y"]"#);
		let back: Vocabulary = serde_json::from_str(&json).unwrap();
		assert_eq!(back, vocab);
	}
}
