use unicode_segmentation::UnicodeSegmentation;

/// Rough token count for text that never went through the model tokenizer.
///
/// Counts words and standalone punctuation, which tracks BPE token counts closely enough for
/// budgeting conversation history.
pub fn estimate_tokens(text: &str) -> u32 {
	let count = text.split_word_bounds().filter(|segment| !segment.trim().is_empty()).count();

	u32::try_from(count).unwrap_or(u32::MAX)
}

/// Lowercased words, used for lexical matching.
pub fn terms(text: &str) -> Vec<String> {
	text.unicode_words().map(str::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn punctuation_counts_as_tokens() {
		assert_eq!(estimate_tokens("Do you have blue shirts?"), 6);
		assert_eq!(estimate_tokens("   "), 0);
	}

	#[test]
	fn terms_are_lowercased_words() {
		assert_eq!(terms("Blue T-Shirts, under $50!"), vec!["blue", "t", "shirts", "under", "50"]);
	}
}
