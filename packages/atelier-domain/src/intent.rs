use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
	Faq,
	Product,
}
impl Intent {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Faq => "FAQ",
			Self::Product => "PRODUCT",
		}
	}

	/// Reads a classifier label such as `"FAQ"`, `"Label: Product"` or `"faq."`.
	///
	/// Returns `None` when the text names neither intent, or names both.
	pub fn from_label(raw: &str) -> Option<Self> {
		let normalized = raw.trim().to_lowercase();
		let exact = normalized.trim_matches(|ch: char| !ch.is_alphanumeric());

		match exact {
			"faq" => return Some(Self::Faq),
			"product" | "products" => return Some(Self::Product),
			_ => {},
		}

		match (normalized.contains("faq"), normalized.contains("product")) {
			(true, false) => Some(Self::Faq),
			(false, true) => Some(Self::Product),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::Intent;

	#[test]
	fn labels_are_case_insensitive() {
		assert_eq!(Intent::from_label("FAQ"), Some(Intent::Faq));
		assert_eq!(Intent::from_label(" product.\n"), Some(Intent::Product));
		assert_eq!(Intent::from_label("Label: Faq"), Some(Intent::Faq));
	}

	#[test]
	fn ambiguous_or_unknown_labels_are_rejected() {
		assert_eq!(Intent::from_label("shipping"), None);
		assert_eq!(Intent::from_label("FAQ or Product"), None);
		assert_eq!(Intent::from_label(""), None);
	}
}
