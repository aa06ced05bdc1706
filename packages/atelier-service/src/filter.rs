use regex::Regex;
use serde_json::{Map, Value};

use atelier_config::{CategoricalAttribute, Filters};
use atelier_domain::{Constraint, FilterSpec};
use atelier_providers::{ChatMessage, CompletionRequest};

use crate::{AtelierService, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct FilterExtraction {
	/// `None` when the model output could not be read as a JSON object at all.
	pub spec: Option<FilterSpec>,
	pub total_tokens: u32,
}

impl AtelierService {
	/// Asks the model for attribute constraints mentioned in the query.
	///
	/// Transport errors are returned; unreadable output is reported through
	/// [`FilterExtraction::spec`] so the caller can tell the two apart.
	pub async fn extract_filters(&self, text: &str) -> Result<FilterExtraction> {
		let request = CompletionRequest {
			messages: build_filter_messages(&self.cfg.filters, text),
			temperature: 0.0,
			max_tokens: self.cfg.filters.max_tokens,
		};
		let completion = self.providers.llm.complete(&self.cfg.providers.llm, &request).await?;

		Ok(FilterExtraction {
			spec: parse_filter_output(&self.cfg.filters, &completion.text),
			total_tokens: completion.total_tokens(),
		})
	}
}

pub fn build_filter_messages(cfg: &Filters, query: &str) -> Vec<ChatMessage> {
	let vocabulary: Map<String, Value> = cfg
		.categorical
		.iter()
		.map(|attribute| (attribute.name.clone(), Value::from(attribute.values.clone())))
		.collect();
	let vocabulary_text =
		serde_json::to_string_pretty(&vocabulary).unwrap_or_else(|_| "{}".to_string());
	let numeric: Vec<&str> = cfg.numeric.iter().map(|attribute| attribute.name.as_str()).collect();
	let numeric_text = if numeric.is_empty() { "none".to_string() } else { numeric.join(", ") };
	let system_prompt = "You extract structured catalog filters from shopping queries for a clothing store. \
Output must be valid JSON only. Do not add explanations or extra fields.";
	let user_prompt = format!(
		"Categorical attributes and their allowed values:\n{vocabulary_text}\n\
Numeric attributes: {numeric_text}\n\
Rules:\n\
- Only include attributes the query mentions.\n\
- Categorical values must be lists drawn from the allowed values above.\n\
- Numeric attributes use {{\"min\": number, \"max\": number}}. Use 0 for no lower bound and \"inf\" for no upper bound.\n\
Example: {{\"baseColour\": [\"Blue\"], \"price\": {{\"min\": 0, \"max\": 50}}}}\n\
Query: {query}"
	);

	vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)]
}

/// Reads the model's JSON into a filter spec, keeping whatever fields are well formed.
///
/// Unknown attributes and values outside the allowed list are dropped. A numeric field with a
/// malformed bound is dropped on its own. Returns `None` only when no JSON object can be found.
pub fn parse_filter_output(cfg: &Filters, raw: &str) -> Option<FilterSpec> {
	let object = extract_json_object(raw)?;
	let mut out = Vec::new();

	for (key, value) in &object {
		if let Some(attribute) =
			cfg.categorical.iter().find(|attribute| attribute.name.eq_ignore_ascii_case(key.trim()))
		{
			if let Some(constraint) = categorical_constraint(attribute, value) {
				out.push((attribute.name.clone(), constraint));
			}

			continue;
		}
		if let Some(attribute) =
			cfg.numeric.iter().find(|attribute| attribute.name.eq_ignore_ascii_case(key.trim()))
			&& let Some(constraint) = numeric_constraint(value)
		{
			out.push((attribute.name.clone(), constraint));
		}
	}

	Some(out.into_iter().collect())
}

fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
	let re = Regex::new(r"(?s)\{.*\}").ok()?;
	let candidate = re.find(raw)?.as_str();
	let unquoted = candidate.replace('\'', "\"");
	let attempts = [
		candidate.to_string(),
		collapse_doubled_braces(candidate),
		collapse_doubled_braces(&unquoted),
		unquoted,
	];

	attempts.iter().find_map(|attempt| match serde_json::from_str::<Value>(attempt) {
		Ok(Value::Object(object)) => Some(object),
		_ => None,
	})
}

fn collapse_doubled_braces(text: &str) -> String {
	text.replace("{{", "{").replace("}}", "}")
}

fn categorical_constraint(attribute: &CategoricalAttribute, value: &Value) -> Option<Constraint> {
	let raw_values: Vec<&str> = match value {
		Value::String(text) => vec![text.as_str()],
		Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
		_ => Vec::new(),
	};
	let allowed = raw_values.into_iter().filter_map(|raw| {
		let raw = raw.trim();

		if attribute.values.is_empty() {
			return Some(raw.to_string());
		}

		attribute.values.iter().find(|allowed| allowed.eq_ignore_ascii_case(raw)).cloned()
	});

	Constraint::any_of(allowed)
}

fn numeric_constraint(value: &Value) -> Option<Constraint> {
	let Value::Object(bounds) = value else { return None };
	let min = bound(bounds.get("min"))?;
	let max = bound(bounds.get("max"))?;

	Constraint::range(min, max)
}

// Outer `None` marks a malformed bound; inner `None` an unbounded side. Zero and below read as
// unbounded.
fn bound(value: Option<&Value>) -> Option<Option<f64>> {
	match read_bound(value)? {
		Some(number) if number <= 0.0 => Some(None),
		other => Some(other),
	}
}

fn read_bound(value: Option<&Value>) -> Option<Option<f64>> {
	match value {
		None | Some(Value::Null) => Some(None),
		Some(Value::Number(number)) => number.as_f64().filter(|number| number.is_finite()).map(Some),
		Some(Value::String(text)) => {
			let text = text.trim().trim_start_matches('$');

			if text.eq_ignore_ascii_case("inf") || text.eq_ignore_ascii_case("infinity") {
				return Some(None);
			}

			text.parse::<f64>().ok().filter(|number| number.is_finite()).map(Some)
		},
		Some(_) => None,
	}
}

#[cfg(test)]
mod tests {
	use atelier_config::NumericAttribute;

	use super::*;

	fn filters() -> Filters {
		Filters {
			max_tokens: 1_500,
			categorical: vec![
				CategoricalAttribute {
					name: "baseColour".to_string(),
					values: vec!["Blue".to_string(), "Navy Blue".to_string(), "Red".to_string()],
				},
				CategoricalAttribute {
					name: "articleType".to_string(),
					values: vec!["Shirts".to_string(), "Tshirts".to_string()],
				},
			],
			numeric: vec![NumericAttribute { name: "price".to_string() }],
		}
	}

	#[test]
	fn blue_shirts_under_fifty() {
		let raw = r#"{"baseColour": ["blue"], "articleType": ["Shirts"], "price": {"min": 0, "max": 50}}"#;
		let spec = parse_filter_output(&filters(), raw).expect("spec");

		assert_eq!(
			spec.get("baseColour"),
			Some(&Constraint::AnyOf { values: vec!["Blue".to_string()] })
		);
		assert_eq!(spec.get("price"), Some(&Constraint::Range { min: None, max: Some(50.0) }));
		assert_eq!(spec.len(), 3);
	}

	#[test]
	fn non_numeric_price_drops_only_price() {
		let raw = r#"{"baseColour": ["Blue"], "price": {"min": "cheap", "max": 50}}"#;
		let spec = parse_filter_output(&filters(), raw).expect("spec");

		assert!(spec.get("price").is_none());
		assert!(spec.get("baseColour").is_some());
	}

	#[test]
	fn unknown_keys_and_values_are_dropped() {
		let raw = r#"{"material": ["Silk"], "baseColour": ["Purple"], "articleType": "tshirts"}"#;
		let spec = parse_filter_output(&filters(), raw).expect("spec");

		assert_eq!(spec.len(), 1);
		assert_eq!(
			spec.get("articleType"),
			Some(&Constraint::AnyOf { values: vec!["Tshirts".to_string()] })
		);
	}

	#[test]
	fn unbounded_ranges_are_dropped() {
		let raw = r#"{"price": {"min": 0, "max": "inf"}}"#;
		let spec = parse_filter_output(&filters(), raw).expect("spec");

		assert!(spec.is_empty());
	}

	#[test]
	fn zero_upper_bound_keeps_the_lower_one() {
		let raw = r#"{"price": {"min": "$20", "max": 0}}"#;
		let spec = parse_filter_output(&filters(), raw).expect("spec");

		assert_eq!(spec.get("price"), Some(&Constraint::Range { min: Some(20.0), max: None }));
	}

	#[test]
	fn tolerates_fences_single_quotes_and_doubled_braces() {
		let fenced = "```json\n{{\"baseColour\": [\"Red\"]}}\n```";
		let quoted = "Here you go: {'price': {'min': 20, 'max': '80'}}";

		assert_eq!(parse_filter_output(&filters(), fenced).map(|spec| spec.len()), Some(1));
		assert_eq!(
			parse_filter_output(&filters(), quoted).and_then(|spec| spec.get("price").cloned()),
			Some(Constraint::Range { min: Some(20.0), max: Some(80.0) })
		);
	}

	#[test]
	fn unreadable_output_is_none() {
		assert!(parse_filter_output(&filters(), "no filters here").is_none());
		assert!(parse_filter_output(&filters(), "{not json").is_none());
	}

	#[test]
	fn prompt_lists_vocabulary_and_numeric_shape() {
		let messages = build_filter_messages(&filters(), "blue shirts under $50");

		assert_eq!(messages.len(), 2);
		assert!(messages[1].content.contains("\"Navy Blue\""));
		assert!(messages[1].content.contains("Numeric attributes: price"));
		assert!(messages[1].content.ends_with("Query: blue shirts under $50"));
	}
}
