use std::collections::{BTreeMap, btree_map::Iter};

use serde::Serialize;
use serde_json::Value;

use crate::Document;

/// A single attribute restriction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
	/// Matches when the attribute equals any listed value, ignoring ASCII case.
	AnyOf { values: Vec<String> },
	/// Inclusive numeric bounds. At least one bound is always present.
	Range { min: Option<f64>, max: Option<f64> },
}
impl Constraint {
	pub fn any_of<I, S>(values: I) -> Option<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut out: Vec<String> = Vec::new();

		for value in values {
			let value = value.into();
			let trimmed = value.trim();

			if trimmed.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(trimmed)) {
				continue;
			}

			out.push(trimmed.to_string());
		}

		if out.is_empty() { None } else { Some(Self::AnyOf { values: out }) }
	}

	/// Returns `None` for an unbounded or inverted range.
	pub fn range(min: Option<f64>, max: Option<f64>) -> Option<Self> {
		if min.is_some_and(|value| !value.is_finite()) || max.is_some_and(|value| !value.is_finite())
		{
			return None;
		}
		if let (Some(lo), Some(hi)) = (min, max)
			&& lo > hi
		{
			return None;
		}
		if min.is_none() && max.is_none() {
			return None;
		}

		Some(Self::Range { min, max })
	}

	pub fn matches(&self, value: &Value) -> bool {
		match (self, value) {
			(_, Value::Array(items)) => items.iter().any(|item| self.matches(item)),
			(Self::AnyOf { values }, Value::String(text)) =>
				values.iter().any(|allowed| allowed.eq_ignore_ascii_case(text.trim())),
			(Self::Range { min, max }, Value::Number(number)) => {
				let Some(number) = number.as_f64() else { return false };

				min.is_none_or(|lo| number >= lo) && max.is_none_or(|hi| number <= hi)
			},
			(Self::Range { .. }, Value::String(text)) => text
				.trim()
				.parse::<f64>()
				.is_ok_and(|number| self.matches(&Value::from(number))),
			_ => false,
		}
	}
}

/// Attribute constraints applied as hard pre-filters during retrieval.
///
/// Built once per query and read-only afterwards. An empty spec does not restrict anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSpec {
	constraints: BTreeMap<String, Constraint>,
}
impl FilterSpec {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.constraints.is_empty()
	}

	pub fn len(&self) -> usize {
		self.constraints.len()
	}

	pub fn get(&self, attribute: &str) -> Option<&Constraint> {
		self.constraints.get(attribute)
	}

	pub fn iter(&self) -> Iter<'_, String, Constraint> {
		self.constraints.iter()
	}

	/// Every constraint must hold. A missing attribute never matches.
	pub fn matches(&self, document: &Document) -> bool {
		self.constraints.iter().all(|(attribute, constraint)| {
			document.attributes.get(attribute).is_some_and(|value| constraint.matches(value))
		})
	}
}
impl FromIterator<(String, Constraint)> for FilterSpec {
	fn from_iter<T: IntoIterator<Item = (String, Constraint)>>(iter: T) -> Self {
		Self { constraints: iter.into_iter().collect() }
	}
}
impl<'a> IntoIterator for &'a FilterSpec {
	type IntoIter = Iter<'a, String, Constraint>;
	type Item = (&'a String, &'a Constraint);

	fn into_iter(self) -> Self::IntoIter {
		self.constraints.iter()
	}
}
