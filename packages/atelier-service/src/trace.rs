use std::{
	collections::BTreeMap,
	sync::{Mutex, PoisonError},
	time::Instant,
};

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

const LATENCY_KEY: &str = "latency_ms";

/// Identifies a span so stages can parent their own spans under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpanContext {
	pub trace_id: Uuid,
	pub span_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
}
impl AttributeValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(text) => Some(text),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Int(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(value) => Some(*value),
			_ => None,
		}
	}
}
impl From<bool> for AttributeValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}
impl From<i64> for AttributeValue {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}
impl From<u32> for AttributeValue {
	fn from(value: u32) -> Self {
		Self::Int(i64::from(value))
	}
}
impl From<u64> for AttributeValue {
	fn from(value: u64) -> Self {
		Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
	}
}
impl From<usize> for AttributeValue {
	fn from(value: usize) -> Self {
		Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
	}
}
impl From<f32> for AttributeValue {
	fn from(value: f32) -> Self {
		Self::Float(f64::from(value))
	}
}
impl From<f64> for AttributeValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}
impl From<&str> for AttributeValue {
	fn from(value: &str) -> Self {
		Self::Str(value.to_string())
	}
}
impl From<String> for AttributeValue {
	fn from(value: String) -> Self {
		Self::Str(value)
	}
}

/// A finished span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
	pub trace_id: Uuid,
	pub span_id: Uuid,
	pub parent_span_id: Option<Uuid>,
	pub name: String,
	#[serde(with = "rfc3339")]
	pub start: OffsetDateTime,
	#[serde(with = "rfc3339")]
	pub end: OffsetDateTime,
	pub attributes: BTreeMap<String, AttributeValue>,
}
impl SpanRecord {
	pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
		self.attributes.get(key)
	}
}

/// An open span. Attributes written later under the same key replace earlier ones.
#[derive(Debug)]
pub struct Span {
	record: SpanRecord,
	started: Instant,
}
impl Span {
	pub fn start(name: &str, parent: Option<&SpanContext>) -> Self {
		let now = OffsetDateTime::now_utc();
		let record = SpanRecord {
			trace_id: parent.map_or_else(Uuid::new_v4, |ctx| ctx.trace_id),
			span_id: Uuid::new_v4(),
			parent_span_id: parent.map(|ctx| ctx.span_id),
			name: name.to_string(),
			start: now,
			end: now,
			attributes: BTreeMap::new(),
		};

		Self { record, started: Instant::now() }
	}

	pub fn name(&self) -> &str {
		&self.record.name
	}

	pub fn has_attribute(&self, key: &str) -> bool {
		self.record.attributes.contains_key(key)
	}

	pub fn context(&self) -> SpanContext {
		SpanContext { trace_id: self.record.trace_id, span_id: self.record.span_id }
	}

	pub fn set_attribute(&mut self, key: &str, value: impl Into<AttributeValue>) {
		self.record.attributes.insert(key.to_string(), value.into());
	}

	/// Closes the span, stamping the end time and `latency_ms` unless a stage already set it.
	pub fn end(mut self) -> SpanRecord {
		let elapsed = self.started.elapsed();

		self.record.end = self.record.start + elapsed;

		let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

		self.record.attributes.entry(LATENCY_KEY.to_string()).or_insert(latency_ms.into());

		self.record
	}
}

/// Span sink for pipeline stages.
pub trait Tracer
where
	Self: Send + Sync,
{
	fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Span {
		Span::start(name, parent)
	}

	fn export(&self, span: SpanRecord);
}

/// Emits each finished span as a `tracing` event.
pub struct LogTracer;
impl Tracer for LogTracer {
	fn export(&self, span: SpanRecord) {
		let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();

		tracing::info!(
			trace_id = %span.trace_id,
			span_id = %span.span_id,
			parent_span_id = ?span.parent_span_id,
			span_name = %span.name,
			attributes = %attributes,
			"Span finished."
		);
	}
}

/// Keeps finished spans in memory.
#[derive(Default)]
pub struct RecordingTracer {
	spans: Mutex<Vec<SpanRecord>>,
}
impl RecordingTracer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn spans(&self) -> Vec<SpanRecord> {
		self.spans.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn take(&self) -> Vec<SpanRecord> {
		std::mem::take(&mut *self.spans.lock().unwrap_or_else(PoisonError::into_inner))
	}
}
impl Tracer for RecordingTracer {
	fn export(&self, span: SpanRecord) {
		self.spans.lock().unwrap_or_else(PoisonError::into_inner).push(span);
	}
}

mod rfc3339 {
	use serde::Serializer;
	use time::{OffsetDateTime, format_description::well_known::Rfc3339};

	pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

		serializer.serialize_str(&formatted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn later_writes_overwrite_earlier_ones() {
		let mut span = Span::start("routing", None);

		span.set_attribute("label", "FAQ");
		span.set_attribute("label", "PRODUCT");

		let record = span.end();

		assert_eq!(record.attribute("label").and_then(AttributeValue::as_str), Some("PRODUCT"));
		assert!(record.attribute(LATENCY_KEY).is_some());
	}

	#[test]
	fn child_spans_share_the_trace() {
		let root = Span::start("answer_query", None);
		let ctx = root.context();
		let child = Span::start("retrieve", Some(&ctx)).end();

		assert_eq!(child.trace_id, ctx.trace_id);
		assert_eq!(child.parent_span_id, Some(ctx.span_id));
		assert!(root.end().parent_span_id.is_none());
	}

	#[test]
	fn recording_tracer_keeps_spans_in_order() {
		let tracer = RecordingTracer::new();

		tracer.export(tracer.start_span("one", None).end());
		tracer.export(tracer.start_span("two", None).end());

		let names: Vec<String> = tracer.take().into_iter().map(|span| span.name).collect();

		assert_eq!(names, vec!["one", "two"]);
		assert!(tracer.spans().is_empty());
	}

	#[test]
	fn records_serialize_with_rfc3339_times() {
		let mut span = Span::start("generate", None);

		span.set_attribute("prompt_tokens", 12_u32);

		let json = serde_json::to_value(span.end()).expect("serialize");

		assert!(json["start"].as_str().is_some_and(|raw| raw.contains('T')));
		assert_eq!(json["attributes"]["prompt_tokens"], 12);
	}
}
