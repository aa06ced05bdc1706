pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

const DOC_ID_KEY: &str = "doc_id";
const TITLE_KEY: &str = "title";
const TEXT_KEY: &str = "text";

use std::{collections::HashMap, sync::Arc};

use qdrant_client::{
	Qdrant,
	qdrant::{
		Condition, Document as Bm25Document, Filter, PointId, Query, QueryPointsBuilder, Range,
		ScoredPoint, Value, point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::{Map, Number};

use atelier_domain::{Constraint, Corpus, Document, FilterSpec, StoreHit};

use crate::{Error, Result};

/// Catalog collections in Qdrant.
///
/// Each point carries `doc_id`, `title` and `text` in its payload. Every other payload key is a
/// filterable attribute. Points hold a dense vector and a BM25 sparse vector under named slots.
pub struct QdrantStore {
	pub client: Qdrant,
	pub products_collection: String,
	pub faq_collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &atelier_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			products_collection: cfg.products_collection.clone(),
			faq_collection: cfg.faq_collection.clone(),
			vector_dim: cfg.vector_dim,
		})
	}

	pub fn collection(&self, corpus: Corpus) -> &str {
		match corpus {
			Corpus::Products => &self.products_collection,
			Corpus::Faq => &self.faq_collection,
		}
	}

	pub async fn search_keyword(
		&self,
		corpus: Corpus,
		text: &str,
		filter: &FilterSpec,
		top_k: u32,
	) -> Result<Vec<StoreHit>> {
		if top_k == 0 {
			return Ok(Vec::new());
		}

		let mut search = QueryPointsBuilder::new(self.collection(corpus).to_string())
			.query(Query::new_nearest(Bm25Document::new(text.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.with_payload(true)
			.limit(u64::from(top_k));

		if let Some(filter) = to_qdrant_filter(filter) {
			search = search.filter(filter);
		}

		let response = self.client.query(search).await?;

		Ok(collect_hits(corpus, response.result))
	}

	pub async fn search_vector(
		&self,
		corpus: Corpus,
		vector: &[f32],
		filter: &FilterSpec,
		top_k: u32,
	) -> Result<Vec<StoreHit>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions; collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}
		if top_k == 0 {
			return Ok(Vec::new());
		}

		let mut search = QueryPointsBuilder::new(self.collection(corpus).to_string())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.with_payload(true)
			.limit(u64::from(top_k));

		if let Some(filter) = to_qdrant_filter(filter) {
			search = search.filter(filter);
		}

		let response = self.client.query(search).await?;

		Ok(collect_hits(corpus, response.result))
	}
}

/// Translates a filter spec into a conjunction of payload conditions.
///
/// Returns `None` for an empty spec so the query runs unfiltered.
pub fn to_qdrant_filter(spec: &FilterSpec) -> Option<Filter> {
	if spec.is_empty() {
		return None;
	}

	let conditions: Vec<Condition> = spec
		.iter()
		.map(|(attribute, constraint)| match constraint {
			Constraint::AnyOf { values } => Condition::matches(attribute.as_str(), values.clone()),
			Constraint::Range { min, max } => Condition::range(
				attribute.as_str(),
				Range { gte: *min, lte: *max, ..Default::default() },
			),
		})
		.collect();

	Some(Filter::all(conditions))
}

fn collect_hits(corpus: Corpus, points: Vec<ScoredPoint>) -> Vec<StoreHit> {
	let mut out = Vec::with_capacity(points.len());

	for point in points {
		let score = point.score;
		let Some(document) = document_from_point(corpus, point) else { continue };

		out.push(StoreHit { score, document: Arc::new(document) });
	}

	out
}

fn document_from_point(corpus: Corpus, point: ScoredPoint) -> Option<Document> {
	let mut payload = point.payload;
	let id = payload
		.remove(DOC_ID_KEY)
		.and_then(value_string)
		.or_else(|| point.id.as_ref().and_then(point_id_string))?;
	let title = payload.remove(TITLE_KEY).and_then(value_string).unwrap_or_default();
	let text = payload.remove(TEXT_KEY).and_then(value_string).unwrap_or_default();

	Some(Document { id, corpus, title, text, attributes: payload_to_json(payload) })
}

fn point_id_string(point_id: &PointId) -> Option<String> {
	match point_id.point_id_options.as_ref()? {
		PointIdOptions::Num(num) => Some(num.to_string()),
		PointIdOptions::Uuid(uuid) => Some(uuid.clone()),
	}
}

fn value_string(value: Value) -> Option<String> {
	match value.kind? {
		Kind::StringValue(text) => Some(text),
		Kind::IntegerValue(num) => Some(num.to_string()),
		_ => None,
	}
}

fn payload_to_json(payload: HashMap<String, Value>) -> Map<String, serde_json::Value> {
	payload.into_iter().map(|(key, value)| (key, value_to_json(value))).collect()
}

fn value_to_json(value: Value) -> serde_json::Value {
	match value.kind {
		Some(Kind::StringValue(text)) => serde_json::Value::String(text),
		Some(Kind::IntegerValue(num)) => serde_json::Value::from(num),
		Some(Kind::DoubleValue(num)) =>
			Number::from_f64(num).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
		Some(Kind::BoolValue(flag)) => serde_json::Value::Bool(flag),
		Some(Kind::ListValue(list)) =>
			serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect()),
		Some(Kind::StructValue(object)) => serde_json::Value::Object(payload_to_json(object.fields)),
		Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_spec_has_no_filter() {
		assert!(to_qdrant_filter(&FilterSpec::empty()).is_none());
	}

	#[test]
	fn spec_becomes_one_must_condition_per_attribute() {
		let spec: FilterSpec = [
			("baseColour".to_string(), Constraint::any_of(["Blue", "Navy Blue"]).expect("colour")),
			("price".to_string(), Constraint::range(None, Some(50.0)).expect("price")),
		]
		.into_iter()
		.collect();
		let filter = to_qdrant_filter(&spec).expect("filter");

		assert_eq!(filter.must.len(), 2);
		assert!(filter.should.is_empty());
	}

	#[test]
	fn payload_values_convert_to_json() {
		let mut payload = HashMap::new();

		payload.insert("doc_id".to_string(), Value::from("p-1"));
		payload.insert("title".to_string(), Value::from("Canvas Tote"));
		payload.insert("price".to_string(), Value::from(19.5));
		payload.insert("season".to_string(), Value::from("Summer"));

		let point = ScoredPoint { payload, score: 0.7, ..Default::default() };
		let doc = document_from_point(Corpus::Products, point).expect("document");

		assert_eq!(doc.id, "p-1");
		assert_eq!(doc.title, "Canvas Tote");
		assert_eq!(doc.attributes.get("price"), Some(&serde_json::Value::from(19.5)));
		assert!(!doc.attributes.contains_key("doc_id"));
	}
}
