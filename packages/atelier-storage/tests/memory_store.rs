use atelier_domain::{Constraint, Corpus, Document, FilterSpec};
use atelier_storage::{MemoryStore, memory::CatalogEntry};
use serde_json::{Map, Value};

fn product(id: &str, title: &str, colour: &str, price: f64, vector: Vec<f32>) -> CatalogEntry {
	let mut attributes = Map::new();

	attributes.insert("baseColour".to_string(), Value::from(colour));
	attributes.insert("price".to_string(), Value::from(price));

	CatalogEntry {
		document: Document {
			id: id.to_string(),
			corpus: Corpus::Products,
			title: title.to_string(),
			text: String::new(),
			attributes,
		},
		vector: Some(vector),
	}
}

fn faq(id: &str, question: &str, answer: &str) -> CatalogEntry {
	CatalogEntry {
		document: Document {
			id: id.to_string(),
			corpus: Corpus::Faq,
			title: question.to_string(),
			text: answer.to_string(),
			attributes: Map::new(),
		},
		vector: None,
	}
}

fn store() -> MemoryStore {
	MemoryStore::from_entries([
		product("p1", "Blue Oxford Shirt", "Blue", 45.0, vec![1.0, 0.0]),
		product("p2", "Red Linen Shirt", "Red", 30.0, vec![0.8, 0.6]),
		product("p3", "Blue Denim Jacket", "Blue", 120.0, vec![0.0, 1.0]),
		faq("f1", "What is the return policy?", "Returns are accepted within 30 days."),
	])
}

#[test]
fn keyword_search_ranks_by_term_overlap() {
	let hits = store().search_keyword(Corpus::Products, "blue shirt", &FilterSpec::empty(), 10);
	let ids: Vec<&str> = hits.iter().map(|hit| hit.document.id.as_str()).collect();

	assert_eq!(ids.first(), Some(&"p1"));
	assert_eq!(ids.len(), 3);
}

#[test]
fn keyword_search_applies_filters_as_hard_constraints() {
	let spec: FilterSpec =
		[("price".to_string(), Constraint::range(None, Some(50.0)).expect("price"))]
			.into_iter()
			.collect();
	let hits = store().search_keyword(Corpus::Products, "blue", &spec, 10);

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].document.id, "p1");
}

#[test]
fn vector_search_orders_by_cosine_and_truncates() {
	let hits = store().search_vector(Corpus::Products, &[1.0, 0.0], &FilterSpec::empty(), 2);
	let ids: Vec<&str> = hits.iter().map(|hit| hit.document.id.as_str()).collect();

	assert_eq!(ids, vec!["p1", "p2"]);
}

#[test]
fn corpora_are_separate() {
	let store = store();
	let hits = store.search_keyword(Corpus::Faq, "return policy", &FilterSpec::empty(), 5);

	assert_eq!(hits.len(), 1);
	assert_eq!(store.len(Corpus::Products), 3);
	assert_eq!(store.missing_vectors(Corpus::Faq).len(), 1);
}

#[test]
fn set_vector_makes_entry_searchable() {
	let mut store = store();

	store.set_vector(Corpus::Faq, "f1", vec![0.0, 1.0]).expect("known document");

	let hits = store.search_vector(Corpus::Faq, &[0.0, 1.0], &FilterSpec::empty(), 5);

	assert_eq!(hits.len(), 1);
	assert!(store.set_vector(Corpus::Faq, "missing", vec![1.0]).is_err());
}
