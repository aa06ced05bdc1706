use std::{cmp::Ordering, collections::HashMap, path::Path, sync::Arc};

use serde::Deserialize;

use atelier_domain::{Corpus, Document, FilterSpec, StoreHit, tokens};

use crate::{Error, Result};

const TF_SATURATION: f32 = 1.2;

/// One catalog line as read from a JSON catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
	#[serde(flatten)]
	pub document: Document,
	#[serde(default)]
	pub vector: Option<Vec<f32>>,
}

struct Indexed {
	document: Arc<Document>,
	term_counts: HashMap<String, u32>,
	vector: Option<Vec<f32>>,
}

/// In-process catalog used by the chat front end and by tests.
///
/// Keyword search scores with saturated term frequency weighted by inverse document frequency.
/// Vector search scores with cosine similarity over entries that carry a vector.
#[derive(Default)]
pub struct MemoryStore {
	entries: HashMap<Corpus, Vec<Indexed>>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
		let mut store = Self::new();

		for entry in entries {
			store.insert(entry.document, entry.vector);
		}

		store
	}

	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;

		Ok(Self::from_entries(entries))
	}

	pub fn insert(&mut self, document: Document, vector: Option<Vec<f32>>) {
		let mut term_counts = HashMap::new();

		for term in tokens::terms(&searchable_text(&document)) {
			*term_counts.entry(term).or_insert(0) += 1;
		}

		self.entries.entry(document.corpus).or_default().push(Indexed {
			document: Arc::new(document),
			term_counts,
			vector,
		});
	}

	pub fn len(&self, corpus: Corpus) -> usize {
		self.entries.get(&corpus).map_or(0, Vec::len)
	}

	pub fn is_empty(&self) -> bool {
		self.entries.values().all(Vec::is_empty)
	}

	/// Documents of a corpus that still lack a vector, for embedding at load time.
	pub fn missing_vectors(&self, corpus: Corpus) -> Vec<Arc<Document>> {
		self.entries
			.get(&corpus)
			.into_iter()
			.flatten()
			.filter(|entry| entry.vector.is_none())
			.map(|entry| entry.document.clone())
			.collect()
	}

	pub fn set_vector(&mut self, corpus: Corpus, id: &str, vector: Vec<f32>) -> Result<()> {
		let entry = self
			.entries
			.get_mut(&corpus)
			.and_then(|entries| entries.iter_mut().find(|entry| entry.document.id == id))
			.ok_or_else(|| Error::InvalidArgument(format!("Unknown {} document {id}.", corpus.as_str())))?;

		entry.vector = Some(vector);

		Ok(())
	}

	pub fn search_keyword(
		&self,
		corpus: Corpus,
		text: &str,
		filter: &FilterSpec,
		top_k: u32,
	) -> Vec<StoreHit> {
		let Some(entries) = self.entries.get(&corpus) else { return Vec::new() };
		let mut query_terms = tokens::terms(text);

		query_terms.sort();
		query_terms.dedup();

		let total = entries.len() as f32;
		let idf: Vec<f32> = query_terms
			.iter()
			.map(|term| {
				let df = entries.iter().filter(|entry| entry.term_counts.contains_key(term)).count()
					as f32;

				(1.0 + (total - df + 0.5) / (df + 0.5)).ln()
			})
			.collect();
		let scored = entries.iter().filter(|entry| filter.matches(&entry.document)).filter_map(
			|entry| {
				let score: f32 = query_terms
					.iter()
					.zip(&idf)
					.map(|(term, idf)| {
						let tf = entry.term_counts.get(term).copied().unwrap_or(0) as f32;

						idf * tf * (TF_SATURATION + 1.0) / (tf + TF_SATURATION)
					})
					.sum();

				(score > 0.0).then_some((score, entry))
			},
		);

		rank(scored, top_k)
	}

	pub fn search_vector(
		&self,
		corpus: Corpus,
		vector: &[f32],
		filter: &FilterSpec,
		top_k: u32,
	) -> Vec<StoreHit> {
		let Some(entries) = self.entries.get(&corpus) else { return Vec::new() };
		let scored = entries.iter().filter(|entry| filter.matches(&entry.document)).filter_map(
			|entry| {
				let candidate = entry.vector.as_deref()?;

				cosine(vector, candidate).map(|score| (score, entry))
			},
		);

		rank(scored, top_k)
	}
}

fn rank<'a>(scored: impl Iterator<Item = (f32, &'a Indexed)>, top_k: u32) -> Vec<StoreHit> {
	let mut scored: Vec<(f32, &Indexed)> = scored.collect();

	scored.sort_by(|(left_score, left), (right_score, right)| {
		right_score
			.partial_cmp(left_score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| left.document.id.cmp(&right.document.id))
	});
	scored.truncate(top_k as usize);

	scored
		.into_iter()
		.map(|(score, entry)| StoreHit { score, document: entry.document.clone() })
		.collect()
}

fn searchable_text(document: &Document) -> String {
	let mut out = document.rerank_text();

	if document.corpus == Corpus::Products && !document.text.trim().is_empty() {
		out.push(' ');
		out.push_str(document.text.trim());
	}

	out
}

fn cosine(left: &[f32], right: &[f32]) -> Option<f32> {
	if left.len() != right.len() || left.is_empty() {
		return None;
	}

	let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
	let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
	let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();

	if left_norm == 0.0 || right_norm == 0.0 {
		return None;
	}

	Some(dot / (left_norm * right_norm))
}
