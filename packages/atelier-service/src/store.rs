use atelier_domain::{Corpus, FilterSpec, StoreHit};
use atelier_storage::{MemoryStore, QdrantStore};

use crate::{BoxFuture, Result};

/// Read side of the catalog: lexical and nearest-neighbour search per corpus.
///
/// Hits come back ordered by decreasing score and never exceed `top_k`.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn search_keyword<'a>(
		&'a self,
		corpus: Corpus,
		text: &'a str,
		filter: &'a FilterSpec,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>>;

	fn search_vector<'a>(
		&'a self,
		corpus: Corpus,
		vector: &'a [f32],
		filter: &'a FilterSpec,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>>;
}

impl DocumentStore for QdrantStore {
	fn search_keyword<'a>(
		&'a self,
		corpus: Corpus,
		text: &'a str,
		filter: &'a FilterSpec,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>> {
		Box::pin(
			async move { Ok(QdrantStore::search_keyword(self, corpus, text, filter, top_k).await?) },
		)
	}

	fn search_vector<'a>(
		&'a self,
		corpus: Corpus,
		vector: &'a [f32],
		filter: &'a FilterSpec,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>> {
		Box::pin(
			async move { Ok(QdrantStore::search_vector(self, corpus, vector, filter, top_k).await?) },
		)
	}
}

impl DocumentStore for MemoryStore {
	fn search_keyword<'a>(
		&'a self,
		corpus: Corpus,
		text: &'a str,
		filter: &'a FilterSpec,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>> {
		let hits = MemoryStore::search_keyword(self, corpus, text, filter, top_k);

		Box::pin(async move { Ok(hits) })
	}

	fn search_vector<'a>(
		&'a self,
		corpus: Corpus,
		vector: &'a [f32],
		filter: &'a FilterSpec,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<StoreHit>>> {
		let hits = MemoryStore::search_vector(self, corpus, vector, filter, top_k);

		Box::pin(async move { Ok(hits) })
	}
}
