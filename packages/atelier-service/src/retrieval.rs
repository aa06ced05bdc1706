use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use serde::Serialize;

use atelier_domain::{Corpus, Document, FilterSpec, StoreHit};

use crate::{AtelierService, Error, Result, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
	Keyword,
	Vector,
	Hybrid,
}
impl CandidateSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Keyword => "keyword",
			Self::Vector => "vector",
			Self::Hybrid => "hybrid",
		}
	}
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
	pub doc_id: String,
	pub source: CandidateSource,
	/// 1-based position within the source list.
	pub rank: u32,
	pub score: f32,
	pub document: Arc<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
	pub doc_id: String,
	pub score: f64,
	pub keyword_rank: Option<u32>,
	pub vector_rank: Option<u32>,
}
impl FusedResult {
	fn tie_rank(&self) -> u32 {
		self.keyword_rank.or(self.vector_rank).unwrap_or(u32::MAX)
	}
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
	pub candidates: Vec<RankedCandidate>,
	/// Sub-retrievals of a hybrid run that failed while the other side succeeded.
	pub failed_sources: Vec<CandidateSource>,
}

impl AtelierService {
	/// Runs one retrieval strategy against a corpus.
	///
	/// Hybrid runs both sub-retrievals concurrently and fuses whatever succeeded; it only fails
	/// when both sides fail.
	pub async fn retrieve(
		&self,
		corpus: Corpus,
		strategy: Strategy,
		text: &str,
		filter: &FilterSpec,
		top_k: u32,
		alpha: f32,
		k_rrf: u32,
	) -> Result<RetrievalOutcome> {
		if top_k == 0 {
			return Err(Error::InvalidParameter {
				message: "top_k must be greater than zero.".to_string(),
			});
		}

		let complete = |candidates| RetrievalOutcome { candidates, failed_sources: Vec::new() };

		match strategy {
			Strategy::Keyword =>
				self.retrieve_keyword(corpus, text, filter, top_k).await.map(complete),
			Strategy::Vector => self.retrieve_vector(corpus, text, filter, top_k).await.map(complete),
			Strategy::Hybrid => {
				let (keyword, vector) = tokio::join!(
					self.retrieve_keyword(corpus, text, filter, top_k),
					self.retrieve_vector(corpus, text, filter, top_k)
				);
				let mut failed_sources = Vec::new();
				let keyword = match keyword {
					Ok(list) => list,
					Err(err) => {
						if let Err(vector_err) = &vector {
							tracing::warn!(error = %vector_err, "Vector sub-retrieval failed.");

							return Err(err);
						}

						tracing::warn!(
							error = %err,
							"Keyword sub-retrieval failed; fusing vector results only."
						);
						failed_sources.push(CandidateSource::Keyword);

						Vec::new()
					},
				};
				let vector = match vector {
					Ok(list) => list,
					Err(err) => {
						tracing::warn!(
							error = %err,
							"Vector sub-retrieval failed; fusing keyword results only."
						);
						failed_sources.push(CandidateSource::Vector);

						Vec::new()
					},
				};
				let fused = fuse(&keyword, &vector, alpha, k_rrf, top_k);

				Ok(RetrievalOutcome {
					candidates: fused_candidates(fused, &keyword, &vector),
					failed_sources,
				})
			},
		}
	}

	async fn retrieve_keyword(
		&self,
		corpus: Corpus,
		text: &str,
		filter: &FilterSpec,
		top_k: u32,
	) -> Result<Vec<RankedCandidate>> {
		let hits = self.store.search_keyword(corpus, text, filter, top_k).await?;

		Ok(ranked(hits, CandidateSource::Keyword, top_k))
	}

	async fn retrieve_vector(
		&self,
		corpus: Corpus,
		text: &str,
		filter: &FilterSpec,
		top_k: u32,
	) -> Result<Vec<RankedCandidate>> {
		let cfg = &self.cfg.providers.embedding;
		let embeddings = self.providers.embedding.embed(cfg, &[text.to_string()]).await?;
		let Some(vector) = embeddings.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		let hits = self.store.search_vector(corpus, &vector, filter, top_k).await?;

		Ok(ranked(hits, CandidateSource::Vector, top_k))
	}
}

/// Weighted reciprocal rank fusion. A list the document is absent from contributes nothing.
pub fn rrf_score(
	alpha: f64,
	k_rrf: u32,
	keyword_rank: Option<u32>,
	vector_rank: Option<u32>,
) -> f64 {
	let k = f64::from(k_rrf);
	let keyword = keyword_rank.map_or(0.0, |rank| alpha / (k + f64::from(rank)));
	let vector = vector_rank.map_or(0.0, |rank| (1.0 - alpha) / (k + f64::from(rank)));

	keyword + vector
}

/// Fused score descending, then the keyword rank (or vector rank when absent) ascending, then id.
pub fn compare_fused(left: &FusedResult, right: &FusedResult) -> Ordering {
	right
		.score
		.partial_cmp(&left.score)
		.unwrap_or(Ordering::Equal)
		.then_with(|| left.tie_rank().cmp(&right.tie_rank()))
		.then_with(|| left.doc_id.cmp(&right.doc_id))
}

pub fn fuse(
	keyword: &[RankedCandidate],
	vector: &[RankedCandidate],
	alpha: f32,
	k_rrf: u32,
	top_k: u32,
) -> Vec<FusedResult> {
	let mut ranks: HashMap<&str, (Option<u32>, Option<u32>)> = HashMap::new();

	for candidate in keyword {
		let entry = ranks.entry(candidate.doc_id.as_str()).or_default();

		entry.0 = Some(entry.0.map_or(candidate.rank, |rank| rank.min(candidate.rank)));
	}
	for candidate in vector {
		let entry = ranks.entry(candidate.doc_id.as_str()).or_default();

		entry.1 = Some(entry.1.map_or(candidate.rank, |rank| rank.min(candidate.rank)));
	}

	let alpha = f64::from(alpha);
	let mut fused: Vec<FusedResult> = ranks
		.into_iter()
		.map(|(doc_id, (keyword_rank, vector_rank))| FusedResult {
			doc_id: doc_id.to_string(),
			score: rrf_score(alpha, k_rrf, keyword_rank, vector_rank),
			keyword_rank,
			vector_rank,
		})
		.collect();

	fused.sort_by(compare_fused);
	fused.truncate(top_k as usize);

	fused
}

fn ranked(hits: Vec<StoreHit>, source: CandidateSource, top_k: u32) -> Vec<RankedCandidate> {
	hits.into_iter()
		.take(top_k as usize)
		.zip(1_u32..)
		.map(|(hit, rank)| RankedCandidate {
			doc_id: hit.document.id.clone(),
			source,
			rank,
			score: hit.score,
			document: hit.document,
		})
		.collect()
}

fn fused_candidates(
	fused: Vec<FusedResult>,
	keyword: &[RankedCandidate],
	vector: &[RankedCandidate],
) -> Vec<RankedCandidate> {
	let mut documents: HashMap<&str, &Arc<Document>> = HashMap::new();

	for candidate in keyword.iter().chain(vector) {
		documents.entry(candidate.doc_id.as_str()).or_insert(&candidate.document);
	}

	fused
		.into_iter()
		.filter_map(|result| {
			let document = Arc::clone(documents.get(result.doc_id.as_str())?);

			Some((result, document))
		})
		.zip(1_u32..)
		.map(|((result, document), rank)| RankedCandidate {
			doc_id: result.doc_id,
			source: CandidateSource::Hybrid,
			rank,
			score: result.score as f32,
			document,
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use serde_json::Map;

	use super::*;

	fn list(ids: &[&str], source: CandidateSource) -> Vec<RankedCandidate> {
		ids.iter()
			.zip(1_u32..)
			.map(|(id, rank)| RankedCandidate {
				doc_id: id.to_string(),
				source,
				rank,
				score: 1.0 / rank as f32,
				document: Arc::new(Document {
					id: id.to_string(),
					corpus: Corpus::Products,
					title: id.to_string(),
					text: String::new(),
					attributes: Map::new(),
				}),
			})
			.collect()
	}

	fn ids(fused: &[FusedResult]) -> Vec<&str> {
		fused.iter().map(|result| result.doc_id.as_str()).collect()
	}

	#[test]
	fn equal_weight_fusion_breaks_ties_by_keyword_rank_then_id() {
		let keyword = list(&["A", "B", "C"], CandidateSource::Keyword);
		let vector = list(&["B", "A", "D"], CandidateSource::Vector);
		let fused = fuse(&keyword, &vector, 0.5, 60, 10);

		assert_eq!(ids(&fused), vec!["A", "B", "C", "D"]);
		assert_eq!(fused[3].keyword_rank, None);
		assert_eq!(fused[3].vector_rank, Some(3));
	}

	#[test]
	fn score_decreases_with_either_rank() {
		for alpha in [0.2, 0.5, 0.8] {
			let best = rrf_score(alpha, 60, Some(1), Some(1));

			for rank in 2..50 {
				assert!(rrf_score(alpha, 60, Some(rank), Some(1)) < best);
				assert!(rrf_score(alpha, 60, Some(1), Some(rank)) < best);
				assert!(
					rrf_score(alpha, 60, Some(rank), Some(1))
						< rrf_score(alpha, 60, Some(rank - 1), Some(1))
				);
			}
		}
	}

	#[test]
	fn absent_term_vanishes() {
		assert_eq!(rrf_score(0.5, 60, None, None), 0.0);
		assert_eq!(rrf_score(1.0, 60, None, Some(1)), 0.0);
		assert!((rrf_score(0.5, 60, Some(1), None) - 0.5 / 61.0).abs() < 1e-12);
	}

	#[test]
	fn fusion_is_deterministic_and_truncated() {
		let keyword = list(&["x", "y", "z", "w"], CandidateSource::Keyword);
		let vector = list(&["w", "z", "q"], CandidateSource::Vector);
		let first = fuse(&keyword, &vector, 0.3, 10, 3);
		let second = fuse(&keyword, &vector, 0.3, 10, 3);

		assert_eq!(first, second);
		assert_eq!(first.len(), 3);
	}

	#[test]
	fn empty_lists_fuse_to_nothing() {
		assert!(fuse(&[], &[], 0.5, 60, 5).is_empty());
	}

	#[test]
	fn fused_candidates_keep_shared_documents() {
		let keyword = list(&["A", "B"], CandidateSource::Keyword);
		let vector = list(&["B", "C"], CandidateSource::Vector);
		let fused = fuse(&keyword, &vector, 0.5, 60, 10);
		let candidates = fused_candidates(fused, &keyword, &vector);

		assert_eq!(candidates.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
		assert!(candidates.iter().all(|c| c.source == CandidateSource::Hybrid));
		assert!(Arc::ptr_eq(&candidates[0].document, &keyword[1].document));
	}
}
