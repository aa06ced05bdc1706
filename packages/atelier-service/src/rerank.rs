use std::cmp::Ordering;

use crate::{AtelierService, Error, RankedCandidate, Result};

impl AtelierService {
	/// Reorders candidates by cross-encoder relevance to `query`.
	///
	/// Errors leave the decision to degrade with the caller; the input order is not touched.
	pub async fn rerank(
		&self,
		query: &str,
		candidates: &[RankedCandidate],
	) -> Result<Vec<RankedCandidate>> {
		if candidates.is_empty() {
			return Ok(Vec::new());
		}

		let docs: Vec<String> =
			candidates.iter().map(|candidate| candidate.document.rerank_text()).collect();
		let scores =
			self.providers.rerank.rerank(&self.cfg.providers.rerank, query, &docs).await?;

		apply_scores(candidates, &scores).ok_or_else(|| Error::Provider {
			message: format!(
				"Rerank provider returned {} scores for {} candidates.",
				scores.len(),
				candidates.len()
			),
		})
	}
}

/// Stable sort by score descending, renumbering ranks from 1 and carrying the rerank score.
///
/// `None` when the scores do not line up with the candidates.
pub fn apply_scores(
	candidates: &[RankedCandidate],
	scores: &[f32],
) -> Option<Vec<RankedCandidate>> {
	if scores.len() != candidates.len() || scores.iter().any(|score| !score.is_finite()) {
		return None;
	}

	let mut scored: Vec<(f32, &RankedCandidate)> = scores.iter().copied().zip(candidates).collect();

	scored.sort_by(|(left, _), (right, _)| right.partial_cmp(left).unwrap_or(Ordering::Equal));

	Some(
		scored
			.into_iter()
			.zip(1_u32..)
			.map(|((score, candidate), rank)| RankedCandidate { rank, score, ..candidate.clone() })
			.collect(),
	)
}
