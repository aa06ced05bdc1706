use atelier_domain::Intent;
use atelier_providers::{ChatMessage, CompletionRequest};

use crate::{AtelierService, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
	pub intent: Intent,
	/// False when the model answered with something other than a known label.
	pub recognized: bool,
	pub total_tokens: u32,
}

impl AtelierService {
	/// Classifies the query with a single zero-temperature completion. Not retried.
	pub async fn route(&self, text: &str, simplified: bool) -> Result<RouteDecision> {
		let request = CompletionRequest {
			messages: build_routing_messages(text, simplified),
			temperature: 0.0,
			max_tokens: self.cfg.routing.max_tokens,
		};
		let completion = self.providers.llm.complete(&self.cfg.providers.llm, &request).await?;
		let parsed = Intent::from_label(&completion.text);

		Ok(RouteDecision {
			intent: parsed.unwrap_or(Intent::Product),
			recognized: parsed.is_some(),
			total_tokens: completion.total_tokens(),
		})
	}
}

pub fn build_routing_messages(query: &str, simplified: bool) -> Vec<ChatMessage> {
	let prompt = if simplified {
		format!(
			"Label the query as FAQ or Product for a clothing store.\n\n\
FAQ: store info, policies (refund/return), contact/support, promotions/newsletter, account, sizes.\n\
Product: asks for items or recommendations using the catalog (color/type/price/availability) or outfit/look ideas.\n\n\
Examples: refund -> FAQ; store location -> FAQ; sizes -> FAQ; contact/support -> FAQ; promotions -> FAQ; \
cheapest T-shirts -> Product; blue T-shirts under $100 -> Product; sunny look ideas -> Product.\n\n\
Return only: FAQ or Product.\nQuery: {query}"
		)
	} else {
		format!(
			"Label the following instruction as an FAQ related answer or a product related answer for a clothing store.\n\
Product related answers are answers specific about product information or that need to use the products to give an answer.\n\
Examples:\n\
Is there a refund for incorrectly bought clothes? Label: FAQ\n\
Where are your stores located? Label: FAQ\n\
Tell me about the cheapest T-shirts that you have. Label: Product\n\
Do you have blue T-shirts under 100 dollars? Label: Product\n\
What are the available sizes for the t-shirts? Label: FAQ\n\
How can I contact you via phone? Label: FAQ\n\
How can I find the promotions? Label: FAQ\n\
Give me ideas for a sunny look. Label: Product\n\
Return only one of the two labels: FAQ or Product, nothing more.\n\
Query to classify: {query}"
		)
	};

	vec![ChatMessage::user(prompt)]
}
