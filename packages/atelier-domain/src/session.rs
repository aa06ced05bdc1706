use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
	pub role: Role,
	pub text: String,
	pub token_count: u32,
}
impl ConversationTurn {
	pub fn new(role: Role, text: impl Into<String>, token_count: u32) -> Self {
		Self { role, text: text.into(), token_count }
	}

	/// Builds a turn whose token count is estimated from the text.
	pub fn estimated(role: Role, text: impl Into<String>) -> Self {
		let text = text.into();
		let token_count = tokens::estimate_tokens(&text);

		Self { role, text, token_count }
	}
}

/// Turn history for one identity, bounded by a token budget.
///
/// After every `append` the running total stays within the budget unless the turn that was just
/// appended is larger than the whole budget on its own; that turn is kept and every older turn is
/// evicted.
#[derive(Debug, Clone)]
pub struct ConversationSession {
	identity_id: String,
	budget: u32,
	turns: VecDeque<ConversationTurn>,
	total_tokens: u64,
}
impl ConversationSession {
	pub fn new(identity_id: impl Into<String>, budget: u32) -> Self {
		Self { identity_id: identity_id.into(), budget, turns: VecDeque::new(), total_tokens: 0 }
	}

	pub fn identity_id(&self) -> &str {
		&self.identity_id
	}

	pub fn budget(&self) -> u32 {
		self.budget
	}

	pub fn total_tokens(&self) -> u64 {
		self.total_tokens
	}

	pub fn len(&self) -> usize {
		self.turns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.turns.is_empty()
	}

	/// Appends a turn and returns how many older turns were evicted.
	pub fn append(&mut self, turn: ConversationTurn) -> usize {
		self.total_tokens += u64::from(turn.token_count);
		self.turns.push_back(turn);

		let mut evicted = 0;

		while self.total_tokens > u64::from(self.budget) && self.turns.len() > 1 {
			let Some(oldest) = self.turns.pop_front() else { break };

			self.total_tokens -= u64::from(oldest.token_count);
			evicted += 1;
		}

		evicted
	}

	pub fn snapshot(&self) -> Vec<ConversationTurn> {
		self.turns.iter().cloned().collect()
	}

	pub fn clear(&mut self) {
		self.turns.clear();

		self.total_tokens = 0;
	}
}

/// Caller-owned sessions keyed by identity.
///
/// The registry performs no locking; callers serialize access per identity.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
	budget: u32,
	sessions: HashMap<String, ConversationSession>,
}
impl SessionRegistry {
	pub fn new(budget: u32) -> Self {
		Self { budget, sessions: HashMap::new() }
	}

	pub fn budget(&self) -> u32 {
		self.budget
	}

	pub fn get(&self, identity_id: &str) -> Option<&ConversationSession> {
		self.sessions.get(identity_id)
	}

	pub fn session_mut(&mut self, identity_id: &str) -> &mut ConversationSession {
		let budget = self.budget;

		self.sessions
			.entry(identity_id.to_string())
			.or_insert_with(|| ConversationSession::new(identity_id, budget))
	}

	pub fn remove(&mut self, identity_id: &str) -> Option<ConversationSession> {
		self.sessions.remove(identity_id)
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}
