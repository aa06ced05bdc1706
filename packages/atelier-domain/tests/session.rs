use atelier_domain::{ConversationSession, ConversationTurn, Role, SessionRegistry};

fn turn(role: Role, text: &str, tokens: u32) -> ConversationTurn {
	ConversationTurn::new(role, text, tokens)
}

#[test]
fn append_within_budget_keeps_everything() {
	let mut session = ConversationSession::new("u1", 100);

	assert_eq!(session.append(turn(Role::User, "hi", 10)), 0);
	assert_eq!(session.append(turn(Role::Assistant, "hello", 20)), 0);
	assert_eq!(session.len(), 2);
	assert_eq!(session.total_tokens(), 30);
}

#[test]
fn oldest_turns_are_evicted_first() {
	let mut session = ConversationSession::new("u1", 50);

	session.append(turn(Role::User, "one", 20));
	session.append(turn(Role::Assistant, "two", 20));

	let evicted = session.append(turn(Role::User, "three", 20));
	let texts: Vec<String> = session.snapshot().into_iter().map(|turn| turn.text).collect();

	assert_eq!(evicted, 1);
	assert_eq!(texts, vec!["two", "three"]);
	assert_eq!(session.total_tokens(), 40);
}

#[test]
fn total_never_exceeds_budget_over_many_appends() {
	let mut session = ConversationSession::new("u1", 64);

	for idx in 0..200_u32 {
		let role = if idx % 2 == 0 { Role::User } else { Role::Assistant };

		session.append(turn(role, "text", idx % 17 + 1));

		assert!(session.total_tokens() <= 64, "total {} after {idx}", session.total_tokens());

		let sum: u64 = session.snapshot().iter().map(|turn| u64::from(turn.token_count)).sum();

		assert_eq!(sum, session.total_tokens());
	}
}

#[test]
fn oversized_turn_is_retained_alone() {
	let mut session = ConversationSession::new("u1", 10);

	session.append(turn(Role::User, "short", 4));
	session.append(turn(Role::Assistant, "short", 4));

	let evicted = session.append(turn(Role::User, "a very long message", 25));
	let snapshot = session.snapshot();

	assert_eq!(evicted, 2);
	assert_eq!(snapshot.len(), 1);
	assert_eq!(snapshot[0].text, "a very long message");
	assert_eq!(session.total_tokens(), 25);
}

#[test]
fn snapshot_has_no_side_effects() {
	let mut session = ConversationSession::new("u1", 100);

	session.append(turn(Role::User, "hi", 10));

	let first = session.snapshot();
	let second = session.snapshot();

	assert_eq!(first, second);
	assert_eq!(session.len(), 1);
}

#[test]
fn registry_creates_sessions_with_shared_budget() {
	let mut registry = SessionRegistry::new(32);

	registry.session_mut("alice").append(ConversationTurn::estimated(Role::User, "Hi there"));
	registry.session_mut("bob");

	assert_eq!(registry.len(), 2);
	assert_eq!(registry.get("alice").map(ConversationSession::len), Some(1));
	assert_eq!(registry.get("bob").map(ConversationSession::budget), Some(32));
	assert!(registry.remove("alice").is_some());
	assert!(registry.get("alice").is_none());
}
