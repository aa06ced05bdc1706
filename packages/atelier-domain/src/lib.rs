pub mod document;
pub mod filter;
pub mod intent;
pub mod session;
pub mod tokens;

pub use document::{Corpus, Document, StoreHit};
pub use filter::{Constraint, FilterSpec};
pub use intent::Intent;
pub use session::{ConversationSession, ConversationTurn, Role, SessionRegistry};
