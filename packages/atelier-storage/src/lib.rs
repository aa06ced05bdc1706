pub mod memory;
pub mod qdrant;

mod error;

pub use error::Error;
pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

pub type Result<T, E = Error> = std::result::Result<T, E>;
