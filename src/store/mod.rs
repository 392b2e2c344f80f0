//! Pack storage: the embedded graph + vector store shared by expansion and retrieval

mod sqlite;
mod traits;
mod vector;

pub use sqlite::SqlitePackStore;
pub use traits::{
    ArticleRef, ArticleState, Direction, EntityRecord, Extraction, NewSection, PackStats,
    PackStore, RelationRecord, SectionHit, SectionRow, StoreError, StoreResult,
};
pub use vector::cosine_similarity;
