// Durable state: value table, per-record artifacts, consolidated outputs

pub mod artifacts;
pub mod in_memory;
pub mod json_file;
pub mod table_store;

pub use artifacts::{ArtifactDraft, ArtifactStore, FsBlobStore, StoredArtifact};
pub use in_memory::{InMemoryBlobStore, InMemoryTableStore};
pub use table_store::JsonFileTableStore;
