//! Metadata store (C2) and blob store (C1) ports with in-process
//! reference implementations. Production deployments swap `InMemoryStore`
//! for a real database and `FilesystemBlobStore` for object storage
//! without touching callers, since both are consumed only through their
//! trait objects.

pub mod blob;
pub mod metadata;

pub use blob::{BlobError, BlobStore, FilesystemBlobStore};
pub use metadata::{InMemoryStore, MetadataStore, StoreError};
