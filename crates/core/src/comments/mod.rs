//! Polymorphic threaded comments.
//!
//! A comment hangs off any registered commentable entity through a
//! `CommentTarget` and may reply to another comment through `parent`.
//! `CommentStore` resolves targets via the `EntityRegistry` and persists through
//! a `CommentRepository`.

pub mod memory;
pub mod registry;
pub mod repository;
pub mod store;

pub use registry::{EntityRegistry, EntityResolver};
pub use repository::{CommentRepository, RepositoryError};
pub use store::{CommentStore, CommentStoreError, ParentPolicy};
