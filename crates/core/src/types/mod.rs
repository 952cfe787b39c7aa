pub mod ids;
pub mod page;
pub mod slug;

pub use ids::{CommentId, EntityId, UserId};
pub use page::PageRequest;
pub use slug::Slug;
