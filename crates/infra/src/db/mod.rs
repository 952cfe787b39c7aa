pub mod comments_repo;
pub mod entity_lookup;
pub mod migrations;
pub mod pool;
pub mod posts_repo;

pub use comments_repo::PgCommentRepository;
pub use entity_lookup::{build_registry, PgPostResolver, PgProfileResolver};
pub use migrations::run_migrations;
pub use pool::{connect_lazy, DbPool, DbPoolError};
pub use posts_repo::{
    create_post, delete_post, find_post_by_slug, find_post_owner, list_posts, update_post,
    PostInput, PostOwner, PostRecord, PostsRepoError, SlugChoice,
};

use marginalia_core::comments::RepositoryError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err)
            if db_err.is_foreign_key_violation() || db_err.is_check_violation() =>
        {
            RepositoryError::Constraint(db_err.message().to_string())
        }
        sqlx::Error::ColumnDecode { index, source } => {
            RepositoryError::InvalidRow(format!("column {index}: {source}"))
        }
        other => RepositoryError::Backend(Box::new(other)),
    }
}
