//! SQLite adapters for the repository ports
//!
//! Schema creation lives in `imtag_common::db`; this module only reads and
//! writes rows.

pub mod images;
pub mod model_tag;
pub mod session;

pub use images::SqliteImagesRepository;
pub use model_tag::SqliteModelTagRepository;
pub use session::{SessionConnection, SqliteSession};

/// UNIQUE constraint failure
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// FOREIGN KEY constraint failure
pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
