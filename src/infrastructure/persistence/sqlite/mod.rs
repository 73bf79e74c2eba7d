//! SQLite 持久化实现

mod book_repo;
mod database;
mod progress_repo;

pub use book_repo::SqliteBookRepository;
pub use database::{create_pool, run_migrations, DatabaseConfig, DbPool};
pub use progress_repo::SqliteProgressRepository;
