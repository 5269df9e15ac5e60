pub mod db;
pub mod journal_repo;

pub use db::{SjrStore, StoreError};
pub use journal_repo::JournalRepo;
