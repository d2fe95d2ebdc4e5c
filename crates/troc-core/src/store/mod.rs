pub mod db;
pub mod thread_store;

pub use db::Database;
pub use thread_store::ThreadStore;
