//! Database repository layer

pub mod activity_repo;
pub mod memory;
pub mod permit_repo;
pub mod pg_store;
pub mod risk_repo;
pub mod store;
pub mod user_repo;

pub use activity_repo::*;
pub use memory::MemoryStore;
pub use permit_repo::*;
pub use pg_store::PgStore;
pub use risk_repo::*;
pub use store::Store;
pub use user_repo::*;
