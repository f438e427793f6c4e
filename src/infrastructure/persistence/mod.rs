pub mod database;
pub mod order_repository;
pub mod position_repository;

pub use database::Database;
pub use order_repository::SqliteOrderRepository;
pub use position_repository::SqlitePositionRepository;
