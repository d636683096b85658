// file: src/database/mod.rs
// description: task metadata and description log storage
// reference: https://docs.rs/lancedb, https://docs.rs/sqlx

pub mod description_log;
pub mod lance;
pub mod postgres;
pub mod store;
pub mod task_table;

pub use description_log::{DescriptionLog, InMemoryDescriptionLog};
pub use lance::LanceDbDescriptionLog;
pub use postgres::PgTaskTable;
pub use store::TaskStateStore;
pub use task_table::{InMemoryTaskTable, TaskTable};
