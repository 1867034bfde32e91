// Parcel Infrastructure - SQLite Adapter
// Implements: JobQueue, ResultStore, Maintenance

mod connection;
mod error;
mod job_queue;
mod maintenance_impl;
mod migration;
mod result_store;

pub use connection::create_pool;
pub use job_queue::SqliteJobQueue;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use result_store::SqliteResultStore;

pub use sqlx::SqlitePool;

// sqlx::Error cannot implement Into<AppError> here (orphan rules);
// every query maps through error::map_sqlx_error instead
