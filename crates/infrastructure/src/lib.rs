//! 基础设施层实现。
//!
//! 提供 Postgres 连接池、迁移器以及应用层工作单元接口的数据库实现。

pub mod db;
pub mod pg_store;

pub use db::{create_pg_pool, MIGRATOR};
pub use pg_store::PgUnitOfWork;
