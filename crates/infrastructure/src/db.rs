//! 数据库连接与迁移

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 嵌入式迁移器，启动时对目标库执行 `migrations/` 下的全部迁移。
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
