//! SQLite 数据库工具：统一创建连接池
//!
//! 表结构由各 DAO 通过 `CREATE TABLE IF NOT EXISTS` 幂等创建，
//! 本文件只负责连接池本身。

use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::chat::error::ChatResult;

/// 创建 SQLite 连接池
///
/// `db_url` 形如 `sqlite://ai_chat.db?mode=rwc` 或 `sqlite:///abs/path.db?mode=rwc`
pub async fn create_sqlite_pool(db_url: &str) -> ChatResult<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    Ok(pool)
}
