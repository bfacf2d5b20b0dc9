//! 用户数据访问层（DAO）
//!
//! 负责 chat_users 表的所有数据库操作。

use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

use crate::chat::error::ChatResult;
use crate::chat::models::LocalChatUser;

/// 用户 DAO（基于 sqlx）
pub struct ChatUserDao {
    db: Pool<Sqlite>,
}

impl ChatUserDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 初始化用户表结构（幂等）
    pub async fn init_db(db: &Pool<Sqlite>) -> ChatResult<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS chat_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                age INTEGER NOT NULL,
                gender TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#;
        sqlx::query(sql).execute(db).await?;
        Ok(())
    }

    /// 插入或更新用户（按 user_id 整行替换）
    pub async fn upsert_user(&self, user: &LocalChatUser) -> ChatResult<()> {
        let sql = r#"
            INSERT INTO chat_users (user_id, name, age, gender, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                name = excluded.name,
                age = excluded.age,
                gender = excluded.gender,
                created_at = excluded.created_at
        "#;
        sqlx::query(sql)
            .bind(&user.user_id)
            .bind(&user.name)
            .bind(user.age)
            .bind(&user.gender)
            .bind(&user.created_at)
            .execute(&self.db)
            .await?;

        debug!("[UserDAO] 已保存用户: {}", user.user_id);
        Ok(())
    }

    /// 获取当前用户：created_at 最新的一行，表为空时返回 None
    pub async fn get_current_user(&self) -> ChatResult<Option<LocalChatUser>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, name, age, gender, created_at
            FROM chat_users
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|row| LocalChatUser {
            user_id: row.get("user_id"),
            name: row.get("name"),
            age: row.get("age"),
            gender: row.get("gender"),
            created_at: row.get("created_at"),
        }))
    }

    /// 清空用户表
    pub async fn delete_all(&self) -> ChatResult<()> {
        sqlx::query("DELETE FROM chat_users").execute(&self.db).await?;
        Ok(())
    }
}
