//! 消息数据访问层（DAO）
//!
//! 负责 chat_messages 表的所有数据库操作。消息只增不改，
//! 会话内按 timestamp 升序即为对话顺序，时间相同按插入顺序。

use sqlx::{Pool, Row, Sqlite};

use crate::chat::error::ChatResult;
use crate::chat::models::LocalChatMessage;

/// 消息 DAO（基于 sqlx）
pub struct MessageDao {
    db: Pool<Sqlite>,
}

impl MessageDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 初始化消息表结构（幂等）
    pub async fn init_db(db: &Pool<Sqlite>) -> ChatResult<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                content TEXT NOT NULL,
                is_user INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )
        "#;
        sqlx::query(sql).execute(db).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation \
             ON chat_messages(conversation_id, timestamp)",
        )
        .execute(db)
        .await?;
        Ok(())
    }

    /// 追加一条消息
    pub async fn insert_message(&self, msg: &LocalChatMessage) -> ChatResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (conversation_id, content, is_user, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&msg.conversation_id)
        .bind(&msg.content)
        .bind(if msg.is_user { 1 } else { 0 })
        .bind(&msg.timestamp)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// 查询会话的全部消息，按时间升序（同一时刻按插入顺序）
    pub async fn get_messages_by_conversation(
        &self,
        conversation_id: &str,
    ) -> ChatResult<Vec<LocalChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, content, is_user, timestamp
            FROM chat_messages
            WHERE conversation_id = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let is_user: i64 = row.get("is_user");
                LocalChatMessage {
                    conversation_id: row.get("conversation_id"),
                    content: row.get("content"),
                    is_user: is_user != 0,
                    timestamp: row.get("timestamp"),
                }
            })
            .collect())
    }

    /// 清空消息表
    pub async fn delete_all(&self) -> ChatResult<()> {
        sqlx::query("DELETE FROM chat_messages")
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
