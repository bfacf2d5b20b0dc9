//! 会话数据访问层（DAO）
//!
//! 负责 chat_conversations 表的所有数据库操作。

use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

use crate::chat::error::ChatResult;
use crate::chat::models::LocalConversation;

/// 会话 DAO（基于 sqlx）
pub struct ConversationDao {
    db: Pool<Sqlite>,
}

impl ConversationDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 初始化会话表结构（幂等）
    pub async fn init_db(db: &Pool<Sqlite>) -> ChatResult<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                blood_test_id TEXT,
                analysis_snapshot TEXT,
                ai_explanation TEXT,
                overall_risk TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#;
        sqlx::query(sql).execute(db).await?;
        Ok(())
    }

    /// 插入或更新会话（按 conversation_id 整行替换）
    pub async fn upsert_conversation(&self, conv: &LocalConversation) -> ChatResult<()> {
        let sql = r#"
            INSERT INTO chat_conversations (
                conversation_id,
                user_id,
                blood_test_id,
                analysis_snapshot,
                ai_explanation,
                overall_risk,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET
                user_id = excluded.user_id,
                blood_test_id = excluded.blood_test_id,
                analysis_snapshot = excluded.analysis_snapshot,
                ai_explanation = excluded.ai_explanation,
                overall_risk = excluded.overall_risk,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
        "#;
        sqlx::query(sql)
            .bind(&conv.conversation_id)
            .bind(&conv.user_id)
            .bind(&conv.blood_test_id)
            .bind(&conv.analysis_snapshot)
            .bind(&conv.ai_explanation)
            .bind(&conv.overall_risk)
            .bind(&conv.created_at)
            .bind(&conv.updated_at)
            .execute(&self.db)
            .await?;

        debug!("[ConvDAO] 已保存会话: {}", conv.conversation_id);
        Ok(())
    }

    /// 查询某用户的全部会话，按 updated_at 倒序（最近更新在前）
    pub async fn get_conversations_by_user(
        &self,
        user_id: &str,
    ) -> ChatResult<Vec<LocalConversation>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, user_id, blood_test_id, analysis_snapshot,
                   ai_explanation, overall_risk, created_at, updated_at
            FROM chat_conversations
            WHERE user_id = ?
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let conversations: Vec<LocalConversation> =
            rows.into_iter().map(Self::row_to_conversation).collect();

        debug!(
            "[ConvDAO] 用户 {} 共 {} 个会话",
            user_id,
            conversations.len()
        );
        Ok(conversations)
    }

    /// 查询某用户最近更新的会话
    pub async fn get_latest_conversation(
        &self,
        user_id: &str,
    ) -> ChatResult<Option<LocalConversation>> {
        let row = sqlx::query(
            r#"
            SELECT conversation_id, user_id, blood_test_id, analysis_snapshot,
                   ai_explanation, overall_risk, created_at, updated_at
            FROM chat_conversations
            WHERE user_id = ?
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Self::row_to_conversation))
    }

    /// 根据会话 ID 查询单个会话
    pub async fn get_conversation_by_id(
        &self,
        conversation_id: &str,
    ) -> ChatResult<Option<LocalConversation>> {
        let row = sqlx::query(
            r#"
            SELECT conversation_id, user_id, blood_test_id, analysis_snapshot,
                   ai_explanation, overall_risk, created_at, updated_at
            FROM chat_conversations
            WHERE conversation_id = ?
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Self::row_to_conversation))
    }

    /// 会话是否存在（供消息写入前的引用校验）
    pub async fn conversation_exists(&self, conversation_id: &str) -> ChatResult<bool> {
        let row = sqlx::query("SELECT 1 FROM chat_conversations WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    /// 清空会话表
    pub async fn delete_all(&self) -> ChatResult<()> {
        sqlx::query("DELETE FROM chat_conversations")
            .execute(&self.db)
            .await?;
        Ok(())
    }

    fn row_to_conversation(row: sqlx::sqlite::SqliteRow) -> LocalConversation {
        LocalConversation {
            conversation_id: row.get("conversation_id"),
            user_id: row.get("user_id"),
            blood_test_id: row.get("blood_test_id"),
            analysis_snapshot: row.get("analysis_snapshot"),
            ai_explanation: row.get("ai_explanation"),
            overall_risk: row.get("overall_risk"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}
