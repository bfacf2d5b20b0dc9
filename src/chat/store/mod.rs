//! 本地存储层
//!
//! 三张表（用户、会话、消息）的统一入口。`ChatStore` 持有连接池并
//! 组合三个 DAO，对外提供 CRUD；使用前必须先 `init()`，否则所有
//! 操作返回 `NotInitialized`。

pub mod conversation_dao;
pub mod message_dao;
pub mod user_dao;

use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::chat::db::create_sqlite_pool;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::models::{LocalChatMessage, LocalChatUser, LocalConversation};

pub use conversation_dao::ConversationDao;
pub use message_dao::MessageDao;
pub use user_dao::ChatUserDao;

/// 本地聊天存储
pub struct ChatStore {
    pool: Pool<Sqlite>,
    users: ChatUserDao,
    conversations: ConversationDao,
    messages: MessageDao,
    initialized: AtomicBool,
}

impl ChatStore {
    /// 连接数据库（不建表，需随后调用 `init()`）
    pub async fn connect(db_url: &str) -> ChatResult<Self> {
        let pool = create_sqlite_pool(db_url).await?;
        Ok(Self::new(pool))
    }

    /// 使用已有连接池构建存储
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            users: ChatUserDao::new(pool.clone()),
            conversations: ConversationDao::new(pool.clone()),
            messages: MessageDao::new(pool.clone()),
            pool,
            initialized: AtomicBool::new(false),
        }
    }

    /// 初始化三张表的结构（幂等，可重复调用）
    pub async fn init(&self) -> ChatResult<()> {
        ChatUserDao::init_db(&self.pool).await?;
        ConversationDao::init_db(&self.pool).await?;
        MessageDao::init_db(&self.pool).await?;
        self.initialized.store(true, Ordering::Release);
        info!("[Store] 本地聊天数据库初始化完成");
        Ok(())
    }

    /// 底层连接池（供嵌入方共享连接）
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn ensure_init(&self) -> ChatResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ChatError::NotInitialized)
        }
    }

    /// 保存用户（按 user_id 替换）
    pub async fn save_user(&self, user: &LocalChatUser) -> ChatResult<()> {
        self.ensure_init()?;
        self.users.upsert_user(user).await
    }

    /// 当前用户：created_at 最新的一行；无用户不是错误，返回 None
    pub async fn current_user(&self) -> ChatResult<Option<LocalChatUser>> {
        self.ensure_init()?;
        self.users.get_current_user().await
    }

    /// 保存会话（按 conversation_id 整行替换）
    ///
    /// conversation_id、user_id、created_at、updated_at 为必填，
    /// 缺失时返回 `Validation`，不落库。
    pub async fn save_conversation(&self, conv: &LocalConversation) -> ChatResult<()> {
        self.ensure_init()?;
        if conv.conversation_id.is_empty() {
            return Err(ChatError::Validation("会话缺少 conversation_id".to_string()));
        }
        if conv.user_id.is_empty() {
            return Err(ChatError::Validation("会话缺少 user_id".to_string()));
        }
        if conv.created_at.is_empty() || conv.updated_at.is_empty() {
            return Err(ChatError::Validation("会话缺少时间戳".to_string()));
        }
        self.conversations.upsert_conversation(conv).await
    }

    /// 某用户的全部会话，最近更新在前
    pub async fn conversations_for_user(
        &self,
        user_id: &str,
    ) -> ChatResult<Vec<LocalConversation>> {
        self.ensure_init()?;
        self.conversations.get_conversations_by_user(user_id).await
    }

    /// 某用户最近更新的会话
    pub async fn latest_conversation(
        &self,
        user_id: &str,
    ) -> ChatResult<Option<LocalConversation>> {
        self.ensure_init()?;
        self.conversations.get_latest_conversation(user_id).await
    }

    /// 按 ID 查询单个会话
    pub async fn conversation_by_id(
        &self,
        conversation_id: &str,
    ) -> ChatResult<Option<LocalConversation>> {
        self.ensure_init()?;
        self.conversations
            .get_conversation_by_id(conversation_id)
            .await
    }

    /// 追加一条消息
    ///
    /// 引用校验在应用层完成：conversation_id 必须对应已存在的会话。
    pub async fn append_message(&self, msg: &LocalChatMessage) -> ChatResult<()> {
        self.ensure_init()?;
        if !self
            .conversations
            .conversation_exists(&msg.conversation_id)
            .await?
        {
            return Err(ChatError::Validation(format!(
                "消息引用了不存在的会话: {}",
                msg.conversation_id
            )));
        }
        self.messages.insert_message(msg).await
    }

    /// 会话的全部消息，时间升序
    pub async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> ChatResult<Vec<LocalChatMessage>> {
        self.ensure_init()?;
        self.messages
            .get_messages_by_conversation(conversation_id)
            .await
    }

    /// 清空全部本地数据
    ///
    /// 三条 DELETE 依次执行，不在同一事务中；中途崩溃可能残留
    /// 孤儿行，但孤儿行不可达（引导流程只认当前用户），可接受。
    pub async fn clear_all(&self) -> ChatResult<()> {
        self.ensure_init()?;
        self.messages.delete_all().await?;
        self.conversations.delete_all().await?;
        self.users.delete_all().await?;
        info!("[Store] 已清空全部本地聊天数据");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, ChatStore) {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let store = ChatStore::connect(&url).await.unwrap();
        store.init().await.unwrap();
        (temp, store)
    }

    fn user(user_id: &str, created_at: &str) -> LocalChatUser {
        LocalChatUser {
            user_id: user_id.to_string(),
            name: "测试用户".to_string(),
            age: 30,
            gender: "female".to_string(),
            created_at: created_at.to_string(),
        }
    }

    fn conversation(conversation_id: &str, user_id: &str, updated_at: &str) -> LocalConversation {
        LocalConversation {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            blood_test_id: None,
            analysis_snapshot: None,
            ai_explanation: Some("解读".to_string()),
            overall_risk: Some("low".to_string()),
            created_at: updated_at.to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    fn message(conversation_id: &str, content: &str, is_user: bool, ts: &str) -> LocalChatMessage {
        LocalChatMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            is_user,
            timestamp: ts.to_string(),
        }
    }

    #[tokio::test]
    async fn store_rejects_use_before_init() {
        let temp = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", temp.path().join("t.db").display());
        let store = ChatStore::connect(&url).await.unwrap();

        let err = store.current_user().await.unwrap_err();
        assert!(matches!(err, ChatError::NotInitialized));

        // init 之后即可使用，且重复 init 无副作用
        store.init().await.unwrap();
        store.init().await.unwrap();
        assert!(store.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_upsert_keeps_single_row() {
        let (_temp, store) = setup().await;

        store.save_user(&user("u-1", "2025-01-01T00:00:00Z")).await.unwrap();
        let mut updated = user("u-1", "2025-01-01T00:00:00Z");
        updated.name = "改名用户".to_string();
        store.save_user(&updated).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.current_user().await.unwrap().unwrap().name, "改名用户");
    }

    #[tokio::test]
    async fn current_user_is_most_recently_created() {
        let (_temp, store) = setup().await;

        store.save_user(&user("u-old", "2025-01-01T00:00:00Z")).await.unwrap();
        store.save_user(&user("u-new", "2025-06-01T00:00:00Z")).await.unwrap();

        let current = store.current_user().await.unwrap().unwrap();
        assert_eq!(current.user_id, "u-new");
    }

    #[tokio::test]
    async fn conversation_upsert_replaces_row() {
        let (_temp, store) = setup().await;

        let mut conv = conversation("c-1", "u-1", "2025-05-01T10:00:00Z");
        store.save_conversation(&conv).await.unwrap();

        conv.ai_explanation = Some("第二次解读".to_string());
        conv.updated_at = "2025-05-02T10:00:00Z".to_string();
        store.save_conversation(&conv).await.unwrap();

        let all = store.conversations_for_user("u-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ai_explanation.as_deref(), Some("第二次解读"));
        assert_eq!(all[0].updated_at, "2025-05-02T10:00:00Z");
    }

    #[tokio::test]
    async fn conversation_requires_key_fields() {
        let (_temp, store) = setup().await;

        let mut conv = conversation("", "u-1", "2025-05-01T10:00:00Z");
        assert!(matches!(
            store.save_conversation(&conv).await.unwrap_err(),
            ChatError::Validation(_)
        ));

        conv.conversation_id = "c-1".to_string();
        conv.updated_at = String::new();
        assert!(matches!(
            store.save_conversation(&conv).await.unwrap_err(),
            ChatError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn conversations_ordered_by_updated_at_desc() {
        let (_temp, store) = setup().await;

        // 按 T1、T3、T2 的顺序写入
        store
            .save_conversation(&conversation("c-1", "u-1", "2025-05-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .save_conversation(&conversation("c-3", "u-1", "2025-05-03T00:00:00Z"))
            .await
            .unwrap();
        store
            .save_conversation(&conversation("c-2", "u-1", "2025-05-02T00:00:00Z"))
            .await
            .unwrap();

        let latest = store.latest_conversation("u-1").await.unwrap().unwrap();
        assert_eq!(latest.conversation_id, "c-3");

        let ids: Vec<String> = store
            .conversations_for_user("u-1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.conversation_id)
            .collect();
        assert_eq!(ids, vec!["c-3", "c-2", "c-1"]);
    }

    #[tokio::test]
    async fn messages_keep_timestamp_then_insertion_order() {
        let (_temp, store) = setup().await;
        store
            .save_conversation(&conversation("c-1", "u-1", "2025-05-01T00:00:00Z"))
            .await
            .unwrap();

        // 后两条时间戳相同，应保持插入顺序
        store
            .append_message(&message("c-1", "第一条", true, "2025-05-01T00:00:01Z"))
            .await
            .unwrap();
        store
            .append_message(&message("c-1", "第二条", false, "2025-05-01T00:00:02Z"))
            .await
            .unwrap();
        store
            .append_message(&message("c-1", "第三条", true, "2025-05-01T00:00:02Z"))
            .await
            .unwrap();

        let contents: Vec<String> = store
            .messages_for_conversation("c-1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["第一条", "第二条", "第三条"]);
    }

    #[tokio::test]
    async fn message_requires_existing_conversation() {
        let (_temp, store) = setup().await;

        let err = store
            .append_message(&message("c-missing", "你好", true, "2025-05-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn clear_all_empties_every_table() {
        let (_temp, store) = setup().await;

        store.save_user(&user("u-1", "2025-01-01T00:00:00Z")).await.unwrap();
        store
            .save_conversation(&conversation("c-1", "u-1", "2025-05-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .append_message(&message("c-1", "你好", true, "2025-05-01T00:00:01Z"))
            .await
            .unwrap();

        store.clear_all().await.unwrap();

        assert!(store.current_user().await.unwrap().is_none());
        assert!(store.conversations_for_user("u-1").await.unwrap().is_empty());
        assert!(store.messages_for_conversation("c-1").await.unwrap().is_empty());
    }
}
