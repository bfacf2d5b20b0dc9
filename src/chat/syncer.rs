//! 会话同步服务层
//!
//! 本地存储与远端 AI 服务之间的编排核心：用户引导、化验分析提交、
//! 会话续聊、进入时的恢复决策、本地重置。上层 UI 只经过这里访问
//! 数据，既不直接读写本地库，也不直接调用远端接口。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chat::api::{HealthAiApi, HttpHealthAiApi};
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::models::{LocalChatMessage, LocalChatUser, LocalConversation};
use crate::chat::store::ChatStore;
use crate::chat::types::{AnalysisData, AnalyzeRequest, ChatTurn, LabReport};

/// 进入时最多展示的可恢复会话数
const RESUME_CANDIDATES: usize = 3;

/// 同步器配置
pub struct ChatSyncerConfig {
    /// 远端 AI 服务基础 URL
    pub api_base_url: String,
    /// SQLite 数据库 URL，如 "sqlite://ai_chat.db?mode=rwc"
    pub db_path: String,
}

/// 创建远端用户所需的资料
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub name: String,
    pub age: i64,
    pub gender: String,
}

/// 同步器持有的显式会话上下文
///
/// 当前用户与活跃会话都在这里，不依赖任何全局可变状态。
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub user_id: String,
    /// 续聊默认落到的会话；None 表示下一次分析将开启新会话
    pub active_conversation_id: Option<String>,
}

/// 进入聊天时的恢复决策
#[derive(Debug)]
pub enum EntryState {
    /// 没有历史会话，引导用户提交第一次化验分析
    FirstAnalysis,
    /// 存在历史会话，最多给出最近更新的三个候选
    Resumable(Vec<LocalConversation>),
}

/// 恢复会话时返回的重放数据
#[derive(Debug)]
pub struct ResumedConversation {
    pub conversation: LocalConversation,
    pub messages: Vec<LocalChatMessage>,
}

/// 会话同步器
pub struct ChatSyncer {
    store: ChatStore,
    api: Arc<dyn HealthAiApi>,
    session: Option<ChatSession>,
}

impl ChatSyncer {
    /// 按配置创建同步器：建库、建表、建 HTTP 客户端
    pub async fn new(config: ChatSyncerConfig) -> ChatResult<Self> {
        info!(
            "[Syncer] 创建会话同步器，SQLite: {}, API: {}",
            config.db_path, config.api_base_url
        );
        let store = ChatStore::connect(&config.db_path).await?;
        store.init().await?;
        let api = Arc::new(HttpHealthAiApi::new(config.api_base_url.as_str())?);
        Ok(Self::with_store_and_api(store, api))
    }

    /// 使用外部构建好的存储与远端客户端（嵌入方或测试使用）
    pub fn with_store_and_api(store: ChatStore, api: Arc<dyn HealthAiApi>) -> Self {
        Self {
            store,
            api,
            session: None,
        }
    }

    /// 当前会话上下文
    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// 底层存储访问（供测试与嵌入方查询）
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// 用户引导：取本地用户，没有才创建远端用户
    ///
    /// 本地已有用户时不发任何网络请求。远端创建成功而本地保存失败时，
    /// 远端身份成为孤儿，不做自动补救，错误原样抛出。
    pub async fn bootstrap(&mut self, profile: &UserProfile) -> ChatResult<ChatSession> {
        let user_id = match self.store.current_user().await? {
            Some(user) => {
                debug!("[Syncer] 命中本地用户: {}", user.user_id);
                user.user_id
            }
            None => {
                info!("[Syncer] 本地无用户，向远端创建: {}", profile.name);
                let user_id = self
                    .api
                    .create_user(&profile.name, profile.age, &profile.gender)
                    .await?;
                let user = LocalChatUser {
                    user_id: user_id.clone(),
                    name: profile.name.clone(),
                    age: profile.age,
                    gender: profile.gender.clone(),
                    created_at: Utc::now().to_rfc3339(),
                };
                if let Err(e) = self.store.save_user(&user).await {
                    warn!(
                        "[Syncer] ⚠️ 本地保存用户失败，远端身份 {} 已成为孤儿: {}",
                        user_id, e
                    );
                    return Err(e);
                }
                info!("[Syncer] ✅ 用户引导完成: {}", user_id);
                user_id
            }
        };

        // 同一用户重复引导时保留已激活的会话
        let active_conversation_id = self
            .session
            .as_ref()
            .filter(|s| s.user_id == user_id)
            .and_then(|s| s.active_conversation_id.clone());
        let session = ChatSession {
            user_id,
            active_conversation_id,
        };
        self.session = Some(session.clone());
        Ok(session)
    }

    /// 提交化验分析，成功后本地落会话并将其设为活跃
    ///
    /// 至少需要一项指标，否则不发请求直接拒绝。
    pub async fn submit_analysis(&mut self, report: &LabReport) -> ChatResult<AnalysisData> {
        let user_id = self
            .session
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or_else(|| ChatError::Validation("尚未完成用户引导".to_string()))?;

        if report.is_empty() {
            return Err(ChatError::Validation(
                "至少需要填写一项化验指标".to_string(),
            ));
        }

        let req = AnalyzeRequest::from_report(&user_id, report);
        let snapshot = serde_json::to_string(&req)
            .map_err(|e| ChatError::Validation(format!("序列化分析请求失败: {}", e)))?;

        let data = self.api.analyze(&req).await?;

        let now = Utc::now().to_rfc3339();
        let conv = LocalConversation {
            conversation_id: data.conversation_id.clone(),
            user_id,
            blood_test_id: data.blood_test_id.clone(),
            analysis_snapshot: Some(snapshot),
            ai_explanation: Some(data.ai_explanation.clone()),
            overall_risk: Some(data.analysis.overall_risk.clone()),
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.save_conversation(&conv).await?;

        if let Some(session) = self.session.as_mut() {
            session.active_conversation_id = Some(data.conversation_id.clone());
        }
        info!("[Syncer] ✅ 分析会话已落库: {}", data.conversation_id);

        // 远端响应原样返回，建议列表等由上层直接渲染
        Ok(data)
    }

    /// 会话续聊
    ///
    /// 用户消息在发起网络请求之前落库；请求失败时用户消息保留，
    /// 对话中留下一条未应答的用户轮次，由上层提示重试。
    pub async fn continue_conversation(
        &mut self,
        conversation_id: &str,
        content: &str,
    ) -> ChatResult<ChatTurn> {
        let user_msg = LocalChatMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            is_user: true,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.store.append_message(&user_msg).await?;

        let turn = self.api.continue_chat(conversation_id, content).await?;

        let reply = LocalChatMessage {
            conversation_id: conversation_id.to_string(),
            content: turn.assistant_response.clone(),
            is_user: false,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.store.append_message(&reply).await?;

        debug!("[Syncer] 会话 {} 新增一轮对话", conversation_id);
        Ok(turn)
    }

    /// 进入聊天时的恢复决策
    ///
    /// 先完成用户引导，再查历史会话：没有则提示首次分析，
    /// 有则给出最近更新的至多三个候选。
    pub async fn entry_state(&mut self, profile: &UserProfile) -> ChatResult<EntryState> {
        let session = self.bootstrap(profile).await?;

        let mut conversations = self.store.conversations_for_user(&session.user_id).await?;
        if conversations.is_empty() {
            info!("[Syncer] 无历史会话，进入首次分析引导");
            return Ok(EntryState::FirstAnalysis);
        }

        info!(
            "[Syncer] 发现 {} 个历史会话，展示最近 {} 个",
            conversations.len(),
            RESUME_CANDIDATES.min(conversations.len())
        );
        conversations.truncate(RESUME_CANDIDATES);
        Ok(EntryState::Resumable(conversations))
    }

    /// 恢复指定会话：加载消息与分析结论，并设为活跃会话
    pub async fn resume(&mut self, conversation_id: &str) -> ChatResult<ResumedConversation> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ChatError::Validation("尚未完成用户引导".to_string()))?;

        let conversation = self
            .store
            .conversation_by_id(conversation_id)
            .await?
            .ok_or_else(|| {
                ChatError::Validation(format!("会话不存在: {}", conversation_id))
            })?;
        let messages = self.store.messages_for_conversation(conversation_id).await?;

        session.active_conversation_id = Some(conversation_id.to_string());
        info!(
            "[Syncer] ▶️ 恢复会话 {}，历史消息 {} 条",
            conversation_id,
            messages.len()
        );

        Ok(ResumedConversation {
            conversation,
            messages,
        })
    }

    /// 开启新会话：仅清除活跃会话引用，历史会话保留
    ///
    /// 下一次提交分析会拿到新的 conversation_id，与旧会话并存。
    pub fn start_new(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.active_conversation_id = None;
        }
        info!("[Syncer] 已切换到新会话模式");
    }

    /// 本地重置：清空三张表并丢弃内存中的会话上下文
    ///
    /// 不调用远端接口，远端身份与数据原样保留。
    pub async fn reset(&mut self) -> ChatResult<()> {
        self.store.clear_all().await?;
        self.session = None;
        info!("[Syncer] 🗑️ 本地聊天数据已重置");
        Ok(())
    }
}
