//! 本地数据模型定义
//!
//! 对应 SQLite 中的三张表：用户、会话、消息。
//! 所有时间戳均为 RFC 3339 文本，按字典序比较即按时间比较。

use serde::{Deserialize, Serialize};

/// 本地用户（远端 AI 服务分配的身份）
///
/// 设备上逻辑上只有一个"当前用户"；若历史上残留多行，
/// 以 created_at 最新的一行为准。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalChatUser {
    /// 远端分配的用户 ID
    pub user_id: String,
    pub name: String,
    pub age: i64,
    pub gender: String,
    /// 本地创建时间（RFC 3339）
    pub created_at: String,
}

/// 本地会话：一次化验分析及其后续追问
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConversation {
    /// 远端分配的会话 ID，全局唯一
    pub conversation_id: String,
    /// 所属用户 ID（逻辑外键，不在库层强制）
    pub user_id: String,
    /// 远端返回的化验单 ID
    pub blood_test_id: Option<String>,
    /// 产生本会话的分析请求快照（JSON 文本）
    pub analysis_snapshot: Option<String>,
    /// AI 解读文本
    pub ai_explanation: Option<String>,
    /// 总体风险等级
    pub overall_risk: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 本地消息：会话中的一轮（用户或助手）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalChatMessage {
    pub conversation_id: String,
    pub content: String,
    /// true = 用户发出，false = 助手回复
    pub is_user: bool,
    /// 发送时间（RFC 3339），会话内按此字段升序即为对话顺序
    pub timestamp: String,
}
