//! 健康聊天模块
//!
//! 本地会话缓存与远端 AI 分析服务的同步核心。

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod syncer;
pub mod types;

// 重新导出主要类型和函数
pub use api::{HealthAiApi, HttpHealthAiApi};
pub use error::{ChatError, ChatResult};
pub use models::{LocalChatMessage, LocalChatUser, LocalConversation};
pub use store::ChatStore;
pub use syncer::{
    ChatSession, ChatSyncer, ChatSyncerConfig, EntryState, ResumedConversation, UserProfile,
};
pub use types::{AnalysisData, AnalysisReport, ChatTurn, LabField, LabReport, Recommendation};
