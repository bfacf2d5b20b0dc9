//! 聊天模块统一错误类型
//!
//! 本地存储、远端 AI 服务与同步层共用一套错误分类，
//! 上层（UI 控制器）据此决定提示文案与是否允许用户重试。

use thiserror::Error;

/// 聊天模块统一 Result 别名
pub type ChatResult<T> = Result<T, ChatError>;

/// 聊天模块错误分类
#[derive(Debug, Error)]
pub enum ChatError {
    /// 本地数据库在 `init()` 之前被使用
    #[error("本地数据库尚未初始化")]
    NotInitialized,

    /// 写入数据缺少必填字段，或引用了不存在的记录
    #[error("数据校验失败: {0}")]
    Validation(String),

    /// 网络层失败（超时、无法连接等），请求未得到服务端应答
    #[error("网络请求失败: {0}")]
    Network(#[source] reqwest::Error),

    /// 服务端可达但拒绝了请求（非 2xx 或业务 success=false）
    #[error("服务端错误 {status}: {message}")]
    Service { status: u16, message: String },

    /// 本地 SQLite 读写失败
    #[error("本地存储错误: {0}")]
    Storage(#[from] sqlx::Error),
}
