//! 远端 AI 服务 HTTP 客户端
//!
//! 三个接口的类型化封装：创建用户、化验分析、会话续聊。
//! 本层无本地状态、不做重试，失败原样抛给同步层。

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::types::{handle_http_response, AnalysisData, AnalyzeRequest, ChatTurn};

/// 远端 AI 服务接口
///
/// 同步层只依赖此 trait，便于测试时替换为内存实现。
#[async_trait]
pub trait HealthAiApi: Send + Sync {
    /// 创建远端用户，返回服务端分配的 user_id
    async fn create_user(&self, name: &str, age: i64, gender: &str) -> ChatResult<String>;

    /// 提交化验分析，返回解读与新会话 ID
    async fn analyze(&self, req: &AnalyzeRequest) -> ChatResult<AnalysisData>;

    /// 在既有会话中追问一句
    async fn continue_chat(&self, conversation_id: &str, content: &str) -> ChatResult<ChatTurn>;
}

/// 基于 reqwest 的默认实现
pub struct HttpHealthAiApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpHealthAiApi {
    /// 创建客户端（30 秒超时，与服务端约定一致）
    pub fn new(api_base_url: impl Into<String>) -> ChatResult<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ChatError::Network)?;
        Ok(Self::with_client(client, api_base_url))
    }

    /// 使用外部配置好的 HTTP 客户端（如已挂认证头）
    pub fn with_client(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
        }
    }
}

#[async_trait]
impl HealthAiApi for HttpHealthAiApi {
    async fn create_user(&self, name: &str, age: i64, gender: &str) -> ChatResult<String> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/users", self.api_base_url);

        info!("[ChatAPI] 📡 请求创建远端用户");
        debug!("[ChatAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("X-Request-ID", &request_id)
            .json(&serde_json::json!({
                "name": name,
                "age": age,
                "gender": gender,
            }))
            .send()
            .await
            .map_err(ChatError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(ChatError::Network)?;
        if !status.is_success() {
            return Err(ChatError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ChatError::Service {
                status: status.as_u16(),
                message: format!("响应格式不正确: {}", e),
            }
        })?;
        if json.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let message = json
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("未知错误")
                .to_string();
            return Err(ChatError::Service {
                status: status.as_u16(),
                message,
            });
        }

        // 服务端历史上有两种返回：data.id 或顶层 id，这里都兼容
        let user_id = json
            .pointer("/data/id")
            .or_else(|| json.get("id"))
            .and_then(value_to_id)
            .ok_or_else(|| ChatError::Service {
                status: status.as_u16(),
                message: "响应中缺少用户 ID".to_string(),
            })?;

        info!("[ChatAPI] ✅ 远端用户已创建: {}", user_id);
        Ok(user_id)
    }

    async fn analyze(&self, req: &AnalyzeRequest) -> ChatResult<AnalysisData> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/chat/analyze", self.api_base_url);

        info!(
            "[ChatAPI] 📡 提交化验分析，指标数: {}, 采样日期: {}",
            req.values.len(),
            req.test_date
        );
        debug!("[ChatAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("X-Request-ID", &request_id)
            .json(req)
            .send()
            .await
            .map_err(ChatError::Network)?;

        let status = response.status().as_u16();
        let envelope = handle_http_response::<AnalysisData>(response, "化验分析").await?;
        let data = envelope.data.ok_or_else(|| ChatError::Service {
            status,
            message: "响应中缺少 data 字段".to_string(),
        })?;

        info!(
            "[ChatAPI] ✅ 分析完成，会话: {}, 总体风险: {}",
            data.conversation_id, data.analysis.overall_risk
        );
        Ok(data)
    }

    async fn continue_chat(&self, conversation_id: &str, content: &str) -> ChatResult<ChatTurn> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/chat/{}/message", self.api_base_url, conversation_id);

        info!("[ChatAPI] 📡 会话续聊: {}", conversation_id);
        debug!("[ChatAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("X-Request-ID", &request_id)
            .json(&serde_json::json!({ "message": content }))
            .send()
            .await
            .map_err(ChatError::Network)?;

        let status = response.status().as_u16();
        let envelope = handle_http_response::<ChatTurn>(response, "会话续聊").await?;
        let turn = envelope.data.ok_or_else(|| ChatError::Service {
            status,
            message: "响应中缺少 data 字段".to_string(),
        })?;

        debug!("[ChatAPI] ✅ 收到助手回复，长度: {}", turn.assistant_response.len());
        Ok(turn)
    }
}

/// 用户 ID 可能是字符串或数字
fn value_to_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
