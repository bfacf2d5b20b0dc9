//! 聊天模块公共类型
//!
//! 包含远端 AI 服务的请求/响应结构、化验单稀疏输入模型，
//! 以及通用的 HTTP 响应处理函数。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::chat::error::{ChatError, ChatResult};

/// 化验指标枚举
///
/// 远端分析接口的每一项指标都是独立可选的，用枚举 key + HashMap
/// 表示稀疏输入，序列化后直接平铺进请求 JSON。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabField {
    Glucose,
    Cholesterol,
    LdlCholesterol,
    HdlCholesterol,
    Triglycerides,
    Hemoglobin,
    Hematocrit,
    WhiteBloodCells,
    RedBloodCells,
    Platelets,
    Creatinine,
    Urea,
}

impl LabField {
    /// 指标在请求 JSON 中的字段名
    pub fn as_str(&self) -> &'static str {
        match self {
            LabField::Glucose => "glucose",
            LabField::Cholesterol => "cholesterol",
            LabField::LdlCholesterol => "ldl_cholesterol",
            LabField::HdlCholesterol => "hdl_cholesterol",
            LabField::Triglycerides => "triglycerides",
            LabField::Hemoglobin => "hemoglobin",
            LabField::Hematocrit => "hematocrit",
            LabField::WhiteBloodCells => "white_blood_cells",
            LabField::RedBloodCells => "red_blood_cells",
            LabField::Platelets => "platelets",
            LabField::Creatinine => "creatinine",
            LabField::Urea => "urea",
        }
    }
}

impl fmt::Display for LabField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabField {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glucose" => Ok(LabField::Glucose),
            "cholesterol" => Ok(LabField::Cholesterol),
            "ldl_cholesterol" => Ok(LabField::LdlCholesterol),
            "hdl_cholesterol" => Ok(LabField::HdlCholesterol),
            "triglycerides" => Ok(LabField::Triglycerides),
            "hemoglobin" => Ok(LabField::Hemoglobin),
            "hematocrit" => Ok(LabField::Hematocrit),
            "white_blood_cells" => Ok(LabField::WhiteBloodCells),
            "red_blood_cells" => Ok(LabField::RedBloodCells),
            "platelets" => Ok(LabField::Platelets),
            "creatinine" => Ok(LabField::Creatinine),
            "urea" => Ok(LabField::Urea),
            other => Err(ChatError::Validation(format!("未知的化验指标: {}", other))),
        }
    }
}

/// 一次化验的稀疏输入
///
/// 任意子集的指标 + 采样日期（YYYY-MM-DD）。提交前由同步层校验
/// 至少包含一项指标。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabReport {
    #[serde(flatten)]
    pub values: HashMap<LabField, f64>,
    pub test_date: String,
}

impl LabReport {
    pub fn new(test_date: impl Into<String>) -> Self {
        Self {
            values: HashMap::new(),
            test_date: test_date.into(),
        }
    }

    /// 填入一项指标值
    pub fn insert(&mut self, field: LabField, value: f64) {
        self.values.insert(field, value);
    }

    /// 是否一项指标都没有
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 分析接口的请求体：user_id + 稀疏指标平铺 + test_date
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub values: HashMap<LabField, f64>,
    pub test_date: String,
}

impl AnalyzeRequest {
    pub fn from_report(user_id: impl Into<String>, report: &LabReport) -> Self {
        Self {
            user_id: user_id.into(),
            values: report.values.clone(),
            test_date: report.test_date.clone(),
        }
    }
}

/// 分析结果（服务端 data 字段）
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisData {
    pub ai_explanation: String,
    pub analysis: AnalysisReport,
    #[serde(default)]
    pub blood_test_id: Option<String>,
    pub conversation_id: String,
}

/// 结构化分析报告
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisReport {
    pub overall_risk: String,
    #[serde(default)]
    pub glucose_status: Option<String>,
    #[serde(default)]
    pub cholesterol_status: Option<String>,
    #[serde(default)]
    pub kidney_function_status: Option<String>,
    #[serde(default)]
    pub blood_count_status: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub needs_doctor_consultation: bool,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

/// 单条健康建议
#[derive(Debug, Clone, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

/// 续聊接口返回的一轮对话（服务端 data 字段）
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub user_message: String,
    pub assistant_response: String,
    pub timestamp: String,
}

/// 统一的 API 响应包装结构体（包含 success、message、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：校验 HTTP 状态与业务 success 标志后
/// 反序列化为 `ApiEnvelope<T>`，data 字段由调用方按需取用。
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> ChatResult<ApiEnvelope<T>> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.map_err(ChatError::Network)?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(ChatError::Service {
            status: status.as_u16(),
            message: body_str.into_owned(),
        });
    }

    let envelope: ApiEnvelope<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        ChatError::Service {
            status: status.as_u16(),
            message: format!("响应格式不正确: {}", e),
        }
    })?;

    // 业务层失败：HTTP 成功但 success=false
    if !envelope.success {
        let message = envelope.message.clone().unwrap_or_else(|| "未知错误".to_string());
        error!("[HTTP] {}业务失败: {}", operation_name, message);
        return Err(ChatError::Service {
            status: status.as_u16(),
            message,
        });
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_request_flattens_sparse_values() {
        let mut report = LabReport::new("2025-05-01");
        report.insert(LabField::Glucose, 95.0);
        report.insert(LabField::Urea, 30.5);

        let req = AnalyzeRequest::from_report("user-1", &report);
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();

        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["test_date"], "2025-05-01");
        assert_eq!(json["glucose"], 95.0);
        assert_eq!(json["urea"], 30.5);
        // 未填写的指标不应出现在请求中
        assert!(json.get("cholesterol").is_none());
    }

    #[test]
    fn lab_field_parses_from_wire_name() {
        let field: LabField = "white_blood_cells".parse().unwrap();
        assert_eq!(field, LabField::WhiteBloodCells);
        assert_eq!(field.as_str(), "white_blood_cells");

        assert!("blood_pressure".parse::<LabField>().is_err());
    }

    #[test]
    fn analysis_data_deserializes_service_payload() {
        let body = r#"{
            "ai_explanation": "您的血糖处于正常范围。",
            "analysis": {
                "overall_risk": "low",
                "glucose_status": "normal",
                "recommendations": [
                    {"type": "diet", "title": "均衡饮食", "description": "保持低糖饮食", "priority": 1}
                ],
                "needs_doctor_consultation": false,
                "risk_factors": []
            },
            "blood_test_id": "bt-42",
            "conversation_id": "conv-42"
        }"#;

        let data: AnalysisData = serde_json::from_str(body).unwrap();
        assert_eq!(data.conversation_id, "conv-42");
        assert_eq!(data.analysis.overall_risk, "low");
        assert_eq!(data.analysis.recommendations.len(), 1);
        assert_eq!(data.analysis.recommendations[0].kind, "diet");
        // 服务端省略的状态字段回落为 None
        assert!(data.analysis.cholesterol_status.is_none());
    }
}
