use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gorush 的平台编号
pub const PLATFORM_IOS: i32 = 1;
pub const PLATFORM_ANDROID: i32 = 2;

/// 推送网关的请求载荷
#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    pub tokens: Vec<String>,
    /// 1 = iOS, 2 = Android
    pub platform: i32,
    pub message: String,
    pub title: String,
    pub priority: String,
    pub sound: String,
    pub badge: i32,
    pub data: serde_json::Value,
}

impl PushNotification {
    pub fn new(
        tokens: Vec<String>,
        platform: i32,
        message: impl Into<String>,
        title: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            tokens,
            platform,
            message: message.into(),
            title: title.into(),
            priority: "high".into(),
            sound: "default".into(),
            badge: 1,
            data,
        }
    }
}

/// 推送网关的响应
#[derive(Debug, Clone, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub success: String,
    #[serde(default)]
    pub counts: i64,
    #[serde(default)]
    pub logs: Vec<PushLog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushLog {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push gateway returned status {0}")]
    Status(reqwest::StatusCode),
}

/// 外部推送网关。单次投递失败只影响这一批，不中断后续批次。
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn push(&self, notification: &PushNotification) -> Result<PushResponse, PushError>;

    /// 启动诊断用的健康检查
    async fn health_check(&self) -> Result<(), PushError>;
}

/// Gorush HTTP 客户端
pub struct GorushClient {
    base_url: String,
    http: reqwest::Client,
}

impl GorushClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl PushGateway for GorushClient {
    async fn push(&self, notification: &PushNotification) -> Result<PushResponse, PushError> {
        let url = format!("{}/api/push", self.base_url);
        let response = self.http.post(&url).json(notification).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(PushError::Status(response.status()));
        }

        let push_response: PushResponse = response.json().await?;
        tracing::info!(
            "gorush response: {}, sent to {} devices",
            push_response.success,
            push_response.counts
        );
        Ok(push_response)
    }

    async fn health_check(&self) -> Result<(), PushError> {
        let url = format!("{}/api/stat/go", self.base_url);
        let response = self.http.get(&url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(PushError::Status(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// 记录每次网关调用的测试替身
    #[derive(Debug, Clone)]
    pub struct RecordedPush {
        pub at: Instant,
        pub platform: i32,
        pub tokens: Vec<String>,
        pub message: String,
    }

    #[derive(Default)]
    pub struct MockGateway {
        pub pushes: Mutex<Vec<RecordedPush>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn recorded(&self) -> Vec<RecordedPush> {
            self.pushes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushGateway for MockGateway {
        async fn push(&self, notification: &PushNotification) -> Result<PushResponse, PushError> {
            self.pushes.lock().unwrap().push(RecordedPush {
                at: Instant::now(),
                platform: notification.platform,
                tokens: notification.tokens.clone(),
                message: notification.message.clone(),
            });
            Ok(PushResponse {
                success: "ok".into(),
                counts: notification.tokens.len() as i64,
                logs: Vec::new(),
            })
        }

        async fn health_check(&self) -> Result<(), PushError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_format() {
        let notification = PushNotification::new(
            vec!["tok-1".into(), "tok-2".into()],
            PLATFORM_IOS,
            "hello",
            "Title",
            serde_json::json!({"type": "user_online", "user_id": 0}),
        );

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["tokens"], serde_json::json!(["tok-1", "tok-2"]));
        assert_eq!(value["platform"], 1);
        assert_eq!(value["priority"], "high");
        assert_eq!(value["sound"], "default");
        assert_eq!(value["badge"], 1);
        assert_eq!(value["data"]["type"], "user_online");
    }

    #[test]
    fn test_response_parses_with_missing_fields() {
        let parsed: PushResponse = serde_json::from_str(r#"{"success":"ok","counts":3}"#).unwrap();
        assert_eq!(parsed.success, "ok");
        assert_eq!(parsed.counts, 3);
        assert!(parsed.logs.is_empty());
    }
}
