use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 推送设备平台取值
pub const PLATFORM_IOS: &str = "ios";
pub const PLATFORM_ANDROID: &str = "android";

/// 用户的推送设备记录
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserDevice {
    pub id: i64,
    pub user_id: i64,
    pub device_token: String,
    /// "ios" 或 "android"
    pub platform: String,
    pub device_id: String,
    pub device_name: String,
    pub is_active: bool,
}

impl UserDevice {
    pub fn is_ios(&self) -> bool {
        self.platform == PLATFORM_IOS
    }

    pub fn is_android(&self) -> bool {
        self.platform == PLATFORM_ANDROID
    }
}
