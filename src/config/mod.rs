use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub gorush_url: String,
    pub geoip_url: String,
    /// 在线状态键的过期时间（秒）
    pub online_user_expire_secs: u64,
    /// 位置缓存的过期时间（秒），位置变化远比在线状态慢
    pub user_location_expire_secs: u64,
    /// contact_matched 通知的去重窗口（秒）
    pub contact_matched_expire_secs: u64,
    /// contact_online 通知的去重窗口（秒）
    pub contact_online_expire_secs: u64,
    /// 在线监控的轮询间隔，同时作为最小广播间隔（秒）
    pub monitor_check_interval_secs: u64,
    /// 设备目录整体刷新的过期窗口（秒）
    pub device_cache_expire_secs: u64,
    /// 每批推送的用户数上限
    pub push_batch_size: usize,
    /// 批次之间的延迟（毫秒），避免压垮推送网关
    pub push_batch_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/v1".into()),
            gorush_url: env::var("GORUSH_URL").unwrap_or_else(|_| "http://gorush:8088".into()),
            geoip_url: env::var("GEOIP_URL").unwrap_or_else(|_| "http://ip-api.com/json".into()),
            online_user_expire_secs: env_u64("ONLINE_USER_EXPIRE", 300),
            user_location_expire_secs: env_u64("USER_LOCATION_EXPIRE", 24 * 60 * 60),
            contact_matched_expire_secs: env_u64("CONTACT_MATCHED_EXPIRE", 3600),
            contact_online_expire_secs: env_u64("CONTACT_ONLINE_EXPIRE", 1800),
            monitor_check_interval_secs: env_u64("MONITOR_CHECK_INTERVAL", 30),
            device_cache_expire_secs: env_u64("DEVICE_CACHE_EXPIRE", 300),
            push_batch_size: env_u64("PUSH_BATCH_SIZE", 1000) as usize,
            push_batch_delay_ms: env_u64("PUSH_BATCH_DELAY_MS", 100),
        })
    }

    pub fn monitor_check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_check_interval_secs)
    }

    pub fn device_cache_expiry(&self) -> Duration {
        Duration::from_secs(self.device_cache_expire_secs)
    }

    pub fn push_batch_delay(&self) -> Duration {
        Duration::from_millis(self.push_batch_delay_ms)
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
