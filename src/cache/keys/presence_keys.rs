/// 在线状态键前缀
const ONLINE_USER_PREFIX: &str = "presence:online:";

/// 用户位置键前缀
const USER_LOCATION_PREFIX: &str = "presence:location:";

/// 生成在线状态键
pub fn online_user_key(user_id: i64) -> String {
    format!("{}{}", ONLINE_USER_PREFIX, user_id)
}

/// 生成匹配所有在线状态键的扫描模式
pub fn online_user_pattern() -> String {
    format!("{}*", ONLINE_USER_PREFIX)
}

/// 从在线状态键中解析用户ID，格式不符时返回 None
pub fn parse_online_user_key(key: &str) -> Option<i64> {
    key.strip_prefix(ONLINE_USER_PREFIX)?.parse().ok()
}

/// 生成用户位置键
pub fn user_location_key(user_id: i64) -> String {
    format!("{}{}", USER_LOCATION_PREFIX, user_id)
}
