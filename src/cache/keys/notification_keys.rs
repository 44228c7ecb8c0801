/// 通知去重标记键前缀
const NOTIFICATION_PREFIX: &str = "notif:";

/// 生成通知去重标记键，按（接收者、目标、通知类型）唯一
pub fn notification_key(recipient_id: i64, target_id: i64, kind: &str) -> String {
    format!(
        "{}{}:{}:{}",
        NOTIFICATION_PREFIX, recipient_id, target_id, kind
    )
}
