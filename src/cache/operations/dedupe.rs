use std::fmt;
use std::sync::Arc;

use crate::cache::keys::notification_keys;
use crate::cache::store::AppCache;

/// 通知类型，决定去重标记的 TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ContactMatched,
    ContactOnline,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ContactMatched => "contact_matched",
            NotificationKind::ContactOnline => "contact_online",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知去重：存活的标记键意味着"窗口内已发过，抑制"。
///
/// 检查和写入不是原子操作，并发竞争下两个调用者可能都看到
/// "不存在"并各发一次；这是接受的失败模式（至多几条重复通知），
/// 不是分布式锁。
pub struct NotificationDedupe {
    store: Arc<dyn AppCache>,
    /// contact_matched 标记的 TTL（秒）
    contact_matched_expire_secs: u64,
    /// contact_online 标记的 TTL（秒）
    contact_online_expire_secs: u64,
}

impl NotificationDedupe {
    pub fn new(
        store: Arc<dyn AppCache>,
        contact_matched_expire_secs: u64,
        contact_online_expire_secs: u64,
    ) -> Self {
        Self {
            store,
            contact_matched_expire_secs,
            contact_online_expire_secs,
        }
    }

    /// 窗口内对同一（接收者、目标、类型）只放行一次：
    /// 标记存在返回 false；否则写入标记并返回 true。
    /// 缓存故障时放行（fail-open），宁可重复也不丢通知。
    pub async fn should_send(
        &self,
        recipient_id: i64,
        target_id: i64,
        kind: NotificationKind,
    ) -> bool {
        let key = notification_keys::notification_key(recipient_id, target_id, kind.as_str());

        match self.store.exists(&key).await {
            Ok(true) => {
                tracing::debug!("skipping notification {} - sent recently", key);
                return false;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("dedupe check failed for {}: {}", key, e);
                return true;
            }
        }

        let ttl = self.ttl_for(kind);
        if let Err(e) = self.store.set(&key, "1", ttl).await {
            tracing::warn!("failed to set dedupe marker {}: {}", key, e);
        }
        true
    }

    fn ttl_for(&self, kind: NotificationKind) -> u64 {
        match kind {
            NotificationKind::ContactMatched => self.contact_matched_expire_secs,
            NotificationKind::ContactOnline => self.contact_online_expire_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::memory::{MemoryAppCache, UnavailableAppCache};

    #[tokio::test]
    async fn test_second_send_suppressed_within_window() {
        let store = Arc::new(MemoryAppCache::new());
        let dedupe = NotificationDedupe::new(store, 60, 60);

        assert!(dedupe.should_send(1, 2, NotificationKind::ContactMatched).await);
        assert!(!dedupe.should_send(1, 2, NotificationKind::ContactMatched).await);
        // 不同的目标或类型互不影响
        assert!(dedupe.should_send(1, 3, NotificationKind::ContactMatched).await);
        assert!(dedupe.should_send(1, 2, NotificationKind::ContactOnline).await);
    }

    #[tokio::test]
    async fn test_allowed_again_after_ttl_expiry() {
        let store = Arc::new(MemoryAppCache::new());
        let dedupe = NotificationDedupe::new(store, 1, 1);

        assert!(dedupe.should_send(5, 6, NotificationKind::ContactOnline).await);
        assert!(!dedupe.should_send(5, 6, NotificationKind::ContactOnline).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(dedupe.should_send(5, 6, NotificationKind::ContactOnline).await);
    }

    #[tokio::test]
    async fn test_fail_open_when_store_unavailable() {
        let dedupe = NotificationDedupe::new(Arc::new(UnavailableAppCache), 60, 60);
        assert!(dedupe.should_send(1, 2, NotificationKind::ContactMatched).await);
        assert!(dedupe.should_send(1, 2, NotificationKind::ContactMatched).await);
    }
}
