use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::database::models::device::UserDevice;
use crate::database::repositories::device::DeviceSource;

/// 内存中的设备快照，整体构建后原子换入
#[derive(Default)]
struct DeviceSnapshot {
    devices_by_user: HashMap<i64, Vec<UserDevice>>,
    /// 有设备的用户ID，升序排列，供批次分页使用
    user_ids: Vec<i64>,
    refreshed_at: Option<Instant>,
}

impl DeviceSnapshot {
    fn is_stale(&self, expiry: Duration) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() > expiry,
            None => true,
        }
    }
}

/// 设备目录：周期性整体刷新的 (用户 -> 活跃设备令牌) 映射，
/// 把数据库读摊到很多次扇出循环上。
///
/// 快照只由刷新流程替换：在旁边构建新的映射和列表，然后一次
/// 换入，读者不会看到构建了一半的结构。刷新失败时降级为对
/// 后备存储的直接查询，而不是无限期用陈旧数据。
pub struct DeviceDirectory {
    source: Arc<dyn DeviceSource>,
    cache_expiry: Duration,
    snapshot: RwLock<DeviceSnapshot>,
}

impl DeviceDirectory {
    pub fn new(source: Arc<dyn DeviceSource>, cache_expiry: Duration) -> Self {
        Self {
            source,
            cache_expiry,
            snapshot: RwLock::new(DeviceSnapshot::default()),
        }
    }

    /// 一页有设备的用户ID。offset 超界时返回空列表而非错误。
    pub async fn users_page(&self, offset: usize, limit: usize) -> Result<Vec<i64>, sqlx::Error> {
        if self.ensure_fresh().await.is_err() {
            // 刷新失败，直接去后备存储取去重用户列表
            let user_ids = self.source.active_user_ids().await?;
            return Ok(page_of(&user_ids, offset, limit));
        }

        let snapshot = self.snapshot.read().await;
        Ok(page_of(&snapshot.user_ids, offset, limit))
    }

    /// 单个用户的活跃设备。快照里没有该用户即视为没有设备。
    pub async fn devices_for(&self, user_id: i64) -> Result<Vec<UserDevice>, sqlx::Error> {
        if self.ensure_fresh().await.is_err() {
            return self.source.active_devices_for(user_id).await;
        }

        let snapshot = self.snapshot.read().await;
        Ok(snapshot
            .devices_by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    /// 快照过期则整体重建。构建在锁外进行，仅换入时短暂持写锁。
    async fn ensure_fresh(&self) -> Result<(), sqlx::Error> {
        {
            let snapshot = self.snapshot.read().await;
            if !snapshot.is_stale(self.cache_expiry) {
                return Ok(());
            }
        }

        tracing::debug!("refreshing device directory...");
        let devices = match self.source.load_active_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!("failed to refresh device directory: {}", e);
                return Err(e);
            }
        };

        let mut devices_by_user: HashMap<i64, Vec<UserDevice>> = HashMap::new();
        for device in devices {
            devices_by_user.entry(device.user_id).or_default().push(device);
        }
        let mut user_ids: Vec<i64> = devices_by_user.keys().copied().collect();
        user_ids.sort_unstable();

        let total_devices: usize = devices_by_user.values().map(Vec::len).sum();
        tracing::debug!(
            "device directory refreshed with {} users having {} total devices",
            user_ids.len(),
            total_devices
        );

        let mut snapshot = self.snapshot.write().await;
        *snapshot = DeviceSnapshot {
            devices_by_user,
            user_ids,
            refreshed_at: Some(Instant::now()),
        };
        Ok(())
    }
}

fn page_of(user_ids: &[i64], offset: usize, limit: usize) -> Vec<i64> {
    if offset >= user_ids.len() {
        return Vec::new();
    }
    let end = (offset + limit).min(user_ids.len());
    user_ids[offset..end].to_vec()
}
