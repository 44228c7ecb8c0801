use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::device::UserDevice;

/// 设备行的来源。设备目录整体刷新走全表查询，
/// 刷新失败时降级到这里的单项查询。
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// 全量加载活跃且未删除的设备行
    async fn load_active_devices(&self) -> Result<Vec<UserDevice>, sqlx::Error>;

    /// 有活跃设备的去重用户ID列表
    async fn active_user_ids(&self) -> Result<Vec<i64>, sqlx::Error>;

    /// 单个用户的活跃设备
    async fn active_devices_for(&self, user_id: i64) -> Result<Vec<UserDevice>, sqlx::Error>;
}

/// Postgres 设备存储库
pub struct PgDeviceSource {
    pool: PgPool,
}

impl PgDeviceSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceSource for PgDeviceSource {
    async fn load_active_devices(&self) -> Result<Vec<UserDevice>, sqlx::Error> {
        sqlx::query_as::<_, UserDevice>(
            r#"
            SELECT id, user_id, device_token, platform, device_id, device_name, is_active
            FROM p_user_device_tokens
            WHERE is_active = true AND is_del = 0
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn active_user_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_id
            FROM p_user_device_tokens
            WHERE is_active = true AND is_del = 0
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    async fn active_devices_for(&self, user_id: i64) -> Result<Vec<UserDevice>, sqlx::Error> {
        sqlx::query_as::<_, UserDevice>(
            r#"
            SELECT id, user_id, device_token, platform, device_id, device_name, is_active
            FROM p_user_device_tokens
            WHERE user_id = $1 AND is_active = true AND is_del = 0
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// 内存设备源，可按需让全量加载失败以测试降级路径
    #[derive(Default)]
    pub struct MemoryDeviceSource {
        devices: Mutex<Vec<UserDevice>>,
        fail_bulk_load: AtomicBool,
    }

    impl MemoryDeviceSource {
        pub fn new(devices: Vec<UserDevice>) -> Self {
            Self {
                devices: Mutex::new(devices),
                fail_bulk_load: AtomicBool::new(false),
            }
        }

        pub fn set_devices(&self, devices: Vec<UserDevice>) {
            *self.devices.lock().unwrap() = devices;
        }

        pub fn set_fail_bulk_load(&self, fail: bool) {
            self.fail_bulk_load.store(fail, Ordering::SeqCst);
        }

        pub fn device(id: i64, user_id: i64, platform: &str, token: &str) -> UserDevice {
            UserDevice {
                id,
                user_id,
                device_token: token.to_string(),
                platform: platform.to_string(),
                device_id: format!("device-{}", id),
                device_name: format!("Device {}", id),
                is_active: true,
            }
        }
    }

    #[async_trait]
    impl DeviceSource for MemoryDeviceSource {
        async fn load_active_devices(&self) -> Result<Vec<UserDevice>, sqlx::Error> {
            if self.fail_bulk_load.load(Ordering::SeqCst) {
                return Err(sqlx::Error::PoolClosed);
            }
            Ok(self.devices.lock().unwrap().clone())
        }

        async fn active_user_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
            let mut ids: Vec<i64> = self
                .devices
                .lock()
                .unwrap()
                .iter()
                .map(|device| device.user_id)
                .collect();
            ids.sort_unstable();
            ids.dedup();
            Ok(ids)
        }

        async fn active_devices_for(&self, user_id: i64) -> Result<Vec<UserDevice>, sqlx::Error> {
            Ok(self
                .devices
                .lock()
                .unwrap()
                .iter()
                .filter(|device| device.user_id == user_id)
                .cloned()
                .collect())
        }
    }
}
