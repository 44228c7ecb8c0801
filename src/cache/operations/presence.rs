use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;

use crate::cache::keys::presence_keys;
use crate::cache::models::presence::{CachedLocation, OnlineUsersPage};
use crate::cache::store::{AppCache, CacheError};

/// 每次 SCAN 的数量提示
const SCAN_COUNT_HINT: usize = 100;

/// 在线状态操作：TTL 刷新与游标枚举。
/// 在线的唯一判据是未过期的在线键存在；没有显式的"下线"事件。
pub struct PresenceOperations {
    store: Arc<dyn AppCache>,
    /// 在线键的过期时间（秒）
    presence_expire_secs: u64,
    scan_count: usize,
}

impl PresenceOperations {
    pub fn new(store: Arc<dyn AppCache>, presence_expire_secs: u64) -> Self {
        Self {
            store,
            presence_expire_secs,
            scan_count: SCAN_COUNT_HINT,
        }
    }

    /// 刷新用户的在线 TTL，每个已认证请求都调用
    pub async fn set_presence(&self, user_id: i64) -> Result<(), CacheError> {
        self.store
            .set(
                &presence_keys::online_user_key(user_id),
                "",
                self.presence_expire_secs,
            )
            .await
    }

    pub async fn is_online(&self, user_id: i64) -> Result<bool, CacheError> {
        self.store
            .exists(&presence_keys::online_user_key(user_id))
            .await
    }

    /// 游标分页枚举在线用户并批量带出缓存位置。
    ///
    /// 返回的是存储提供的续传游标而非按 limit 计算的偏移，
    /// 因此枚举期间的并发上线/过期不会造成重复。达到 limit 时
    /// 仍会吃完当前扫描页，避免丢掉游标已越过的键。
    /// 位置缺失的用户不出现在 locations 里，不算错误。
    pub async fn list_online_users(
        &self,
        cursor: u64,
        limit: usize,
    ) -> Result<OnlineUsersPage, CacheError> {
        let pattern = presence_keys::online_user_pattern();
        let mut user_ids: Vec<i64> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();
        let mut cursor = cursor;
        let next_cursor = loop {
            let (keys, next) = self.store.scan(cursor, &pattern, self.scan_count).await?;
            for key in keys {
                if let Some(user_id) = presence_keys::parse_online_user_key(&key) {
                    if seen.insert(user_id) {
                        user_ids.push(user_id);
                    }
                }
            }
            if next == 0 || user_ids.len() >= limit {
                break next;
            }
            cursor = next;
        };

        let locations = self.fetch_locations(&user_ids).await;

        Ok(OnlineUsersPage {
            user_ids,
            locations,
            next_cursor,
        })
    }

    /// 扫描整个键空间统计在线人数，仅用于展示；
    /// 与任何一页枚举结果之间不保证线性一致
    pub async fn online_users_count(&self) -> Result<i64, CacheError> {
        let pattern = presence_keys::online_user_pattern();
        let mut total: i64 = 0;
        let mut cursor = 0;
        loop {
            let (keys, next) = self.store.scan(cursor, &pattern, self.scan_count).await?;
            total += keys.len() as i64;
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(total)
    }

    /// 随机取一个在线用户的缓存位置，用于合成广播文案。
    /// 只看第一页扫描结果；选中的用户没有位置时返回 None。
    pub async fn sample_online_location(&self) -> Option<CachedLocation> {
        let pattern = presence_keys::online_user_pattern();
        let (keys, _) = match self.store.scan(0, &pattern, self.scan_count).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("failed to scan online users for location sample: {}", e);
                return None;
            }
        };
        let user_ids: Vec<i64> = keys
            .iter()
            .filter_map(|key| presence_keys::parse_online_user_key(key))
            .collect();
        if user_ids.is_empty() {
            return None;
        }

        let picked = {
            let mut rng = rand::thread_rng();
            user_ids[rng.gen_range(0..user_ids.len())]
        };
        let raw = self
            .store
            .get(&presence_keys::user_location_key(picked))
            .await
            .ok()
            .flatten()?;
        CachedLocation::parse(&raw)
    }

    /// 批量取位置；取不到时降级为空映射，枚举本身不因此失败
    async fn fetch_locations(
        &self,
        user_ids: &[i64],
    ) -> std::collections::HashMap<i64, String> {
        let mut locations = std::collections::HashMap::new();
        if user_ids.is_empty() {
            return locations;
        }
        let keys: Vec<String> = user_ids
            .iter()
            .map(|user_id| presence_keys::user_location_key(*user_id))
            .collect();
        match self.store.mget(&keys).await {
            Ok(values) => {
                for (user_id, value) in user_ids.iter().zip(values) {
                    if let Some(value) = value {
                        if !value.is_empty() {
                            locations.insert(*user_id, value);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("failed to batch fetch user locations: {}", e);
            }
        }
        locations
    }
}
