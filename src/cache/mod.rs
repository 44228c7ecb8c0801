// 缓存模块
// 包含键生成、缓存数据结构和操作逻辑

pub mod keys;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

// 重新导出常用类型和函数，方便其他模块使用
pub use models::presence::{CachedLocation, OnlineUsersPage};
pub use store::{AppCache, CacheError, RedisAppCache};
