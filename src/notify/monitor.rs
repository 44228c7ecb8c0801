use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;

use crate::cache::operations::presence::PresenceOperations;
use crate::cache::store::CacheError;
use crate::notify::panic_message;

/// 广播触发入口。只负责触发，立即返回，不等待扇出完成。
pub trait OnlineBroadcaster: Send + Sync {
    fn broadcast_someone_online(&self);
}

/// 在线监控：固定间隔轮询在线集合，决定是否广播"有人在线"。
///
/// 两个状态：空闲和运行中。start() 先跑一次立即检查，然后在
/// 独立后台任务里按间隔轮询；stop() 通过取消通道通知任务退出，
/// 不取消在途的扇出任务。stop() 之后不保证能再次 start()，
/// 这是单次使用的调度器。
pub struct OnlineMonitor {
    presence: Arc<PresenceOperations>,
    broadcaster: Arc<dyn OnlineBroadcaster>,
    check_interval: Duration,
    /// 两次广播之间的最小间隔（秒）
    min_broadcast_interval_secs: i64,
    /// 上次检查的时间戳（Unix 秒），0 表示还没检查过
    last_check_time: AtomicI64,
    stop_tx: watch::Sender<bool>,
}

impl OnlineMonitor {
    pub fn new(
        presence: Arc<PresenceOperations>,
        broadcaster: Arc<dyn OnlineBroadcaster>,
        check_interval: Duration,
        min_broadcast_interval_secs: i64,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            presence,
            broadcaster,
            check_interval,
            min_broadcast_interval_secs,
            last_check_time: AtomicI64::new(0),
            stop_tx,
        }
    }

    /// 启动监控：立即检查一次，然后进入周期轮询
    pub async fn start(self: Arc<Self>) {
        tracing::info!("starting online status monitoring...");

        if let Err(e) = self.check_online_status_changes().await {
            tracing::error!("initial online status check failed: {}", e);
        }

        let monitor = Arc::clone(&self);
        let stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            // 轮询循环内的 panic 在这里收口：记录日志并停表，
            // 监控不再继续跑，但进程不受影响
            if let Err(panic) = AssertUnwindSafe(monitor.run_loop(stop_rx)).catch_unwind().await {
                tracing::error!(
                    "panic in online monitoring task: {}",
                    panic_message(panic.as_ref())
                );
            }
        });

        tracing::info!("online status monitoring started");
    }

    /// 通知后台任务退出。只支持调用一次。
    pub fn stop(&self) {
        tracing::info!("stopping online status monitoring...");
        let _ = self.stop_tx.send(true);
    }

    async fn run_loop(&self, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        // interval 的第一跳立即完成，立即检查已在 start() 里做过
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    tracing::info!("online monitoring stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.check_online_status_changes().await {
                        tracing::error!("online status check failed: {}", e);
                    }
                }
            }
        }
    }

    /// 一次监控检查
    pub async fn check_online_status_changes(&self) -> Result<(), CacheError> {
        self.run_check(chrono::Utc::now().timestamp()).await
    }

    /// 按给定时间戳执行一次检查：枚举在线集合，非空且频控放行
    /// 时触发广播；无论是否广播都更新 last_check_time。
    pub(crate) async fn run_check(&self, now: i64) -> Result<(), CacheError> {
        let online = match self.presence.list_online_users(0, usize::MAX).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!("failed to get online users: {}", e);
                return Err(e);
            }
        };

        tracing::debug!("found {} online users", online.user_ids.len());

        if !online.user_ids.is_empty() && self.should_broadcast(now) {
            tracing::info!("sending online notifications to all users - someone is online");
            self.broadcaster.broadcast_someone_online();
        }

        self.last_check_time.store(now, Ordering::SeqCst);
        Ok(())
    }

    /// 频控：第一次检查从不广播；之后距上次检查不足最小间隔
    /// 也不广播
    fn should_broadcast(&self, now: i64) -> bool {
        let last = self.last_check_time.load(Ordering::SeqCst);
        if last == 0 {
            return false;
        }
        now - last >= self.min_broadcast_interval_secs
    }
}
