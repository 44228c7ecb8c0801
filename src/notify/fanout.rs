use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use crate::cache::operations::dedupe::{NotificationDedupe, NotificationKind};
use crate::cache::operations::presence::PresenceOperations;
use crate::notify::devices::DeviceDirectory;
use crate::notify::gateway::{PLATFORM_ANDROID, PLATFORM_IOS, PushGateway, PushNotification};
use crate::notify::monitor::OnlineBroadcaster;
use crate::notify::panic_message;

/// 推送扇出服务。
///
/// 广播按固定批次遍历设备目录，同一批内的令牌按平台聚合后
/// 一次交给网关，批与批之间留一段延迟作为回压。触发方（监控
/// 的 tick 或任意 HTTP handler）从不等待扇出完成。
#[derive(Clone)]
pub struct PushService {
    devices: Arc<DeviceDirectory>,
    gateway: Arc<dyn PushGateway>,
    presence: Arc<PresenceOperations>,
    dedupe: Arc<NotificationDedupe>,
    /// 每批用户数
    batch_size: usize,
    /// 批次间延迟
    batch_delay: Duration,
}

impl PushService {
    pub fn new(
        devices: Arc<DeviceDirectory>,
        gateway: Arc<dyn PushGateway>,
        presence: Arc<PresenceOperations>,
        dedupe: Arc<NotificationDedupe>,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            devices,
            gateway,
            presence,
            dedupe,
            batch_size,
            batch_delay,
        }
    }

    /// 匿名的"有人上线了"广播
    pub fn broadcast_someone_online(&self) {
        self.broadcast_user_online(0, "Someone");
    }

    /// 广播某个用户上线。user_id 为 0 表示匿名广播；
    /// 指定用户时该用户自己不收通知。
    /// 在独立任务中异步执行，调用方立即返回；任务内的 panic
    /// 在边界处捕获，不会波及监控循环。
    pub fn broadcast_user_online(&self, user_id: i64, username: &str) {
        if user_id == 0 {
            tracing::info!("sending generic online notification to all users");
        } else {
            tracing::info!(
                "sending online notification for user {} (id: {}) to all users",
                username,
                user_id
            );
        }

        let service = self.clone();
        let username = username.to_string();
        tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(service.run_online_broadcast(user_id, &username))
                .catch_unwind()
                .await
            {
                tracing::error!(
                    "panic in online broadcast task: {}",
                    panic_message(panic.as_ref())
                );
            }
        });
    }

    /// 定向通知：先问去重缓存，窗口内已发过就直接跳过，
    /// 允许发送时才解析设备令牌
    pub async fn send_targeted_notification(
        &self,
        recipient_id: i64,
        target_id: i64,
        kind: NotificationKind,
        message: &str,
        title: &str,
        data: serde_json::Value,
    ) {
        if !self.dedupe.should_send(recipient_id, target_id, kind).await {
            tracing::debug!(
                "skipping {} notification for user {} due to spam prevention",
                kind,
                recipient_id
            );
            return;
        }

        let devices = match self.devices.devices_for(recipient_id).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!("failed to get devices for user {}: {}", recipient_id, e);
                return;
            }
        };

        let (ios_tokens, android_tokens) = split_tokens_by_platform(&devices);
        self.dispatch(ios_tokens, android_tokens, message, title, data)
            .await;
    }

    /// 通讯录匹配成功的通知
    pub async fn send_contact_matched(&self, recipient_id: i64, matched_user_id: i64, matched_username: &str) {
        tracing::info!(
            "sending contact matched notification to user {} for {}",
            recipient_id,
            matched_username
        );
        self.send_targeted_notification(
            recipient_id,
            matched_user_id,
            NotificationKind::ContactMatched,
            &format!("{} is on the app!", matched_username),
            "Contact Found",
            serde_json::json!({
                "type": "contact_matched",
                "username": matched_username,
            }),
        )
        .await;
    }

    /// 扇出主循环：分批翻设备目录，逐批聚合令牌并投递
    async fn run_online_broadcast(&self, subject_id: i64, username: &str) {
        let (message, title, data) = if subject_id == 0 {
            self.compose_live_message().await
        } else {
            (
                format!("{} is now online!", username),
                "User Online".to_string(),
                serde_json::json!({
                    "type": "user_online",
                    "user_id": subject_id,
                    "username": username,
                }),
            )
        };

        let mut offset = 0usize;
        let mut batches_sent = 0usize;
        let mut tokens_sent = 0usize;
        loop {
            let batch = match self.devices.users_page(offset, self.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(
                        "failed to get users batch (offset: {}, limit: {}): {}",
                        offset,
                        self.batch_size,
                        e
                    );
                    return;
                }
            };
            if batch.is_empty() {
                break;
            }

            tracing::debug!("processing batch of {} users (offset: {})", batch.len(), offset);

            let mut ios_tokens = Vec::new();
            let mut android_tokens = Vec::new();
            for user_id in &batch {
                // 指定了上线用户时不给其本人推送
                if subject_id != 0 && *user_id == subject_id {
                    continue;
                }
                match self.devices.devices_for(*user_id).await {
                    Ok(devices) => {
                        let (ios, android) = split_tokens_by_platform(&devices);
                        ios_tokens.extend(ios);
                        android_tokens.extend(android);
                    }
                    Err(e) => {
                        tracing::error!("failed to get devices for user {}: {}", user_id, e);
                    }
                }
            }

            tokens_sent += ios_tokens.len() + android_tokens.len();
            self.dispatch(ios_tokens, android_tokens, &message, &title, data.clone())
                .await;
            batches_sent += 1;

            let batch_len = batch.len();
            offset += self.batch_size;
            if batch_len < self.batch_size {
                break;
            }

            // 批次间小睡一段，避免压垮推送网关
            tokio::time::sleep(self.batch_delay).await;
        }

        tracing::info!(
            "online broadcast finished: {} batches, {} tokens",
            batches_sent,
            tokens_sent
        );
    }

    /// 每个平台一次网关调用；单平台失败只记录，不影响另一个平台
    async fn dispatch(
        &self,
        ios_tokens: Vec<String>,
        android_tokens: Vec<String>,
        message: &str,
        title: &str,
        data: serde_json::Value,
    ) {
        if !ios_tokens.is_empty() {
            let notification =
                PushNotification::new(ios_tokens, PLATFORM_IOS, message, title, data.clone());
            if let Err(e) = self.gateway.push(&notification).await {
                tracing::error!("failed to send ios notification batch: {}", e);
            }
        }
        if !android_tokens.is_empty() {
            let notification =
                PushNotification::new(android_tokens, PLATFORM_ANDROID, message, title, data);
            if let Err(e) = self.gateway.push(&notification).await {
                tracing::error!("failed to send android notification batch: {}", e);
            }
        }
    }

    /// 匿名广播的文案：随机借一个在线用户的缓存位置；
    /// 没有可用位置时退回到不带地名的通用文案
    async fn compose_live_message(&self) -> (String, String, serde_json::Value) {
        let message = match self.presence.sample_online_location().await {
            Some(location) => format!(
                "🔥 People from {} and other places are live! Join the chat!",
                location.display_place()
            ),
            None => "🔥 People from different places are live! Join the chat!".to_string(),
        };
        (
            message,
            "Live Now".to_string(),
            serde_json::json!({
                "type": "user_online",
                "user_id": 0,
            }),
        )
    }
}

impl OnlineBroadcaster for PushService {
    fn broadcast_someone_online(&self) {
        PushService::broadcast_someone_online(self);
    }
}

fn split_tokens_by_platform(
    devices: &[crate::database::models::device::UserDevice],
) -> (Vec<String>, Vec<String>) {
    let mut ios_tokens = Vec::new();
    let mut android_tokens = Vec::new();
    for device in devices {
        if !device.is_active {
            continue;
        }
        if device.is_ios() {
            ios_tokens.push(device.device_token.clone());
        } else if device.is_android() {
            android_tokens.push(device.device_token.clone());
        }
    }
    (ios_tokens, android_tokens)
}
