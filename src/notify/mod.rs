// 通知模块
// 设备目录、推送网关客户端、批量扇出和在线监控

pub mod devices;
pub mod fanout;
pub mod gateway;
pub mod monitor;

use std::any::Any;

pub use devices::DeviceDirectory;
pub use fanout::PushService;
pub use gateway::{GorushClient, PushGateway};
pub use monitor::{OnlineBroadcaster, OnlineMonitor};

/// 从 catch_unwind 的返回值里提取可读的 panic 信息
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
