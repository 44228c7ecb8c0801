// 数据库模块
// 只读取主应用维护的设备令牌表；设备的注册和注销不在本服务内

pub mod models;
pub mod repositories;

pub use models::device::UserDevice;
pub use repositories::device::{DeviceSource, PgDeviceSource};
