pub mod notification_keys;
pub mod presence_keys;
