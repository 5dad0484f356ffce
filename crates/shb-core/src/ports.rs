use async_trait::async_trait;

use crate::{
    actions::InlineKeyboard,
    domain::{
        ChatId, Device, DeviceId, DeviceUpdate, NewDevice, NewUser, User, UserId, UserUpdate,
    },
    Result,
};

/// Hexagonal port for device persistence.
///
/// Owns device identity and content; knows nothing about ownership. Every write
/// is a single-row operation that is either committed or rolled back, so a
/// failed call never leaves a partial row behind. Missing rows surface as
/// [`crate::Error::NotFound`].
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn create_device(&self, new: NewDevice) -> Result<Device>;
    async fn get_device(&self, device_id: DeviceId) -> Result<Device>;
    async fn list_devices(&self) -> Result<Vec<Device>>;
    async fn update_device(&self, device_id: DeviceId, update: DeviceUpdate) -> Result<Device>;
    /// Returns the row as it was just before deletion.
    async fn delete_device(&self, device_id: DeviceId) -> Result<Device>;
}

/// Hexagonal port for user persistence.
///
/// Owns the membership list and `device_counter` but never interprets them:
/// `update_user` writes exactly the supplied fields.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`crate::Error::Conflict`] if `user_id` is already registered.
    async fn create_user(&self, new: NewUser) -> Result<User>;
    async fn get_user(&self, user_id: UserId) -> Result<User>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> Result<User>;
    async fn delete_user(&self, user_id: UserId) -> Result<User>;
}

/// Outgoing side of the chat bot. Telegram implements it; tests record it.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
