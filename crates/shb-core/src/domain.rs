use std::fmt;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Telegram user id (numeric). External identity of a `User`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Store-assigned device id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

/// Telegram chat id. Private chats share the number with the user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall-clock time in the naive form the DataBase API stores.
pub fn now_naive() -> NaiveDateTime {
    Local::now().naive_local()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: DeviceId,
    pub title: String,
    pub description: String,
    pub address: String,
    #[serde(default)]
    pub active: bool,
    pub create_time: NaiveDateTime,
}

/// Fields for a device that does not exist yet; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDevice {
    pub title: String,
    pub description: String,
    pub address: String,
    pub create_time: NaiveDateTime,
}

impl NewDevice {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            address: address.into(),
            create_time: now_naive(),
        }
    }
}

/// Partial device update. `None` leaves the field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub active: Option<bool>,
}

impl DeviceUpdate {
    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    pub fn apply(&self, device: &mut Device) {
        if let Some(title) = &self.title {
            device.title = title.clone();
        }
        if let Some(description) = &self.description {
            device.description = description.clone();
        }
        if let Some(address) = &self.address {
            device.address = address.clone();
        }
        if let Some(active) = self.active {
            device.active = active;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal row id.
    pub id: i64,
    pub user_id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag: String,
    /// Membership list: the devices this user owns.
    #[serde(default, deserialize_with = "null_as_default")]
    pub devices: Vec<DeviceId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_counter: i64,
    /// `false` means banned.
    pub active: bool,
    pub create_time: NaiveDateTime,
}

impl User {
    pub fn owns(&self, device_id: DeviceId) -> bool {
        self.devices.contains(&device_id)
    }

    pub fn is_banned(&self) -> bool {
        !self.active
    }

    /// `device_counter` agrees with the membership list.
    pub fn counter_matches(&self) -> bool {
        self.device_counter == self.devices.len() as i64
    }
}

// The `Users` table declares these columns nullable.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub user_id: UserId,
    pub tag: String,
    pub create_time: NaiveDateTime,
}

impl NewUser {
    pub fn new(user_id: UserId, tag: impl Into<String>) -> Self {
        Self {
            user_id,
            tag: tag.into(),
            create_time: now_naive(),
        }
    }
}

/// Partial user update.
///
/// The store replaces exactly the supplied fields and never derives
/// `device_counter` from `devices`; callers supply a consistent pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_counter: Option<i64>,
}

impl UserUpdate {
    /// Membership write with a counter derived from the list.
    pub fn membership(devices: Vec<DeviceId>) -> Self {
        let device_counter = devices.len() as i64;
        Self {
            active: None,
            devices: Some(devices),
            device_counter: Some(device_counter),
        }
    }

    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(active) = self.active {
            user.active = active;
        }
        if let Some(devices) = &self.devices {
            user.devices = devices.clone();
        }
        if let Some(counter) = self.device_counter {
            user.device_counter = counter;
        }
    }
}
