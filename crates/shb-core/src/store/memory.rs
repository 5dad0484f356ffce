//! In-process stores. Used by `STORE_BACKEND=memory` and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    domain::{Device, DeviceId, DeviceUpdate, NewDevice, NewUser, User, UserId, UserUpdate},
    errors::Error,
    ports::{DeviceStore, UserStore},
    Result,
};

#[derive(Debug, Default)]
struct DeviceTable {
    last_id: i64,
    rows: BTreeMap<DeviceId, Device>,
}

/// Autoincrementing device table. Ids are never reused.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    table: Mutex<DeviceTable>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn create_device(&self, new: NewDevice) -> Result<Device> {
        let mut table = self.table.lock().await;
        table.last_id += 1;
        let device = Device {
            device_id: DeviceId(table.last_id),
            title: new.title,
            description: new.description,
            address: new.address,
            active: false,
            create_time: new.create_time,
        };
        table.rows.insert(device.device_id, device.clone());
        info!(device_id = device.device_id.0, "device created");
        Ok(device)
    }

    async fn get_device(&self, device_id: DeviceId) -> Result<Device> {
        let table = self.table.lock().await;
        debug!(device_id = device_id.0, "device lookup");
        table
            .rows
            .get(&device_id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(device_id))
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(self.table.lock().await.rows.values().cloned().collect())
    }

    async fn update_device(&self, device_id: DeviceId, update: DeviceUpdate) -> Result<Device> {
        let mut table = self.table.lock().await;
        let device = table
            .rows
            .get_mut(&device_id)
            .ok_or_else(|| Error::device_not_found(device_id))?;
        update.apply(device);
        info!(device_id = device_id.0, "device updated");
        Ok(device.clone())
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<Device> {
        let mut table = self.table.lock().await;
        let device = table
            .rows
            .remove(&device_id)
            .ok_or_else(|| Error::device_not_found(device_id))?;
        info!(device_id = device_id.0, "device deleted");
        Ok(device)
    }
}

#[derive(Debug, Default)]
struct UserTable {
    last_id: i64,
    rows: BTreeMap<UserId, User>,
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    table: Mutex<UserTable>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, new: NewUser) -> Result<User> {
        let mut table = self.table.lock().await;
        if table.rows.contains_key(&new.user_id) {
            return Err(Error::Conflict(format!(
                "user {} already exists",
                new.user_id
            )));
        }
        table.last_id += 1;
        let user = User {
            id: table.last_id,
            user_id: new.user_id,
            tag: new.tag,
            devices: Vec::new(),
            device_counter: 0,
            active: true,
            create_time: new.create_time,
        };
        table.rows.insert(user.user_id, user.clone());
        info!(user_id = user.user_id.0, "user created");
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> Result<User> {
        let table = self.table.lock().await;
        debug!(user_id = user_id.0, "user lookup");
        table
            .rows
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::user_not_found(user_id))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.table.lock().await.rows.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> Result<User> {
        let mut table = self.table.lock().await;
        let user = table
            .rows
            .get_mut(&user_id)
            .ok_or_else(|| Error::user_not_found(user_id))?;
        update.apply(user);
        info!(user_id = user_id.0, "user updated");
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<User> {
        let mut table = self.table.lock().await;
        let user = table
            .rows
            .remove(&user_id)
            .ok_or_else(|| Error::user_not_found(user_id))?;
        info!(user_id = user_id.0, "user deleted");
        Ok(user)
    }
}
