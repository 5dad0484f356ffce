//! Store fakes with fault injection for unit tests.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{Device, DeviceId, DeviceUpdate, NewDevice, NewUser, User, UserId, UserUpdate},
    errors::Error,
    ports::{DeviceStore, UserStore},
    store::memory::{MemoryDeviceStore, MemoryUserStore},
    Result,
};

fn injected(op: &str) -> Error {
    Error::Store(format!("injected failure in {op}"))
}

#[derive(Default)]
pub(crate) struct FlakyDevices {
    pub inner: MemoryDeviceStore,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_update: AtomicBool,
    pub create_delay_ms: AtomicU64,
    pub deletes: AtomicUsize,
    pub updates: AtomicUsize,
}

#[async_trait]
impl DeviceStore for FlakyDevices {
    async fn create_device(&self, new: NewDevice) -> Result<Device> {
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create_device"));
        }
        self.inner.create_device(new).await
    }

    async fn get_device(&self, device_id: DeviceId) -> Result<Device> {
        self.inner.get_device(device_id).await
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.inner.list_devices().await
    }

    async fn update_device(&self, device_id: DeviceId, update: DeviceUpdate) -> Result<Device> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected("update_device"));
        }
        self.inner.update_device(device_id, update).await
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<Device> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete_device"));
        }
        self.inner.delete_device(device_id).await
    }
}

#[derive(Default)]
pub(crate) struct FlakyUsers {
    pub inner: MemoryUserStore,
    pub fail_get: AtomicBool,
    pub fail_update: AtomicBool,
    /// Fail only the update for this user id (0 = unset).
    pub fail_update_for: AtomicU64,
    /// Delay applied after the row is read, widening the read-modify-write window.
    pub read_delay_ms: AtomicU64,
    /// Delay before a membership write reaches the store.
    pub update_delay_ms: AtomicU64,
    pub updates: AtomicUsize,
}

#[async_trait]
impl UserStore for FlakyUsers {
    async fn create_user(&self, new: NewUser) -> Result<User> {
        self.inner.create_user(new).await
    }

    async fn get_user(&self, user_id: UserId) -> Result<User> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(injected("get_user"));
        }
        let user = self.inner.get_user(user_id).await?;
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users().await
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> Result<User> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let delay = self.update_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_update.load(Ordering::SeqCst)
            || self.fail_update_for.load(Ordering::SeqCst) == user_id.0 as u64
        {
            return Err(injected("update_user"));
        }
        self.inner.update_user(user_id, update).await
    }

    async fn delete_user(&self, user_id: UserId) -> Result<User> {
        self.inner.delete_user(user_id).await
    }
}

pub(crate) async fn seed_user(users: &FlakyUsers, user_id: i64) -> User {
    users
        .inner
        .create_user(NewUser::new(UserId(user_id), format!("user_{user_id}")))
        .await
        .unwrap()
}
