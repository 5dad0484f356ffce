//! Ownership synchronization between the Device Store and the User Store.
//!
//! The two stores share no foreign key and no transaction, so every
//! ownership change is a fixed sequence of single-row calls:
//!
//! - attach: create device -> read user -> write membership
//! - detach: read device -> delete device -> read user -> write membership
//!
//! The Device Store mutation always comes first; the membership write is the
//! idempotent pointer fix-up. When that last write fails the device is either
//! an orphan (attach) or the user holds a dangling id (detach). Neither is
//! repaired here: the failure is surfaced as
//! [`Error::OwnershipInconsistency`] for the caller or
//! [`crate::reconcile::Reconciler`] to act on.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::{
    access::{AccessGuard, Guarded},
    domain::{Device, DeviceId, DeviceUpdate, NewDevice, User, UserId, UserUpdate},
    errors::{Error, InconsistencyKind},
    locks::UserLocks,
    ports::{DeviceStore, UserStore},
    registry::{Registration, UserRegistry},
    store::with_deadline,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Deadline applied to every individual store call.
    pub store_timeout: Duration,
    /// Serialize the membership read-modify-write per user.
    ///
    /// When off, two concurrent attaches for one user can both read the same
    /// list and the second write drops the first device from membership.
    pub serialize_membership_writes: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            serialize_membership_writes: true,
        }
    }
}

pub struct OwnershipSynchronizer {
    devices: Arc<dyn DeviceStore>,
    users: Arc<dyn UserStore>,
    guard: AccessGuard,
    registry: UserRegistry,
    locks: Arc<UserLocks>,
    cfg: SyncConfig,
}

impl OwnershipSynchronizer {
    pub fn new(devices: Arc<dyn DeviceStore>, users: Arc<dyn UserStore>, cfg: SyncConfig) -> Self {
        Self::with_locks(devices, users, Arc::new(UserLocks::new()), cfg)
    }

    /// Share the lock table with other in-process writers (reconciliation).
    pub fn with_locks(
        devices: Arc<dyn DeviceStore>,
        users: Arc<dyn UserStore>,
        locks: Arc<UserLocks>,
        cfg: SyncConfig,
    ) -> Self {
        let guard = AccessGuard::new(devices.clone(), users.clone(), cfg.store_timeout);
        let registry = UserRegistry::new(users.clone(), cfg.store_timeout);
        Self {
            devices,
            users,
            guard,
            registry,
            locks,
            cfg,
        }
    }

    pub fn locks(&self) -> Arc<UserLocks> {
        self.locks.clone()
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    /// Get-or-create the user row for `/start`.
    pub async fn register_user(&self, user_id: UserId, tag: &str) -> Result<Registration> {
        self.registry.register(user_id, tag).await
    }

    /// Create a device and append it to `user_id`'s membership list.
    pub async fn attach_device(
        &self,
        user_id: UserId,
        title: &str,
        description: &str,
        address: &str,
    ) -> Result<Device> {
        let new = NewDevice::new(title, description, address);
        let device = self
            .bounded("create_device", self.devices.create_device(new))
            .await?;
        info!(
            user_id = user_id.0,
            device_id = device.device_id.0,
            "device created; linking to owner"
        );

        match self.link(user_id, device.device_id).await {
            Ok(user) => {
                debug!(
                    user_id = user_id.0,
                    device_counter = user.device_counter,
                    "membership updated"
                );
                Ok(device)
            }
            Err(cause) => Err(self.inconsistency(
                InconsistencyKind::Orphan,
                user_id,
                device.device_id,
                cause,
            )),
        }
    }

    /// Delete a device and remove it from `user_id`'s membership list.
    ///
    /// A device that does not exist short-circuits with `NotFound` before any
    /// write, so repeating a completed detach leaves membership untouched.
    pub async fn detach_device(&self, user_id: UserId, device_id: DeviceId) -> Result<Device> {
        self.bounded("get_device", self.devices.get_device(device_id))
            .await?;
        let deleted = self
            .bounded("delete_device", self.devices.delete_device(device_id))
            .await?;
        info!(
            user_id = user_id.0,
            device_id = device_id.0,
            "device deleted; unlinking from owner"
        );

        match self.unlink(user_id, device_id).await {
            Ok(()) => Ok(deleted),
            Err(cause) => Err(self.inconsistency(
                InconsistencyKind::Dangling,
                user_id,
                device_id,
                cause,
            )),
        }
    }

    pub async fn assert_ownership(&self, user_id: UserId, device_id: DeviceId) -> Result<bool> {
        Ok(self.guard.check(user_id, device_id).await?.is_granted())
    }

    /// Pure Device Store update; membership is never touched.
    pub async fn set_active(&self, device_id: DeviceId, active: bool) -> Result<Device> {
        let device = self
            .bounded(
                "update_device",
                self.devices
                    .update_device(device_id, DeviceUpdate::active(active)),
            )
            .await?;
        info!(device_id = device_id.0, active, "device state changed");
        Ok(device)
    }

    /// Flip `active` on a device the user owns.
    pub async fn toggle_owned(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<Guarded<Device>> {
        let Some(device) = self.guard.owned_device(user_id, device_id).await? else {
            return Ok(Guarded::Denied);
        };
        let device = self.set_active(device_id, !device.active).await?;
        Ok(Guarded::Granted(device))
    }

    pub async fn set_active_owned(
        &self,
        user_id: UserId,
        device_id: DeviceId,
        active: bool,
    ) -> Result<Guarded<Device>> {
        if !self.assert_ownership(user_id, device_id).await? {
            return Ok(Guarded::Denied);
        }
        Ok(Guarded::Granted(self.set_active(device_id, active).await?))
    }

    pub async fn detach_owned(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<Guarded<Device>> {
        if !self.assert_ownership(user_id, device_id).await? {
            return Ok(Guarded::Denied);
        }
        Ok(Guarded::Granted(self.detach_device(user_id, device_id).await?))
    }

    /// The user's devices in membership order. Dangling ids are skipped.
    pub async fn list_owned_devices(&self, user_id: UserId) -> Result<Vec<Device>> {
        let user = self
            .bounded("get_user", self.users.get_user(user_id))
            .await?;

        let mut out = Vec::with_capacity(user.devices.len());
        for &device_id in &user.devices {
            match self
                .bounded("get_device", self.devices.get_device(device_id))
                .await
            {
                Ok(device) => out.push(device),
                Err(e) if e.is_not_found() => {
                    warn!(
                        user_id = user_id.0,
                        device_id = device_id.0,
                        "skipping dangling id in membership list"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn link(&self, user_id: UserId, device_id: DeviceId) -> Result<User> {
        let _held = self.lock_membership(user_id).await;
        let user = self
            .bounded("get_user", self.users.get_user(user_id))
            .await?;

        let mut devices = user.devices;
        if !devices.contains(&device_id) {
            devices.push(device_id);
        }
        self.bounded(
            "update_user",
            self.users
                .update_user(user_id, UserUpdate::membership(devices)),
        )
        .await
    }

    async fn unlink(&self, user_id: UserId, device_id: DeviceId) -> Result<()> {
        let _held = self.lock_membership(user_id).await;
        let user = match self.bounded("get_user", self.users.get_user(user_id)).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                // No row, so nothing can reference the deleted device from this user.
                warn!(
                    user_id = user_id.0,
                    device_id = device_id.0,
                    "owner vanished before membership cleanup"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let devices: Vec<DeviceId> = user
            .devices
            .iter()
            .copied()
            .filter(|&id| id != device_id)
            .collect();
        if devices == user.devices && user.counter_matches() {
            return Ok(());
        }

        self.bounded(
            "update_user",
            self.users
                .update_user(user_id, UserUpdate::membership(devices)),
        )
        .await?;
        Ok(())
    }

    async fn lock_membership(&self, user_id: UserId) -> Option<OwnedMutexGuard<()>> {
        if !self.cfg.serialize_membership_writes {
            return None;
        }
        Some(self.locks.lock_user(user_id).await)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_deadline(op, self.cfg.store_timeout, fut).await
    }

    fn inconsistency(
        &self,
        kind: InconsistencyKind,
        user_id: UserId,
        device_id: DeviceId,
        cause: Error,
    ) -> Error {
        error!(
            kind = %kind,
            user_id = user_id.0,
            device_id = device_id.0,
            cause = %cause,
            "ownership inconsistency: membership write failed after device store change; not repaired"
        );
        Error::OwnershipInconsistency {
            kind,
            user_id,
            device_id,
            cause: Box::new(cause),
        }
    }
}
