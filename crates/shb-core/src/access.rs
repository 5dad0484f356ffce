//! Ownership checks run before any per-device mutation reachable from the bot.

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    domain::{Device, DeviceId, UserId},
    ports::{DeviceStore, UserStore},
    store::with_deadline,
    Result,
};

/// Outcome of an ownership check. `Denied` is a normal answer, not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
}

impl Access {
    pub fn is_granted(self) -> bool {
        matches!(self, Access::Granted)
    }
}

/// Result of an operation that ran behind the access guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    Granted(T),
    Denied,
}

impl<T> Guarded<T> {
    pub fn granted(self) -> Option<T> {
        match self {
            Guarded::Granted(v) => Some(v),
            Guarded::Denied => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Guarded::Denied)
    }
}

pub struct AccessGuard {
    devices: Arc<dyn DeviceStore>,
    users: Arc<dyn UserStore>,
    store_timeout: Duration,
}

impl AccessGuard {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        users: Arc<dyn UserStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            devices,
            users,
            store_timeout,
        }
    }

    pub async fn check(&self, user_id: UserId, device_id: DeviceId) -> Result<Access> {
        Ok(match self.owned_device(user_id, device_id).await? {
            Some(_) => Access::Granted,
            None => Access::Denied,
        })
    }

    /// The device, if `user_id` owns it and it still exists.
    ///
    /// A missing user and a dangling membership id both come back as `None`,
    /// indistinguishable from "owned by someone else".
    pub async fn owned_device(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<Option<Device>> {
        let user = match with_deadline(
            "get_user",
            self.store_timeout,
            self.users.get_user(user_id),
        )
        .await
        {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!(user_id = user_id.0, device_id = device_id.0, "access denied: unknown user");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !user.owns(device_id) {
            debug!(user_id = user_id.0, device_id = device_id.0, "access denied: not a member");
            return Ok(None);
        }

        match with_deadline(
            "get_device",
            self.store_timeout,
            self.devices.get_device(device_id),
        )
        .await
        {
            Ok(device) => Ok(Some(device)),
            Err(e) if e.is_not_found() => {
                warn!(
                    user_id = user_id.0,
                    device_id = device_id.0,
                    "access denied: membership references a deleted device (dangling id)"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{NewDevice, UserUpdate},
        ports::{DeviceStore, UserStore},
        store::testing::{seed_user, FlakyDevices, FlakyUsers},
    };
    use std::sync::atomic::Ordering;

    fn guard(devices: &Arc<FlakyDevices>, users: &Arc<FlakyUsers>) -> AccessGuard {
        AccessGuard::new(devices.clone(), users.clone(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn owner_is_granted_other_user_is_denied() {
        let devices = Arc::new(FlakyDevices::default());
        let users = Arc::new(FlakyUsers::default());
        seed_user(&users, 100).await;
        seed_user(&users, 200).await;
        let d = devices
            .create_device(NewDevice::new("Lamp", "desk", "room1"))
            .await
            .unwrap();
        users
            .update_user(UserId(100), UserUpdate::membership(vec![d.device_id]))
            .await
            .unwrap();

        let g = guard(&devices, &users);
        assert_eq!(g.check(UserId(100), d.device_id).await.unwrap(), Access::Granted);
        assert_eq!(g.check(UserId(200), d.device_id).await.unwrap(), Access::Denied);
    }

    #[tokio::test]
    async fn unknown_user_is_denied_not_an_error() {
        let devices = Arc::new(FlakyDevices::default());
        let users = Arc::new(FlakyUsers::default());
        let g = guard(&devices, &users);
        assert_eq!(g.check(UserId(42), DeviceId(1)).await.unwrap(), Access::Denied);
    }

    #[tokio::test]
    async fn dangling_id_is_denied() {
        let devices = Arc::new(FlakyDevices::default());
        let users = Arc::new(FlakyUsers::default());
        seed_user(&users, 100).await;
        users
            .update_user(UserId(100), UserUpdate::membership(vec![DeviceId(7)]))
            .await
            .unwrap();

        let g = guard(&devices, &users);
        assert_eq!(g.check(UserId(100), DeviceId(7)).await.unwrap(), Access::Denied);
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let devices = Arc::new(FlakyDevices::default());
        let users = Arc::new(FlakyUsers::default());
        users.fail_get.store(true, Ordering::SeqCst);

        let err = guard(&devices, &users)
            .check(UserId(100), DeviceId(7))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store");
    }
}
