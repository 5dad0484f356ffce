//! DataBase REST API adapter.
//!
//! Implements the `shb-core` Device Store and User Store ports over the
//! `/device/...` and `/user/...` endpoints.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use shb_core::{
    config::{Config, StoreBackend},
    domain::{Device, DeviceId, DeviceUpdate, NewDevice, NewUser, User, UserId, UserUpdate},
    errors::{Entity, Error},
    ports::{DeviceStore, UserStore},
    store::memory::{MemoryDeviceStore, MemoryUserStore},
    Result,
};

/// What a request addresses, for mapping error statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Create,
    Row(Entity, i64),
    List,
}

/// Map a non-2xx response to the core error.
///
/// The API reports missing rows as 400, and a rejected create (duplicate
/// user) as 400 too.
pub fn status_error(op: &str, call: Call, status: u16, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    match (call, status) {
        (Call::Create, 400 | 409) | (_, 409) => Error::Conflict(format!("{op}: {status} {snippet}")),
        (Call::Row(entity, id), 400 | 404) => Error::NotFound { entity, id },
        _ => Error::Store(format!("{op} failed: {status} {snippet}")),
    }
}

#[derive(Serialize)]
struct CreateDevicePayload<'a> {
    /// Assigned by the API; sent as 0.
    device_id: i64,
    #[serde(flatten)]
    device: &'a NewDevice,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build error: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, op: &'static str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                op,
                after: self.timeout,
            }
        } else {
            Error::Store(format!("{op} request error: {e}"))
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        op: &'static str,
        call: Call,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = req.send().await.map_err(|e| self.transport_error(op, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = status_error(op, call, status.as_u16(), &body);
            if err.is_not_found() {
                debug!(op, status = status.as_u16(), "database api: row not found");
            } else {
                warn!(op, status = status.as_u16(), kind = err.kind(), "database api call failed");
            }
            return Err(err);
        }

        resp.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(op, e)
            } else {
                Error::Store(format!("{op} returned an unexpected body: {e}"))
            }
        })
    }
}

#[async_trait]
impl DeviceStore for ApiClient {
    async fn create_device(&self, new: NewDevice) -> Result<Device> {
        let payload = CreateDevicePayload {
            device_id: 0,
            device: &new,
        };
        let req = self.http.post(self.url("/device/create/device")).json(&payload);
        let device: Device = self.send("create_device", Call::Create, req).await?;
        info!(device_id = device.device_id.0, "device created via api");
        Ok(device)
    }

    async fn get_device(&self, device_id: DeviceId) -> Result<Device> {
        debug!(device_id = device_id.0, "device lookup via api");
        let req = self
            .http
            .get(self.url(&format!("/device/get/device/{device_id}")));
        self.send("get_device", Call::Row(Entity::Device, device_id.0), req)
            .await
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        debug!("device listing via api");
        let req = self.http.get(self.url("/device/get/all/devices"));
        self.send("list_devices", Call::List, req).await
    }

    async fn update_device(&self, device_id: DeviceId, update: DeviceUpdate) -> Result<Device> {
        let req = self
            .http
            .put(self.url(&format!("/device/update/device/{device_id}")))
            .json(&update);
        let device: Device = self
            .send("update_device", Call::Row(Entity::Device, device_id.0), req)
            .await?;
        info!(device_id = device_id.0, "device updated via api");
        Ok(device)
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<Device> {
        let req = self
            .http
            .delete(self.url(&format!("/device/delete/device/{device_id}")));
        let device: Device = self
            .send("delete_device", Call::Row(Entity::Device, device_id.0), req)
            .await?;
        info!(device_id = device_id.0, "device deleted via api");
        Ok(device)
    }
}

#[async_trait]
impl UserStore for ApiClient {
    async fn create_user(&self, new: NewUser) -> Result<User> {
        let req = self.http.post(self.url("/user/create/user")).json(&new);
        let user: User = self.send("create_user", Call::Create, req).await?;
        info!(user_id = user.user_id.0, "user created via api");
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> Result<User> {
        debug!(user_id = user_id.0, "user lookup via api");
        let req = self.http.get(self.url(&format!("/user/get/user/{user_id}")));
        self.send("get_user", Call::Row(Entity::User, user_id.0), req)
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        debug!("user listing via api");
        let req = self.http.get(self.url("/user/get/all/users"));
        self.send("list_users", Call::List, req).await
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> Result<User> {
        let req = self
            .http
            .put(self.url(&format!("/user/update/user/{user_id}")))
            .json(&update);
        let user: User = self
            .send("update_user", Call::Row(Entity::User, user_id.0), req)
            .await?;
        info!(
            user_id = user_id.0,
            devices = user.devices.len(),
            "user updated via api"
        );
        Ok(user)
    }

    async fn delete_user(&self, user_id: UserId) -> Result<User> {
        let req = self
            .http
            .delete(self.url(&format!("/user/delete/user/{user_id}")));
        let user: User = self
            .send("delete_user", Call::Row(Entity::User, user_id.0), req)
            .await?;
        info!(user_id = user_id.0, "user deleted via api");
        Ok(user)
    }
}

pub type StorePair = (Arc<dyn DeviceStore>, Arc<dyn UserStore>);

/// Build the configured store backend.
pub fn stores_from_config(cfg: &Config) -> Result<StorePair> {
    match cfg.store_backend {
        StoreBackend::Http => {
            let client = Arc::new(ApiClient::new(cfg.api_base_url.clone(), cfg.http_timeout)?);
            info!(base_url = %client.base_url(), "using database api stores");
            let devices: Arc<dyn DeviceStore> = client.clone();
            let users: Arc<dyn UserStore> = client;
            Ok((devices, users))
        }
        StoreBackend::Memory => {
            warn!("using in-memory stores; state is lost on exit");
            let devices: Arc<dyn DeviceStore> = Arc::new(MemoryDeviceStore::new());
            let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
            Ok((devices, users))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rows_map_to_not_found() {
        for status in [400, 404] {
            let err = status_error("get_device", Call::Row(Entity::Device, 7), status, "");
            assert!(matches!(
                err,
                Error::NotFound {
                    entity: Entity::Device,
                    id: 7
                }
            ));
        }
    }

    #[test]
    fn rejected_creates_and_409_map_to_conflict() {
        assert_eq!(
            status_error("create_user", Call::Create, 400, "Not unique").kind(),
            "conflict"
        );
        assert_eq!(
            status_error("update_user", Call::Row(Entity::User, 1), 409, "").kind(),
            "conflict"
        );
    }

    #[test]
    fn server_errors_are_retryable_store_failures() {
        let err = status_error("list_users", Call::List, 500, &"x".repeat(1000));
        assert_eq!(err.kind(), "store");
        assert!(err.is_retryable());
        assert!(err.to_string().len() < 300);

        assert_eq!(status_error("list_devices", Call::List, 404, "").kind(), "store");
    }

    #[test]
    fn create_device_payload_carries_placeholder_id() {
        let new = NewDevice::new("Lamp", "desk", "room1");
        let v = serde_json::to_value(CreateDevicePayload {
            device_id: 0,
            device: &new,
        })
        .unwrap();
        assert_eq!(v["device_id"], 0);
        assert_eq!(v["title"], "Lamp");
        assert!(v["create_time"].is_string());
    }

    #[test]
    fn update_payload_shapes() {
        let dev = serde_json::to_value(DeviceUpdate::active(true)).unwrap();
        assert_eq!(dev["active"], true);
        assert!(dev["title"].is_null());

        let user = serde_json::to_value(UserUpdate::membership(vec![DeviceId(3)])).unwrap();
        assert_eq!(user, serde_json::json!({"devices": [3], "device_counter": 1}));
    }

    #[test]
    fn parses_api_rows() {
        let device: Device = serde_json::from_str(
            r#"{"device_id": 3, "title": "Lamp", "description": "", "address": "hall",
                "active": true, "create_time": "2024-05-01T10:20:30.123456"}"#,
        )
        .unwrap();
        assert_eq!(device.device_id, DeviceId(3));

        let user: User = serde_json::from_str(
            r#"{"id": 1, "user_id": 42, "tag": "bob", "devices": [3, 5],
                "device_counter": 2, "active": true, "create_time": "2024-05-01T10:20:30"}"#,
        )
        .unwrap();
        assert!(user.owns(DeviceId(5)));
        assert!(user.counter_matches());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = ApiClient::new("http://database:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/user/get/all/users"), "http://database:8000/user/get/all/users");
    }

    #[test]
    fn memory_backend_needs_no_network() {
        let cfg = Config::for_tests();
        assert!(stores_from_config(&cfg).is_ok());
    }
}
