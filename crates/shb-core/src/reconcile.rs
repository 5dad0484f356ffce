//! Reconciliation pass for membership drift.
//!
//! Scans both stores and repairs what a failed final membership write can
//! leave behind:
//! - dangling ids (membership references a deleted device) are dropped;
//! - duplicate ids within one list, and ids claimed by an earlier user, are dropped;
//! - `device_counter` is reset to the list length;
//! - orphan devices (referenced by nobody) are reported, and deleted on request
//!   once a second pass of the same reconciler still finds them unreferenced.
//!
//! A pass is idempotent: running it again on a repaired state changes nothing.
//!
//! The per-user locks only exclude writers in this process. The bot runs a
//! reconciler on a schedule with the synchronizer's lock table; see
//! [`Reconciler::spawn_periodic`].

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::{
    domain::{now_naive, Device, DeviceId, User, UserId, UserUpdate},
    locks::UserLocks,
    ports::{DeviceStore, UserStore},
    store::with_deadline,
    Error, Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ReconcileConfig {
    pub store_timeout: Duration,
    /// Delete orphan devices instead of only reporting them. A device must be
    /// unreferenced in two consecutive passes before it is deleted.
    pub delete_orphans: bool,
    /// Unreferenced devices younger than this may be mid-attach and are left alone.
    pub orphan_grace: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            delete_orphans: false,
            orphan_grace: Duration::from_secs(300),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserRepair {
    pub user_id: UserId,
    pub dangling_removed: Vec<DeviceId>,
    pub duplicates_removed: Vec<DeviceId>,
    /// Ids already owned by a user with a lower internal id.
    pub foreign_removed: Vec<DeviceId>,
    pub counter_before: i64,
    pub counter_after: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileFailure {
    pub subject: String,
    pub kind: &'static str,
    pub error: String,
}

impl ReconcileFailure {
    fn new(subject: String, err: &Error) -> Self {
        Self {
            subject,
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub users_scanned: usize,
    pub devices_scanned: usize,
    pub repaired: Vec<UserRepair>,
    pub orphans: Vec<DeviceId>,
    pub orphans_deleted: Vec<DeviceId>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    /// Nothing found, nothing changed, nothing failed.
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty() && self.orphans.is_empty() && self.failures.is_empty()
    }
}

pub struct Reconciler {
    devices: Arc<dyn DeviceStore>,
    users: Arc<dyn UserStore>,
    locks: Arc<UserLocks>,
    cfg: ReconcileConfig,
    /// Orphans seen by the previous pass.
    suspects: Mutex<HashSet<DeviceId>>,
}

impl Reconciler {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        users: Arc<dyn UserStore>,
        locks: Arc<UserLocks>,
        cfg: ReconcileConfig,
    ) -> Self {
        Self {
            devices,
            users,
            locks,
            cfg,
            suspects: Mutex::new(HashSet::new()),
        }
    }

    /// Run a pass every `every` until the runtime shuts down. A failed pass is
    /// logged and the next tick tries again.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; let the bot settle first.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.run().await {
                    Ok(report) if !report.failures.is_empty() => warn!(
                        failures = report.failures.len(),
                        "scheduled reconciliation left items unrepaired"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(kind = e.kind(), error = %e, "scheduled reconciliation failed"),
                }
            }
        })
    }

    pub async fn run(&self) -> Result<ReconcileReport> {
        self.run_at(now_naive()).await
    }

    /// Run one pass, judging orphan age against `now`.
    ///
    /// Failing to list either store aborts before any write. After that, a
    /// failure on one user or device is recorded and the pass continues.
    pub async fn run_at(&self, now: NaiveDateTime) -> Result<ReconcileReport> {
        let devices = self
            .bounded("list_devices", self.devices.list_devices())
            .await?;
        let mut users = self.bounded("list_users", self.users.list_users()).await?;
        users.sort_by_key(|u| u.id);

        let mut report = ReconcileReport {
            users_scanned: users.len(),
            devices_scanned: devices.len(),
            ..ReconcileReport::default()
        };
        let existing: HashSet<DeviceId> = devices.iter().map(|d| d.device_id).collect();
        let mut claimed: HashMap<DeviceId, UserId> = HashMap::new();

        for listed in &users {
            match self
                .repair_user(listed.user_id, &existing, &mut claimed)
                .await
            {
                Ok(Some(repair)) => report.repaired.push(repair),
                Ok(None) => {}
                Err(e) => {
                    // Keep the listed claims so these devices are not mistaken for orphans.
                    for &id in &listed.devices {
                        claimed.entry(id).or_insert(listed.user_id);
                    }
                    warn!(user_id = listed.user_id.0, kind = e.kind(), error = %e, "user repair failed");
                    report
                        .failures
                        .push(ReconcileFailure::new(format!("user {}", listed.user_id), &e));
                }
            }
        }

        let mut suspects = self.suspects.lock().await;
        let previous = std::mem::take(&mut *suspects);
        for device in &devices {
            if claimed.contains_key(&device.device_id) || !self.past_grace(device, now) {
                continue;
            }
            warn!(device_id = device.device_id.0, "orphan device: no user references it");
            report.orphans.push(device.device_id);
            suspects.insert(device.device_id);

            if !self.cfg.delete_orphans || !previous.contains(&device.device_id) {
                continue;
            }
            match self
                .bounded(
                    "delete_device",
                    self.devices.delete_device(device.device_id),
                )
                .await
            {
                Ok(_) => {
                    info!(device_id = device.device_id.0, "orphan device deleted");
                    suspects.remove(&device.device_id);
                    report.orphans_deleted.push(device.device_id);
                }
                Err(e) if e.is_not_found() => {
                    suspects.remove(&device.device_id);
                }
                Err(e) => report
                    .failures
                    .push(ReconcileFailure::new(format!("device {}", device.device_id), &e)),
            }
        }
        drop(suspects);

        info!(
            users = report.users_scanned,
            devices = report.devices_scanned,
            repaired = report.repaired.len(),
            orphans = report.orphans.len(),
            failures = report.failures.len(),
            "reconciliation pass finished"
        );
        Ok(report)
    }

    async fn repair_user(
        &self,
        user_id: UserId,
        existing: &HashSet<DeviceId>,
        claimed: &mut HashMap<DeviceId, UserId>,
    ) -> Result<Option<UserRepair>> {
        let _held = self.locks.lock_user(user_id).await;
        // Re-read under the lock; the listed row may be stale by now.
        let Some(user) = self.fetch_user(user_id).await? else {
            return Ok(None);
        };

        let mut repair = UserRepair {
            user_id,
            counter_before: user.device_counter,
            ..UserRepair::default()
        };
        let mut seen: HashSet<DeviceId> = HashSet::with_capacity(user.devices.len());
        let mut dropped: HashSet<DeviceId> = HashSet::new();
        for &id in &user.devices {
            if !seen.insert(id) {
                repair.duplicates_removed.push(id);
            } else if claimed.get(&id).is_some_and(|&owner| owner != user_id) {
                repair.foreign_removed.push(id);
                dropped.insert(id);
            } else if !existing.contains(&id) && !self.device_exists(id).await? {
                // Absent from the snapshot and confirmed gone: not just created after it.
                repair.dangling_removed.push(id);
                dropped.insert(id);
            }
        }

        if dropped.is_empty() && repair.duplicates_removed.is_empty() && user.counter_matches() {
            for &id in &user.devices {
                claimed.entry(id).or_insert(user_id);
            }
            return Ok(None);
        }

        // Apply only the removals to the newest row, so an id linked by a
        // writer outside this process since the first read survives.
        let Some(fresh) = self.fetch_user(user_id).await? else {
            return Ok(None);
        };
        let mut kept: Vec<DeviceId> = Vec::with_capacity(fresh.devices.len());
        for &id in &fresh.devices {
            if !dropped.contains(&id) && !kept.contains(&id) {
                kept.push(id);
            }
        }
        for &id in &kept {
            claimed.entry(id).or_insert(user_id);
        }
        if kept == fresh.devices && fresh.counter_matches() {
            return Ok(None);
        }

        repair.counter_after = kept.len() as i64;
        self.bounded(
            "update_user",
            self.users.update_user(user_id, UserUpdate::membership(kept)),
        )
        .await?;
        warn!(
            user_id = user_id.0,
            dangling = repair.dangling_removed.len(),
            duplicates = repair.duplicates_removed.len(),
            foreign = repair.foreign_removed.len(),
            counter_before = repair.counter_before,
            counter_after = repair.counter_after,
            "membership repaired"
        );
        Ok(Some(repair))
    }

    async fn fetch_user(&self, user_id: UserId) -> Result<Option<User>> {
        match self.bounded("get_user", self.users.get_user(user_id)).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn device_exists(&self, device_id: DeviceId) -> Result<bool> {
        match self
            .bounded("get_device", self.devices.get_device(device_id))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn past_grace(&self, device: &Device, now: NaiveDateTime) -> bool {
        now.signed_duration_since(device.create_time)
            .to_std()
            .is_ok_and(|age| age >= self.cfg.orphan_grace)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_deadline(op, self.cfg.store_timeout, fut).await
    }
}
