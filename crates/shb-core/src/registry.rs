//! User registration and account state.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    domain::{NewUser, User, UserId, UserUpdate},
    ports::UserStore,
    store::with_deadline,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub user: User,
    /// False when the user already existed.
    pub created: bool,
}

pub struct UserRegistry {
    users: Arc<dyn UserStore>,
    store_timeout: Duration,
}

impl UserRegistry {
    pub fn new(users: Arc<dyn UserStore>, store_timeout: Duration) -> Self {
        Self {
            users,
            store_timeout,
        }
    }

    /// Get or create the row for `user_id`.
    ///
    /// Two concurrent `/start`s can both miss on read; the loser's create
    /// fails with `Conflict` and re-reads the winner's row.
    pub async fn register(&self, user_id: UserId, tag: &str) -> Result<Registration> {
        if let Some(user) = self.get(user_id).await? {
            return Ok(Registration {
                user,
                created: false,
            });
        }

        match with_deadline(
            "create_user",
            self.store_timeout,
            self.users.create_user(NewUser::new(user_id, tag)),
        )
        .await
        {
            Ok(user) => {
                info!(user_id = user_id.0, "user registered");
                Ok(Registration {
                    user,
                    created: true,
                })
            }
            Err(crate::Error::Conflict(reason)) => {
                warn!(user_id = user_id.0, %reason, "registration raced; re-reading");
                let user = with_deadline(
                    "get_user",
                    self.store_timeout,
                    self.users.get_user(user_id),
                )
                .await?;
                Ok(Registration {
                    user,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, user_id: UserId) -> Result<Option<User>> {
        match with_deadline("get_user", self.store_timeout, self.users.get_user(user_id)).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ban (`false`) or unban (`true`) a user. Membership is left as is.
    pub async fn set_active(&self, user_id: UserId, active: bool) -> Result<User> {
        let user = with_deadline(
            "update_user",
            self.store_timeout,
            self.users.update_user(user_id, UserUpdate::active(active)),
        )
        .await?;
        info!(user_id = user_id.0, active, "user active flag changed");
        Ok(user)
    }
}
