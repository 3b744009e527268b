use std::sync::Arc;

use tracing::info;

use super::ServiceError;
use crate::ids::UserId;
use crate::model::{OAuthProfile, User};
use crate::store::{RepoError, TxManager, UserRepository};

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    tx: Arc<dyn TxManager>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, tx: Arc<dyn TxManager>) -> Self {
        Self { repo, tx }
    }

    /// Return the user linked to this provider identity, refreshing email,
    /// name and avatar when they changed, or create one on first login.
    pub fn find_or_create_from_oauth(&self, profile: &OAuthProfile) -> Result<User, ServiceError> {
        match self
            .repo
            .find_by_provider(&profile.provider, &profile.provider_id)
        {
            Ok(existing) => {
                if existing.email == profile.email
                    && existing.name == profile.name
                    && existing.avatar_url == profile.avatar_url
                {
                    return Ok(existing);
                }
                self.repo
                    .update_profile(existing.id, profile)
                    .map_err(ServiceError::from_user_repo)
            }
            Err(RepoError::NotFound) => {
                let user = self
                    .repo
                    .create(profile)
                    .map_err(ServiceError::from_user_repo)?;
                info!(user_id = %user.id, provider = %profile.provider, "User registered");
                Ok(user)
            }
            Err(e) => Err(ServiceError::Internal(e)),
        }
    }

    pub fn get(&self, id: UserId) -> Result<User, ServiceError> {
        self.repo.get(id).map_err(ServiceError::from_user_repo)
    }

    /// Delete the user and all of their todos in one transaction.
    pub fn delete_account(&self, id: UserId) -> Result<(), ServiceError> {
        self.get(id)?;

        let mut todos_removed = 0;
        self.tx
            .run_in_tx(&mut |tx| {
                todos_removed = tx.delete_todos_of(id)?;
                tx.delete_user(id)
            })
            .map_err(ServiceError::from_user_repo)?;

        info!(user_id = %id, todos_removed, "Account deleted");
        Ok(())
    }
}
