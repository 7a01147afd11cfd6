//! Account management: registration, login, self-service updates and the
//! single live profile image.

use std::sync::Arc;

use log::warn;
use rf_core::error::{AppError, Result};
use rf_core::models::{Image, User};
use rf_core::traits::{AuthProvider, ImageStore, UserRepo};
use uuid::Uuid;

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 100;

pub struct UserService {
    repo: Arc<dyn UserRepo>,
    store: Arc<dyn ImageStore>,
    auth: Arc<dyn AuthProvider>,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepo>,
        store: Arc<dyn ImageStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self { repo, store, auth }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        validate_name(name)?;
        validate_email(email)?;
        validate_password(password)?;

        let hash = self.auth.hash_password(password)?;
        self.repo.create_user(name, email, &hash).await
    }

    /// Verifies credentials and issues a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(String, User)> {
        let user = self
            .repo
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found("user", email))?;

        if !self.auth.verify_password(password, &user.password_hash) {
            return Err(AppError::Unauthorized(
                "incorrect email or password".to_string(),
            ));
        }
        let token = self.auth.issue_token(user.id)?;
        Ok((token, user))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }

    pub async fn update_user(&self, id: Uuid, name: &str, email: &str) -> Result<()> {
        validate_name(name)?;
        validate_email(email)?;
        self.repo.update_user(id, name, email).await
    }

    /// Changes the password after verifying the old one.
    pub async fn update_password(&self, id: Uuid, old: &str, new: &str) -> Result<()> {
        validate_password(new)?;
        let user = self.get_user(id).await?;
        if !self.auth.verify_password(old, &user.password_hash) {
            return Err(AppError::Unauthorized("incorrect password".to_string()));
        }
        let hash = self.auth.hash_password(new)?;
        self.repo.update_password(id, &hash).await
    }

    /// Uploads a new profile image, replacing any previous one. The blob is
    /// written first and deleted again if recording it fails; a displaced
    /// old blob is removed best-effort after the new record is in place.
    pub async fn set_profile_image(
        &self,
        user_id: Uuid,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = self.store.store(data, content_type).await?;
        let displaced = match self.repo.set_profile_image(user_id, &url).await {
            Ok(displaced) => displaced,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&url).await {
                    warn!("failed to clean up unrecorded blob {url}: {cleanup}");
                }
                return Err(e);
            }
        };

        // The store is content-addressed: re-uploading identical bytes
        // yields the same URL, which must not be deleted from under the
        // fresh record.
        if let Some(old) = displaced.filter(|old| *old != url) {
            if let Err(e) = self.store.delete(&old).await {
                warn!("failed to delete displaced profile image {old}: {e}");
            }
        }
        Ok(url)
    }

    pub async fn profile_image(&self, user_id: Uuid) -> Result<Image> {
        self.repo
            .get_profile_image(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("image", user_id))
    }

    pub async fn delete_profile_image(&self, user_id: Uuid) -> Result<()> {
        let url = self
            .repo
            .delete_profile_image(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("image", user_id))?;

        if let Err(e) = self.store.delete(&url).await {
            warn!("failed to delete profile image blob {url}: {e}");
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.len() < MIN_NAME_LEN || name.len() > MAX_NAME_LEN {
        return Err(AppError::InvalidArgument(format!(
            "name must be {MIN_NAME_LEN}-{MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(AppError::InvalidArgument("invalid email address".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::InvalidArgument(format!(
            "password must be {MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rf_core::models::Role;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeUserRepo {
        users: Mutex<HashMap<Uuid, User>>,
        profile_urls: Mutex<HashMap<Uuid, String>>,
    }

    impl FakeUserRepo {
        fn seed(&self, user: User) {
            self.users.lock().unwrap().insert(user.id, user);
        }
    }

    #[async_trait]
    impl UserRepo for FakeUserRepo {
        async fn create_user(
            &self,
            name: &str,
            email: &str,
            password_hash: &str,
        ) -> Result<User> {
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == email) {
                return Err(AppError::Conflict(
                    "email already in use, try logging in instead".to_string(),
                ));
            }
            let user = User {
                id: Uuid::now_v7(),
                name: name.to_string(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role: Role::User,
                created_at: Utc::now(),
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn update_user(&self, id: Uuid, name: &str, email: &str) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            let user = users
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("user", id))?;
            user.name = name.to_string();
            user.email = email.to_string();
            Ok(())
        }

        async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            let user = users
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("user", id))?;
            user.password_hash = password_hash.to_string();
            Ok(())
        }

        async fn set_profile_image(&self, user_id: Uuid, url: &str) -> Result<Option<String>> {
            Ok(self
                .profile_urls
                .lock()
                .unwrap()
                .insert(user_id, url.to_string()))
        }

        async fn get_profile_image(&self, user_id: Uuid) -> Result<Option<Image>> {
            Ok(self.profile_urls.lock().unwrap().get(&user_id).map(|url| {
                Image {
                    id: Uuid::now_v7(),
                    user_id: Some(user_id),
                    post_id: None,
                    url: url.clone(),
                    uploaded_at: Utc::now(),
                }
            }))
        }

        async fn delete_profile_image(&self, user_id: Uuid) -> Result<Option<String>> {
            Ok(self.profile_urls.lock().unwrap().remove(&user_id))
        }
    }

    #[derive(Default)]
    struct FakeStore {
        deleted: Mutex<Vec<String>>,
        counter: Mutex<u32>,
    }

    #[async_trait]
    impl ImageStore for FakeStore {
        async fn store(&self, _data: Vec<u8>, _content_type: &str) -> Result<String> {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Ok(format!("/static/post_images/{counter}.png"))
        }

        async fn delete(&self, url: &str) -> Result<()> {
            self.deleted.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct FakeAuth;

    impl AuthProvider for FakeAuth {
        fn hash_password(&self, password: &str) -> Result<String> {
            Ok(format!("hash:{password}"))
        }

        fn verify_password(&self, password: &str, hash: &str) -> bool {
            hash == format!("hash:{password}")
        }

        fn issue_token(&self, user_id: Uuid) -> Result<String> {
            Ok(format!("token:{user_id}"))
        }

        fn verify_token(&self, token: &str) -> Result<Uuid> {
            token
                .strip_prefix("token:")
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| AppError::Unauthorized("bad token".to_string()))
        }
    }

    fn service() -> (UserService, Arc<FakeUserRepo>, Arc<FakeStore>) {
        let repo = Arc::new(FakeUserRepo::default());
        let store = Arc::new(FakeStore::default());
        (
            UserService::new(repo.clone(), store.clone(), Arc::new(FakeAuth)),
            repo,
            store,
        )
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let (service, _, _) = service();
        let user = service
            .register("alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let (token, logged_in) = service
            .login("alice@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (service, _, _) = service();
        service
            .register("alice", "alice@example.com", "secret1")
            .await
            .unwrap();
        let err = service
            .register("alice2", "alice@example.com", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let (service, _, _) = service();
        service
            .register("alice", "alice@example.com", "secret1")
            .await
            .unwrap();
        let err = service
            .login("alice@example.com", "wrong!")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn password_change_requires_old_password() {
        let (service, _, _) = service();
        let user = service
            .register("alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let err = service
            .update_password(user.id, "nope", "newsecret")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        service
            .update_password(user.id, "secret1", "newsecret")
            .await
            .unwrap();
        assert!(service.login("alice@example.com", "newsecret").await.is_ok());
    }

    #[tokio::test]
    async fn replacing_profile_image_deletes_displaced_blob() {
        let (service, _, store) = service();
        let user = service
            .register("alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let first = service
            .set_profile_image(user.id, vec![1], "image/png")
            .await
            .unwrap();
        let second = service
            .set_profile_image(user.id, vec![2], "image/png")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(*store.deleted.lock().unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let (service, _, _) = service();
        let err = service
            .register("alice", "alice@example.com", "tiny")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}
