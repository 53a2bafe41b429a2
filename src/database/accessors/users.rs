use chrono::Utc;
use log::{debug, info};

use crate::database::entities::{NewUser, User, UserProfile};
use crate::database::{DatabaseError, DatabaseManager, DbResult, Query};

impl DatabaseManager {
    /// Register a new user and return the generated id
    ///
    /// Fails with `DuplicateKey` if the email is already registered.
    pub async fn create_user(&self, new_user: NewUser) -> DbResult<String> {
        let user = User {
            id: None,
            password: self.passwords().seal(&new_user.password)?,
            name: new_user.name,
            email: new_user.email,
            phone: new_user.phone,
            state: new_user.state,
            district: new_user.district,
            created_at: Utc::now(),
            saved_crops: Vec::new(),
            saved_fertilizers: Vec::new(),
            disease_history: Vec::new(),
        };

        let name = user.name.clone();
        let email = user.email.clone();
        let id = self.users().insert_one(user).await?;

        info!("User created: {} ({})", name, email);
        Ok(id)
    }

    /// Look up a user, credential included, by email
    pub async fn find_user_by_email(&self, email: &str) -> DbResult<User> {
        let user = self
            .users()
            .find_one(&Query::by_email(email))
            .await?
            .ok_or_else(|| DatabaseError::NotFound(email.to_string()))?;

        debug!("User found: {}", email);
        Ok(user)
    }

    /// Look up a user by id, without the credential
    pub async fn find_user_by_id(&self, user_id: &str) -> DbResult<UserProfile> {
        self.users()
            .find_one(&Query::by_id(user_id))
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| DatabaseError::NotFound(user_id.to_string()))
    }

    /// Check login credentials
    ///
    /// Returns `None` for an unknown email or a wrong password alike.
    pub async fn authenticate_user(&self, email: &str, password: &str) -> DbResult<Option<UserProfile>> {
        let user = match self.find_user_by_email(email).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if self.passwords().verify(password, &user.password) {
            info!("User {} authenticated", email);
            Ok(Some(user.into()))
        } else {
            info!("Rejected login for {}", email);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::credentials::PasswordStorage;
    use tempfile::tempdir;

    fn signup(email: &str) -> NewUser {
        NewUser {
            name: "Meena".into(),
            email: email.into(),
            password: "kharif-24".into(),
            phone: "+91 9845000000".into(),
            state: "Karnataka".into(),
            district: "Mandya".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let manager = DatabaseManager::connect(&Config::offline(temp_dir.path())).await?;

        let id = manager.create_user(signup("meena@example.com")).await?;

        let user = manager.find_user_by_email("meena@example.com").await?;
        assert_eq!(user.id.as_deref(), Some(id.as_str()));
        assert_eq!(user.password, "kharif-24");

        let profile = manager.find_user_by_id(&id).await?;
        assert_eq!(profile.email, "meena@example.com");
        assert!(serde_json::to_value(&profile)?.get("password").is_none());

        assert!(manager.find_user_by_id("missing").await.unwrap_err().is_not_found());
        assert!(manager.find_user_by_email("x@example.com").await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_signup_is_a_conflict() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let manager = DatabaseManager::connect(&Config::offline(temp_dir.path())).await?;

        let first = manager.create_user(signup("same@example.com")).await?;
        let mut second = signup("same@example.com");
        second.name = "Impostor".into();

        let err = manager.create_user(second).await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey(_)));

        let stored = manager.find_user_by_email("same@example.com").await?;
        assert_eq!(stored.id.as_deref(), Some(first.as_str()));
        assert_eq!(stored.name, "Meena");
        Ok(())
    }

    #[tokio::test]
    async fn test_authenticate_with_hashed_passwords() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let mut config = Config::offline(temp_dir.path());
        config.security.password_storage = PasswordStorage::Bcrypt;
        config.security.bcrypt_cost = 4;
        let manager = DatabaseManager::connect(&config).await?;

        manager.create_user(signup("hash@example.com")).await?;
        let stored = manager.find_user_by_email("hash@example.com").await?;
        assert_ne!(stored.password, "kharif-24");

        let profile = manager.authenticate_user("hash@example.com", "kharif-24").await?;
        assert_eq!(profile.map(|p| p.email), Some("hash@example.com".to_string()));
        assert!(manager.authenticate_user("hash@example.com", "wrong").await?.is_none());
        assert!(manager.authenticate_user("nobody@example.com", "kharif-24").await?.is_none());
        Ok(())
    }
}
