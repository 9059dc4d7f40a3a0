//! Profile lookup and owner-only edits.

use std::sync::Arc;
use validator::Validate;

use crate::db::{collections, fields, CollectionGateway, CollectionRef, Patch, Query};
use crate::error::{AppError, Result};
use crate::models::{Identity, Profile, ProfileUpdate};

/// Reads and writes documents in the `users` collection.
pub struct ProfileService<G> {
    gateway: Arc<G>,
}

impl<G> Clone for ProfileService<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<G: CollectionGateway> ProfileService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    fn users() -> CollectionRef {
        CollectionRef::root(collections::USERS)
    }

    /// Profile whose email matches `email`, if any.
    pub async fn lookup(&self, email: &Identity) -> Result<Option<Profile>> {
        let mut profiles: Vec<Profile> = self
            .gateway
            .query(
                &Self::users(),
                &Query::all().eq(fields::EMAIL, email.as_str()).limit(1),
            )
            .await?;
        Ok(profiles.pop())
    }

    /// Profile whose email matches `email`.
    pub async fn find_by_email(&self, email: &Identity) -> Result<Profile> {
        self.lookup(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No profile for {}", email)))
    }

    /// Write the profile document for a newly registered account.
    pub async fn create(&self, profile: &Profile) -> Result<String> {
        let id = self
            .gateway
            .insert(&Self::users(), profile, fields::CREATED_AT)
            .await?;
        tracing::info!(email = %profile.email, id = %id, "Profile created");
        Ok(id)
    }

    /// Save an edit to `owner`'s profile. Only the owner may save.
    pub async fn save(
        &self,
        owner: &Identity,
        requester: &Identity,
        update: &ProfileUpdate,
    ) -> Result<Profile> {
        if owner != requester {
            tracing::warn!(owner = %owner, requester = %requester, "Profile edit rejected");
            return Err(AppError::Forbidden(
                "You can only edit your own profile".to_string(),
            ));
        }
        let update = update.trimmed();
        update.validate()?;

        let mut profile = self.find_by_email(owner).await?;
        let id = profile
            .id
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("profile without document id")))?;

        self.gateway
            .update(&Self::users(), &id, Patch::set_from(&update)?)
            .await?;

        profile.name = Some(update.name);
        profile.phone = Some(update.phone);
        profile.photo_ref = Some(update.photo_ref).filter(|p| !p.is_empty());
        tracing::info!(email = %owner, "Profile saved");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDb;

    async fn service_with_profile() -> (Arc<InMemoryDb>, ProfileService<InMemoryDb>) {
        let db = Arc::new(InMemoryDb::new());
        let service = ProfileService::new(db.clone());
        service
            .create(&Profile {
                email: "ana@x.com".to_string(),
                name: Some("Ana".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        (db, service)
    }

    #[tokio::test]
    async fn test_find_by_email() {
        let (_db, service) = service_with_profile().await;

        let profile = service
            .find_by_email(&Identity::new("ana@x.com"))
            .await
            .unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert!(profile.id.is_some());

        let missing = service.find_by_email(&Identity::new("bo@x.com")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_by_owner() {
        let (_db, service) = service_with_profile().await;
        let ana = Identity::new("ana@x.com");

        let update = ProfileUpdate {
            name: "Ana Lima".to_string(),
            phone: "555-0100".to_string(),
            photo_ref: "file:///ana.jpg".to_string(),
        };
        let saved = service.save(&ana, &ana, &update).await.unwrap();
        assert_eq!(saved.name.as_deref(), Some("Ana Lima"));

        let stored = service.find_by_email(&ana).await.unwrap();
        assert_eq!(stored.phone.as_deref(), Some("555-0100"));
        assert_eq!(stored.photo_ref.as_deref(), Some("file:///ana.jpg"));
    }

    #[tokio::test]
    async fn test_save_by_other_is_forbidden() {
        let (db, service) = service_with_profile().await;
        let writes = db.write_count();

        let result = service
            .save(
                &Identity::new("ana@x.com"),
                &Identity::new("bo@x.com"),
                &ProfileUpdate {
                    name: "Bo".to_string(),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(db.write_count(), writes);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_name() {
        let (_db, service) = service_with_profile().await;
        let ana = Identity::new("ana@x.com");

        let result = service.save(&ana, &ana, &ProfileUpdate::default()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_save_rejects_blank_name_and_trims() {
        let (db, service) = service_with_profile().await;
        let ana = Identity::new("ana@x.com");
        let writes = db.write_count();

        let blank = ProfileUpdate {
            name: "   ".to_string(),
            ..Default::default()
        };
        let result = service.save(&ana, &ana, &blank).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(db.write_count(), writes);

        let padded = ProfileUpdate {
            name: "  Ana Lima ".to_string(),
            phone: " 555-0100".to_string(),
            photo_ref: String::new(),
        };
        service.save(&ana, &ana, &padded).await.unwrap();

        let stored = service.find_by_email(&ana).await.unwrap();
        assert_eq!(stored.name.as_deref(), Some("Ana Lima"));
        assert_eq!(stored.phone.as_deref(), Some("555-0100"));
    }
}
