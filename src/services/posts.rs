// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Publishing posts and listing a user's posts.

use std::sync::Arc;
use validator::Validate;

use crate::db::{collections, fields, CollectionGateway, CollectionRef, Query};
use crate::error::Result;
use crate::models::post::map_documents;
use crate::models::{feed_order, Identity, Post, PostDocument, PostDraft, PostId};
use crate::services::ProfileService;

pub struct PostService<G> {
    gateway: Arc<G>,
    profiles: ProfileService<G>,
}

impl<G: CollectionGateway> PostService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            profiles: ProfileService::new(gateway.clone()),
            gateway,
        }
    }

    fn posts() -> CollectionRef {
        CollectionRef::root(collections::POSTS)
    }

    /// Publish a new post for `author`.
    ///
    /// The author's current name and photo are copied into the post; later
    /// profile edits do not update it. The post shows up in feeds once the
    /// subscription delivers it.
    pub async fn publish(&self, author: &Identity, draft: &PostDraft) -> Result<PostId> {
        draft.validate()?;

        let profile = self.profiles.lookup(author).await?;
        if profile.is_none() {
            tracing::debug!(author = %author, "Publishing without a profile");
        }
        let (name, photo) = profile
            .map(|p| (p.name.unwrap_or_default(), p.photo_ref.unwrap_or_default()))
            .unwrap_or_default();

        let document = PostDocument {
            id: None,
            author: Some(author.to_string()),
            author_display_name: Some(name),
            author_photo_ref: Some(photo),
            description: Some(draft.description.trim().to_string()),
            photo_ref: Some(draft.photo_ref.clone()),
            location_label: draft
                .location_label
                .clone()
                .filter(|label| !label.trim().is_empty()),
            likes: Some(Vec::new()),
            created_at: None,
        };

        let id = self
            .gateway
            .insert(&Self::posts(), &document, fields::CREATED_AT)
            .await?;

        tracing::info!(author = %author, post_id = %id, "Post published");
        Ok(PostId::new(id))
    }

    /// Posts created by `author`, newest first.
    pub async fn posts_by_author(&self, author: &Identity) -> Result<Vec<Post>> {
        let docs: Vec<PostDocument> = self
            .gateway
            .query(&Self::posts(), &Query::all().eq(fields::AUTHOR, author.as_str()))
            .await?;

        let mut posts = map_documents(docs);
        posts.sort_by(feed_order);
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDb;
    use crate::error::AppError;
    use crate::models::Profile;

    fn draft(description: &str) -> PostDraft {
        PostDraft {
            description: description.to_string(),
            photo_ref: "file:///run.jpg".to_string(),
            location_label: Some("Campinas, SP".to_string()),
        }
    }

    #[tokio::test]
    async fn test_publish_denormalizes_author() {
        let db = Arc::new(InMemoryDb::new());
        ProfileService::new(db.clone())
            .create(&Profile {
                email: "ana@x.com".to_string(),
                name: Some("Ana".to_string()),
                photo_ref: Some("file:///ana.jpg".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let service = PostService::new(db.clone());
        let ana = Identity::new("ana@x.com");

        let id = service.publish(&ana, &draft("  5k run ")).await.unwrap();

        let posts = service.posts_by_author(&ana).await.unwrap();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, id);
        assert_eq!(post.description, "5k run");
        assert_eq!(post.author_display_name.as_deref(), Some("Ana"));
        assert_eq!(post.author_photo_ref.as_deref(), Some("file:///ana.jpg"));
        assert!(post.likes.is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_profile() {
        let db = Arc::new(InMemoryDb::new());
        let service = PostService::new(db.clone());
        let bo = Identity::new("bo@x.com");

        service.publish(&bo, &draft("Swim")).await.unwrap();

        let stored = service.posts_by_author(&bo).await.unwrap();
        assert_eq!(stored[0].author_display_name, None);
        assert_eq!(stored[0].display_name(), "bo@x.com");
    }

    #[tokio::test]
    async fn test_publish_rejects_incomplete_draft() {
        let db = Arc::new(InMemoryDb::new());
        let service = PostService::new(db.clone());
        let ana = Identity::new("ana@x.com");

        let blank = service.publish(&ana, &draft("   ")).await;
        assert!(matches!(blank, Err(AppError::Validation(ref m)) if m.contains("description")));

        let no_photo = service
            .publish(
                &ana,
                &PostDraft {
                    description: "Yoga".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(no_photo, Err(AppError::Validation(ref m)) if m.contains("photo")));
        assert_eq!(db.write_count(), 0);
    }

    #[tokio::test]
    async fn test_posts_by_author_newest_first() {
        let db = Arc::new(InMemoryDb::new());
        let service = PostService::new(db.clone());
        let ana = Identity::new("ana@x.com");

        let first = service.publish(&ana, &draft("one")).await.unwrap();
        let second = service.publish(&ana, &draft("two")).await.unwrap();
        service
            .publish(&Identity::new("bo@x.com"), &draft("other"))
            .await
            .unwrap();

        let ids: Vec<PostId> = service
            .posts_by_author(&ana)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }
}
