// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Direct messages between two users.
//!
//! A chat is keyed by its sorted member pair, so both sides of a
//! conversation find the same document.

use std::sync::Arc;

use crate::db::{
    collections, fields, CollectionGateway, CollectionRef, Direction, Query, Subscription,
};
use crate::error::{AppError, Result};
use crate::models::{Chat, ChatMessage, Identity};
use crate::services::ProfileService;

/// Key shared by both members' view of a chat.
pub fn chat_key(a: &Identity, b: &Identity) -> String {
    let (first, second) = sorted_pair(a, b);
    format!("{}_{}", first, second)
}

fn sorted_pair<'a>(a: &'a Identity, b: &'a Identity) -> (&'a Identity, &'a Identity) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

pub struct ChatService<G> {
    gateway: Arc<G>,
    profiles: ProfileService<G>,
}

impl<G: CollectionGateway> ChatService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            profiles: ProfileService::new(gateway.clone()),
            gateway,
        }
    }

    fn chats() -> CollectionRef {
        CollectionRef::root(collections::CHATS)
    }

    fn messages(chat_id: &str) -> CollectionRef {
        CollectionRef::child(collections::CHATS, chat_id, collections::MESSAGES)
    }

    /// Open (or reuse) the chat between `me` and `recipient` and send
    /// `text` to it. Returns the chat id.
    pub async fn start_conversation(
        &self,
        me: &Identity,
        recipient: &str,
        text: &str,
    ) -> Result<String> {
        if recipient.trim().is_empty() || text.trim().is_empty() {
            return Err(AppError::Validation(
                "Enter the recipient's email and a message.".to_string(),
            ));
        }

        let other = Identity::new(recipient);
        if &other == me {
            return Err(AppError::Validation(
                "You cannot start a conversation with yourself.".to_string(),
            ));
        }

        if self.profiles.lookup(&other).await?.is_none() {
            return Err(AppError::NotFound("User not found.".to_string()));
        }

        let key = chat_key(me, &other);
        let mut existing: Vec<Chat> = self
            .gateway
            .query(&Self::chats(), &Query::all().eq(fields::CHAT_KEY, &key).limit(1))
            .await?;

        let chat_id = match existing.pop().and_then(|chat| chat.id) {
            Some(id) => {
                tracing::debug!(chat_key = %key, chat_id = %id, "Reusing existing chat");
                id
            }
            None => {
                let (first, second) = sorted_pair(me, &other);
                let chat = Chat {
                    id: None,
                    members: vec![first.to_string(), second.to_string()],
                    chat_key: key.clone(),
                    created_at: None,
                };
                let id = self
                    .gateway
                    .insert(&Self::chats(), &chat, fields::CREATED_AT)
                    .await?;
                tracing::info!(chat_key = %key, chat_id = %id, "Chat created");
                id
            }
        };

        self.send_message(&chat_id, me, text).await?;
        Ok(chat_id)
    }

    /// Append a message to a chat. Returns the message id.
    pub async fn send_message(&self, chat_id: &str, from: &Identity, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message is empty.".to_string()));
        }

        let message = ChatMessage {
            id: None,
            from: from.to_string(),
            text: text.to_string(),
            timestamp: None,
        };
        let id = self
            .gateway
            .insert(&Self::messages(chat_id), &message, fields::TIMESTAMP)
            .await?;

        tracing::debug!(chat_id, message_id = %id, "Message sent");
        Ok(id)
    }

    /// Messages of a chat, oldest first.
    pub async fn history(&self, chat_id: &str) -> Result<Vec<ChatMessage>> {
        self.gateway
            .query(
                &Self::messages(chat_id),
                &Query::all().order_by(fields::TIMESTAMP, Direction::Ascending),
            )
            .await
    }

    /// Follow the chats `member` belongs to.
    pub fn chats_for(
        &self,
        member: &Identity,
        on_change: impl Fn(Vec<Chat>) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        self.gateway.subscribe(
            Self::chats(),
            Query::all().array_contains(fields::MEMBERS, member.as_str()),
            Arc::new(on_change),
        )
    }
}
