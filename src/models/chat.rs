// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Direct-message chat models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two-member conversation stored in the `chats` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    /// Both member identities, sorted
    pub members: Vec<String>,
    /// `"{first}_{second}"` of the sorted members, unique per pair
    pub chat_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// The member that is not `me`.
    pub fn other_member(&self, me: &str) -> Option<&str> {
        self.members
            .iter()
            .map(String::as_str)
            .find(|m| !m.eq_ignore_ascii_case(me))
    }
}

/// Message in a chat's `messages` subcollection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    pub from: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}
