// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chat;
pub mod post;
pub mod profile;

pub use chat::{Chat, ChatMessage};
pub use post::{feed_order, Identity, Post, PostDocument, PostDraft, PostId};
pub use profile::{Profile, ProfileUpdate};
