// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! fitfeed: client core of a social workout feed
//!
//! This crate keeps a live, chronologically ordered feed of workout posts in
//! sync with a remote document collection, applies likes and deletes
//! optimistically, and scopes all feed state to the signed-in identity.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::CollectionGateway;
use services::{ChatService, PostService, ProfileService, SessionBoundary};

/// Shared application state.
pub struct AppState<G> {
    pub config: Config,
    pub db: Arc<G>,
    pub posts: PostService<G>,
    pub profiles: ProfileService<G>,
    pub chats: ChatService<G>,
}

impl<G: CollectionGateway> AppState<G> {
    pub fn new(config: Config, db: Arc<G>) -> Self {
        Self {
            posts: PostService::new(db.clone()),
            profiles: ProfileService::new(db.clone()),
            chats: ChatService::new(db.clone()),
            config,
            db,
        }
    }

    /// A signed-out session boundary over this state's gateway.
    pub fn session(&self) -> SessionBoundary<G> {
        SessionBoundary::new(self.db.clone(), self.config.feed_page_limit)
    }
}
