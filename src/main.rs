// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! fitfeed feed watcher
//!
//! Signs in with the configured account, follows the live feed and logs
//! every change until interrupted.

use fitfeed::{
    config::Config,
    db::FirestoreDb,
    feed::FeedView,
    services::{CredentialIssuer, Credentials, FirebaseAuth},
    time_utils::format_utc_rfc3339,
    AppState,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(project = %config.firebase_project_id, "Starting fitfeed watcher");

    let (Some(email), Some(password)) = (
        config.watcher_email.clone(),
        config.watcher_password.clone(),
    ) else {
        return Err("FITFEED_EMAIL and FITFEED_PASSWORD must be set".into());
    };

    let db = FirestoreDb::new(&config.firebase_project_id, config.feed_poll_interval).await?;
    let state = AppState::new(config.clone(), Arc::new(db));
    let auth = FirebaseAuth::new(&config);

    let mut identities = auth.identity();
    auth.sign_in(&Credentials::new(email, password)).await?;

    let mut session = state.session();
    let mut views: Option<watch::Receiver<Arc<FeedView>>> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            changed = identities.changed() => {
                if changed.is_err() {
                    break;
                }
                let identity = identities.borrow_and_update().clone();
                if let Err(e) = session.on_identity_changed(identity) {
                    tracing::error!(error = %e, "Could not open feed");
                }
                views = session.feed().map(|feed| feed.watch());
                if let Some(feed) = session.feed() {
                    // The first snapshot lands before the receiver exists
                    log_view(&feed.view());
                }
            }
            Some(view) = next_view(&mut views) => log_view(&view),
        }
    }

    auth.sign_out();
    session.teardown();
    tracing::info!("Watcher stopped");
    Ok(())
}

/// Next published view, or never if no feed is open.
async fn next_view(views: &mut Option<watch::Receiver<Arc<FeedView>>>) -> Option<Arc<FeedView>> {
    match views {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

fn log_view(view: &FeedView) {
    match view.posts.first() {
        Some(newest) => tracing::info!(
            posts = view.posts.len(),
            pending = view.pending.len(),
            newest_id = %newest.id,
            newest_author = newest.display_name(),
            newest_likes = newest.like_count(),
            newest_at = %format_utc_rfc3339(newest.created_at),
            "Feed updated"
        ),
        None => tracing::info!(pending = view.pending.len(), "Feed is empty"),
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitfeed=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
