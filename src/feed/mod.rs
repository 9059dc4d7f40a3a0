// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local feed state: the reconciliation engine and its per-session owner.

pub mod engine;
pub mod store;

pub use engine::{reconcile, FeedEngine, PendingMutation, Reconciled};
pub use store::{FeedStore, FeedView};
