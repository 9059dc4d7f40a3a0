// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod chat;
pub mod interaction;
pub mod location;
pub mod posts;
pub mod profile;
pub mod session;

pub use auth::{register, CredentialIssuer, Credentials, FirebaseAuth, Registration};
pub use chat::ChatService;
pub use interaction::{ActionKind, DeleteOutcome, InteractionCoordinator};
pub use location::{current_location_label, Address, LocationProvider};
pub use posts::PostService;
pub use profile::ProfileService;
pub use session::{SessionBoundary, SessionState};
