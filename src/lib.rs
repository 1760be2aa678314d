//! Client-side session lifecycle for the fellowship site.
//!
//! DESIGN
//! ======
//! A `SessionController` owns the single source of truth for "who is signed
//! in and what is their profile". It reconciles two racing inputs at startup,
//! the provider's auth change stream and a one-shot session probe, and guards
//! every asynchronous write with a generation ticket so superseded results
//! are discarded instead of overwriting newer state.
//!
//! Module map:
//! - `types`: session, profile, controller state, auth events
//! - `provider`: `AuthProvider` / `ProfileStore` seams
//! - `guard`: generation counter and tickets
//! - `store`: guarded state writes and the public operations
//! - `sync`: event listener and startup probe tasks
//! - `controller`: lifecycle wrapper handed to pages
//! - `address`: callback fragment handling
//! - `rest`: GoTrue/PostgREST adapter
//! - `config`: environment configuration

pub mod address;
pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod provider;
pub mod rest;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::AuthConfig;
pub use controller::SessionController;
pub use error::{AuthError, ErrorCode};
pub use store::SessionStore;
pub use sync::SyncOptions;
pub use types::{AuthEvent, AuthEventKind, AuthStatus, ControllerState, OAuthProvider, Profile, Session, SignOutScope};
