//! SeaORM entities for the three persisted record kinds.

pub mod client;
pub mod session;
pub mod user;

pub use client::ClientType;
pub use session::{Scope, TokenKind};
