pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod optimistic;
pub mod resources;
pub mod session;

pub use client::{ApiClient, AuthState};
pub use error::{ClientError, Result};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
