pub mod admin;
pub mod ask;
pub mod auth;
pub mod document;
pub mod project;
pub mod source;
pub mod superadmin;
pub mod task;
