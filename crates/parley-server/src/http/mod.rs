//! HTTP endpoints: account management and the authenticated feed.

pub mod auth;
pub mod extract;
pub mod feed;
