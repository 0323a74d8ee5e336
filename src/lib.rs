//! Terminal chat widget kept in sync with a live-query message store.

pub mod app;
pub mod chat;
pub mod config;
pub mod identity;
pub mod input;
pub mod store;
pub mod ui;
