//! Server-list registry daemon: game servers register over HTTP, refresh
//! their lease periodically, and clients fetch the live list.

pub mod api;
pub mod config;
pub mod registry;
pub mod registry_manager;
pub mod scheduler;
