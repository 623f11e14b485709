//! Offline-first sync client for course, teacher and study material data.

pub mod auth;
pub mod cache;
pub mod commands;
pub mod config;
pub mod connectivity;
pub mod domain;
pub mod logging;
pub mod realtime;
pub mod remote;
pub mod sync;
