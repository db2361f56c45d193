//! Control plane for an SFU-backed audio/video conferencing service.
//!
//! The controller does not transport media. It owns the lifecycle of rooms
//! and participants: who may join which room, what state each party is in,
//! when an invitation expires, and which business systems get told about
//! it. The media SFU, the database, and the Redis coordination store are
//! external collaborators.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod i18n;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod redis;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod sfu;
pub mod tasks;
