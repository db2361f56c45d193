//! HTTP handlers: thin adapters between the router and the service.
//!
//! Handlers validate inputs, call the service, and map errors to localised
//! `{code, message}` bodies. Business rules never live here.

pub mod health;
pub mod rooms;
pub mod webhook;
