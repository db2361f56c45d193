//! Service layer: the state machine and its event distribution.

pub mod event_publisher;
pub mod events;
pub mod invite_timers;
pub mod room_service;

pub use event_publisher::EventPublisher;
pub use room_service::RoomService;
