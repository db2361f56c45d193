//! Database repositories for rooms, participants, and webhook logs.
//!
//! Every query is generic over [`sqlx::PgExecutor`], so the same operations
//! compose inside a transaction (`&mut *tx`) or run directly on the pool.
//! Multi-row updates within one room are serialised by first locking the
//! room row via [`rooms::RoomsRepository::get_for_update`].

pub mod participants;
pub mod rooms;
pub mod webhook_logs;

pub use participants::{ParticipantsRepository, UidFilter};
pub use rooms::RoomsRepository;
pub use webhook_logs::WebhookLogsRepository;
