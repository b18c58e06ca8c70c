//! Database models, one file per table family.
//! Re-exported at `crate::db::models` so callers can `use crate::db::models::*;`.

pub mod attendee;
pub mod booking;
pub mod booking_reference;
pub mod event_type;
pub mod notification_history;
pub mod payment;
pub mod reminder_log;
pub mod user;

pub use self::attendee::*;
pub use self::booking::*;
pub use self::booking_reference::*;
pub use self::event_type::*;
pub use self::notification_history::*;
pub use self::payment::*;
pub use self::reminder_log::*;
pub use self::user::*;
