pub mod attendee;
pub mod booking;
pub mod booking_reference;
pub mod event_type;
pub mod notification_log;
pub mod payment;
pub mod reminder_log;
pub mod user;

pub use attendee::AttendeeRepository;
pub use booking::BookingRepository;
pub use booking_reference::BookingReferenceRepository;
pub use event_type::EventTypeRepository;
pub use notification_log::NotificationLogRepository;
pub use payment::PaymentRepository;
pub use reminder_log::ReminderLogRepository;
pub use user::UserRepository;
