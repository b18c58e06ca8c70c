pub mod assignment;
pub mod bookings;
pub mod dispatcher;
pub mod event;
pub mod gateways;
pub mod init;
pub mod integrations;
pub mod notifications;
pub mod payments;
pub mod reminders;
pub mod templates;
