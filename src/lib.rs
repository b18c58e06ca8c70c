use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod i18n;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_support;

use config::Config;
use services::{
    bookings::BookingService, payments::PaymentConfirmationHandler, reminders::ReminderScheduler,
};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentConfirmationHandler>,
    pub reminders: Arc<ReminderScheduler>,
}
