pub mod auth;
pub mod categories;
pub mod health;
pub mod jobs;
pub mod recurring;
pub mod reminders;
pub mod subscriptions;
pub mod tasks;
