//! Operator notifications: message composition and dispatch on qualifying
//! status transitions, behind injected email/SMS sender capabilities.

pub mod dispatcher;
pub mod senders;

pub use dispatcher::NotificationDispatcher;
