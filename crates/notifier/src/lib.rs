//! Relay from bus events to administrator chat notifications.
//!
//! A blocking [`subscriber`] thread decodes and classifies bus messages, the
//! [`formatter`] renders them, the [`bridge`] hands them to the async runtime
//! without blocking, and the [`fanout`] sender delivers each one to every
//! administrator concurrently through a [`sender::ChatSender`].

pub mod bridge;
pub mod fanout;
pub mod formatter;
pub mod sender;
pub mod subscriber;
