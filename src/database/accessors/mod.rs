//! Typed operations the web layer calls, implemented on [`DatabaseManager`]
//!
//! Each accessor stamps server-side fields, delegates to whichever store the
//! manager selected at startup and logs a confirmation line.
//!
//! [`DatabaseManager`]: crate::database::DatabaseManager

mod growing;
mod recommendations;
mod users;
