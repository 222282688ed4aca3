//! Herald HTTP API: operator routes over the notification queue and the
//! tick worker that drives processing passes and reminders.

pub mod middleware;
pub mod routes;
pub mod state;
pub mod worker;
