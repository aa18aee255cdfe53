//! Fire-department incident dispatch: intake, persistence, and realtime
//! fan-out for the station dashboards.
//!
//! ```text
//!  HTTP POST /create-incident ─┐
//!                              ├─> intake ──> db (callers / incidents /
//!  WS  new-incident frame ─────┘              response_logs)
//!                              │
//!                              └─> hub ──> every connected dashboard
//! ```
//!
//! The HTTP surface lives in [`api`], the socket endpoint in [`ws`], and
//! both funnel submissions through [`intake::record_incident`] so the
//! caller-resolve / insert / log sequence exists exactly once. [`hub`]
//! owns the connection registry the broadcasts go through, and
//! [`consumer`] is the dashboard-side model of the incoming-call board.

pub mod api;
pub mod consumer;
pub mod db;
pub mod hub;
pub mod intake;
pub mod models;
pub mod server;
pub mod ws;
