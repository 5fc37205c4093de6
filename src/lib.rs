//! # mirrortrade
//!
//! Follows the positions of publicly tracked trading models and mirrors
//! their changes onto Bitget USDT-M futures, scaled down and protected.
//!
//! ```text
//!  nof1 API ──fetch──► Snapshot ──diff──► TradeIntent[] ──filter──► Dispatcher
//!                         │                    │                    ├─► demo router ─┐
//!                         ▼                    ▼                    └─► live router ─┤
//!                    last.json           change notice                               ▼
//!                                                                         execution reports
//! ```

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exchange;
pub mod models;
pub mod notify;
pub mod report;
pub mod routes;
pub mod settings;
pub mod source;
pub mod state;
pub mod store;
