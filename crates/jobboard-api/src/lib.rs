//! HTTP API server for the job board.
//!
//! A thin façade over the scheduler services: allocation, job creation,
//! delivery, deletion and the latest reconciliation report.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
