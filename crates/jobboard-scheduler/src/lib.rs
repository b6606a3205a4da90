//! Job board services.
//!
//! Creates jobs, allocates them to workers with atomic claims, delivers
//! claimed jobs with per-job capability tokens and periodically reclaims
//! jobs held by dead workers.

pub mod allocator;
pub mod creator;
pub mod delivery;
pub mod reconciler;
pub mod runner;

pub use allocator::{Allocation, AllocationRequest, Allocator};
pub use creator::JobCreator;
pub use delivery::DeliveryService;
pub use reconciler::{ReconcileReport, Reconciler, SiteReport, WorkerStats};
pub use runner::ReconcileLoop;
