//! Bulk invite orchestration: gather members from source communities, drop
//! the ones already handled, and enroll the rest into a destination one at a
//! time with randomized pacing.

pub mod bridge;
pub mod community;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod pacing;
pub mod platform;

pub use community::CommunityRef;
pub use config::RunConfig;
pub use orchestrator::{Orchestrator, RunHandle, RunMode};
