//! Link planning and atomic execution.

pub mod executor;
pub mod plan;

pub use executor::{execute_plan, preview_plan, ExecutorConfig};
pub use plan::{plan_links, GroupPlan, LinkPlan, PlannedLink, RejectedTarget};
