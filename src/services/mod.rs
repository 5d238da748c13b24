pub mod points;
pub mod refresh;
pub mod scheduler;

pub use points::{GroupCompletion, completion_by_group};
pub use refresh::{RefreshOutcome, RefreshService};
pub use scheduler::RefreshScheduler;
