//! Human-review requests and their write-once resolutions.

pub mod registry;
pub mod types;

pub use registry::{ReviewError, ReviewRegistry};
pub use types::{Resolution, ResolutionAction, ReviewDecision, ReviewRequest};
