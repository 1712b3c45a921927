mod context;
mod job_record;
mod job_status;
mod job_type;
mod traits;

pub use context::JobContext;
pub use job_record::{JobFailure, JobRecord};
pub use job_status::JobStatus;
pub use job_type::JobType;
pub use traits::Job;
