pub mod backend;
pub mod jobs;
pub mod queue;
