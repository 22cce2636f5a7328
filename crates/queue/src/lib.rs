//! `renderq-queue` -- the single-worker render queue.
//!
//! Producers submit jobs with [`RenderQueue::add`]; one long-lived
//! processor task drains them strictly one at a time, streaming progress
//! to the requester through a [`Messenger`] and delivering the finished
//! images. See [`queue`] for admission control and [`processor`] for the
//! job lifecycle.

pub mod config;
pub mod error;
pub mod job;
pub mod messenger;
pub mod processor;
pub mod queue;

mod context;
mod pipeline;
mod runner;
mod status;
mod upload;

pub use config::QueueConfig;
pub use error::{JobError, QueueError};
pub use job::{InputFile, JobSnapshot, JobState, JobTicket};
pub use messenger::{Messenger, MessengerError, NotificationRef, UploadItem};
pub use queue::RenderQueue;
