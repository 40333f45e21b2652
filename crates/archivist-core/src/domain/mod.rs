//! Domain model: jobs, lanes, observations, entry bookkeeping, retry policy.
//!
//! Everything here is pure data and pure functions; no I/O.

pub mod decision;
pub mod errors;
pub mod ids;
pub mod job;
pub mod lane;
pub mod outcome;
pub mod record;
pub mod retry;
pub mod state;

pub use decision::{Decider, Decision, DecisionRecord, DefaultDecider};
pub use errors::{CrawlError, ErrorKind, QueueError, StoreError};
pub use ids::EntryId;
pub use job::{DiscussionId, FollowUp, Job, ReplyId};
pub use lane::Lane;
pub use outcome::{DiscussionPage, DispatchOutcome, ListedDiscussion, ReplyPage};
pub use record::EntryRecord;
pub use retry::{Disposition, RetryPolicy, classify, parse_retry_after};
pub use state::EntryState;
