//! Controller-side half of the job-completion accounting engine.
//!
//! When a job finishes, the controller hands its record to
//! [`JobcompRedis::log_record`]: the codec projects it onto the 28-slot
//! wire vector, and one pipelined transaction writes the job hash and
//! indexes it into its end-day bucket. Historical queries go through
//! [`JobcompRedis::get_jobs`]: the criteria bundle is submitted under a
//! fresh UUID, the store-side matcher builds a sorted match set, and the
//! client drains it in bounded chunks, decoding each slot vector back
//! into a [`CompletedJob`].
//!
//! The client owns exactly one lazily connected Redis connection and
//! never spawns background work; everything here runs on the caller's
//! thread under the controller's existing locking.

pub mod client;
pub mod codec;
pub mod config;
pub mod identity;
pub mod link;
pub mod record;
pub mod ttl_cache;

pub use client::{ClientError, JobcompRedis, QueryConditions};
pub use codec::{CodecError, FieldVector, RecordCodec};
pub use config::Config;
pub use identity::{IdentityResolver, SystemIdentityResolver};
pub use record::{CompletedJob, ExitCode, JobRecord, JobState, TimeLimit};
