//! Store-side half of the job-completion accounting engine.
//!
//! Three verbs run inside the key-value store's command thread:
//!
//! - `INDEX <prefix> <jobid>` places a finished job into the day bucket of
//!   its end time, so range queries never scan the whole keyspace.
//! - `MATCH <prefix> <uuid>` loads the criteria bundle submitted under
//!   that uuid, walks the relevant day buckets (or an explicit job list),
//!   and builds a sorted match set scored by jobid.
//! - `FETCH <prefix> <uuid> <max>` destructively drains the match set in
//!   bounded chunks, returning full slot vectors in ascending jobid order.
//!
//! The store itself is a collaborator, not part of this crate: every
//! service the verbs need from it is captured by the [`Store`] trait, and
//! [`dispatch`] is the single entry point a hosting store calls. Verbs
//! never block, never retain store references past return, and reply
//! exactly once on every path.

pub mod error;
pub mod query;
pub mod reply;
pub mod sscan;
pub mod store;
pub mod verbs;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::VerbError;
pub use query::{JobQuery, MatchOutcome};
pub use reply::Reply;
pub use store::{KeyType, Store};
pub use verbs::{dispatch, ModuleConfig};
