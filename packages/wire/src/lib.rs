//! Wire contract for job-completion accounting on Redis.
//!
//! Everything in this crate is visible on the wire and therefore frozen:
//! the 28-slot field catalogue and its labels, the key layout, the verb
//! names, and the two time renderings selected by the `_tmf` flag. The
//! store module and the controller-side plugin both depend on this crate
//! and on nothing else of each other.
//!
//! Changing a slot label, a slot ordinal, or a key shape is a breaking
//! change to deployed data; bump [`SLURM_REDIS_ABI`] when you do.

pub mod fields;
pub mod keys;
pub mod time;

pub use fields::{FieldIndex, CRITERIA_NNODES_MAX, CRITERIA_NNODES_MIN, FIELD_LABELS, MAX_FIELDS, SLURM_REDIS_ABI};
pub use keys::{criteria_key, index_key, job_key, match_key, query_key, CriteriaDim, CMD_FETCH, CMD_INDEX, CMD_MATCH};
pub use time::{day_bucket, format_time, parse_time, TimeError, TimeFormat, SECONDS_PER_DAY};
