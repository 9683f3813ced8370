//! Key layout and verb names.
//!
//! All keys live under a deployment-chosen prefix (default `job`). The
//! shapes here are the complete namespace: job hashes, per-day index sets,
//! per-query criteria keys, and per-query match sets.

use std::fmt::Display;

/// Index a job into its end-day bucket: `INDEX <prefix> <jobid>`.
pub const CMD_INDEX: &str = "SLURMJC.INDEX";
/// Build a match set for submitted criteria: `MATCH <prefix> <uuid>`.
pub const CMD_MATCH: &str = "SLURMJC.MATCH";
/// Drain a match set in bounded chunks: `FETCH <prefix> <uuid> <max>`.
pub const CMD_FETCH: &str = "SLURMJC.FETCH";

/// The set-valued criteria dimensions of a query. Each occupies its own
/// set key next to the criteria hash; a missing key means the dimension
/// is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaDim {
    Gid,
    Job,
    JobName,
    Partition,
    State,
    Uid,
}

impl CriteriaDim {
    pub const ALL: [CriteriaDim; 6] = [
        CriteriaDim::Gid,
        CriteriaDim::Job,
        CriteriaDim::JobName,
        CriteriaDim::Partition,
        CriteriaDim::State,
        CriteriaDim::Uid,
    ];

    /// Key suffix for this dimension.
    pub const fn suffix(self) -> &'static str {
        match self {
            CriteriaDim::Gid => "gid",
            CriteriaDim::Job => "job",
            CriteriaDim::JobName => "jnm",
            CriteriaDim::Partition => "prt",
            CriteriaDim::State => "stt",
            CriteriaDim::Uid => "uid",
        }
    }
}

/// `P:<jobid>`, the job hash.
pub fn job_key(prefix: &str, jobid: impl Display) -> String {
    format!("{prefix}:{jobid}")
}

/// `P:idx:end:<day>`, the set of jobids ending in that UTC day.
pub fn index_key(prefix: &str, day: i64) -> String {
    format!("{prefix}:idx:end:{day}")
}

/// `P:qry:<uuid>`, the criteria scalar hash.
pub fn query_key(prefix: &str, uuid: &str) -> String {
    format!("{prefix}:qry:{uuid}")
}

/// `P:qry:<uuid>:<dim>`, one set-valued criteria dimension.
pub fn criteria_key(prefix: &str, uuid: &str, dim: CriteriaDim) -> String {
    format!("{prefix}:qry:{uuid}:{}", dim.suffix())
}

/// `P:mat:<uuid>`, the sorted match set drained by `FETCH`.
pub fn match_key(prefix: &str, uuid: &str) -> String {
    format!("{prefix}:mat:{uuid}")
}
