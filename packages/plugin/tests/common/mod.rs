//! Shared end-to-end test infrastructure.

pub mod harness;

use std::sync::Arc;
use std::time::Duration;

use jobcomp_plugin::{IdentityResolver, JobRecord, JobState, RecordCodec, TimeLimit};
use jobcomp_wire::SLURM_REDIS_ABI;

pub use harness::StoreHarness;

/// Deterministic name table standing in for the host name service.
pub struct TableResolver;

impl IdentityResolver for TableResolver {
    fn user_name(&self, uid: u32) -> Option<String> {
        (uid == 1000).then(|| "mwilson".to_string())
    }
    fn group_name(&self, gid: u32) -> Option<String> {
        (gid == 1000).then(|| "staff".to_string())
    }
}

pub fn codec() -> RecordCodec {
    RecordCodec::new(
        SLURM_REDIS_ABI,
        64,
        Duration::from_secs(60),
        Arc::new(TableResolver),
    )
}

/// A plausible completed job spanning the given window.
pub fn job(job_id: u32, start_time: i64, end_time: i64) -> JobRecord {
    let mut job = JobRecord::new(job_id, start_time, end_time);
    job.partition = "batch".into();
    job.uid = 1000;
    job.gid = 1000;
    job.node_count = 2;
    job.cpu_count = 64;
    job.node_list = "node[01-02]".into();
    job.job_name = "relion".into();
    job.state = JobState::Completed;
    job.time_limit = TimeLimit::Minutes(120);
    job
}
