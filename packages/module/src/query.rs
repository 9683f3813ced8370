//! The query object: criteria deserialization and the per-job predicate.

use jobcomp_wire::{
    criteria_key, job_key, parse_time, query_key, CriteriaDim, FieldIndex, TimeFormat,
    CRITERIA_NNODES_MAX, CRITERIA_NNODES_MIN, SECONDS_PER_DAY,
};
use tracing::warn;

use crate::error::VerbError;
use crate::store::{KeyType, Store};

/// Outcome of testing one job against the criteria.
///
/// A missing or malformed job never aborts a scan: expiry can race the
/// matcher, and a partially-expired corpus must not block a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Pass,
    Fail,
    /// The job key vanished between indexing and matching.
    Gone,
}

/// Deserialized criteria of one `P:qry:<uuid>` family.
///
/// Scalars come from the criteria hash; each optional set key narrows one
/// dimension, and an absent set leaves that dimension unconstrained.
#[derive(Debug)]
pub struct JobQuery {
    prefix: String,
    abi: String,
    tmf: TimeFormat,
    start_time: i64,
    end_time: i64,
    /// ISO literals cached for lexicographic compare when tmf = 1.
    start_literal: Option<String>,
    end_literal: Option<String>,
    nnodes_min: u32,
    nnodes_max: u32,
    gids: Vec<String>,
    jobs: Vec<u32>,
    jobnames: Vec<String>,
    partitions: Vec<String>,
    states: Vec<String>,
    uids: Vec<String>,
}

impl JobQuery {
    /// Load the criteria stored under `uuid`. `Ok(None)` means the
    /// criteria hash is gone (expired or never submitted), which the
    /// matcher reports as the typed null.
    pub fn load(store: &impl Store, prefix: &str, uuid: &str) -> Result<Option<JobQuery>, VerbError> {
        let qkey = query_key(prefix, uuid);
        match store.key_type(&qkey) {
            KeyType::Missing => return Ok(None),
            KeyType::Hash => {}
            _ => return Err(VerbError::WrongType),
        }

        let scalars = store.hash_get(
            &qkey,
            &[
                FieldIndex::Abi.label(),
                FieldIndex::TimeFormat.label(),
                FieldIndex::Start.label(),
                FieldIndex::End.label(),
                CRITERIA_NNODES_MIN,
                CRITERIA_NNODES_MAX,
            ],
        )?;
        if scalars.iter().any(Option::is_none) {
            return Err(VerbError::MissingField);
        }
        let scalar = |i: usize| scalars[i].as_deref().unwrap_or_default();

        let abi = scalar(0).to_string();
        let tmf_flag: i64 = scalar(1).parse().map_err(|_| VerbError::BadTimeFormat)?;
        let tmf = TimeFormat::from_flag(tmf_flag);

        let start_time = parse_time(tmf, scalar(2)).map_err(|_| VerbError::BadTime { which: "start" })?;
        let end_time = parse_time(tmf, scalar(3)).map_err(|_| VerbError::BadTime { which: "end" })?;
        let (start_literal, end_literal) = match tmf {
            TimeFormat::Iso8601 => (Some(scalar(2).to_string()), Some(scalar(3).to_string())),
            TimeFormat::Epoch => (None, None),
        };

        let nnodes_min: u32 = scalar(4).parse().map_err(|_| VerbError::BadValue("node count bound"))?;
        let nnodes_max: u32 = scalar(5).parse().map_err(|_| VerbError::BadValue("node count bound"))?;

        let set = |dim: CriteriaDim| store.smembers(&criteria_key(prefix, uuid, dim));
        let jobs = set(CriteriaDim::Job)?
            .iter()
            .map(|s| s.parse::<u32>().map_err(|_| VerbError::BadValue("job id")))
            .collect::<Result<Vec<u32>, _>>()?;

        Ok(Some(JobQuery {
            prefix: prefix.to_string(),
            abi,
            tmf,
            start_time,
            end_time,
            start_literal,
            end_literal,
            nnodes_min,
            nnodes_max,
            gids: set(CriteriaDim::Gid)?,
            jobs,
            jobnames: set(CriteriaDim::JobName)?,
            partitions: set(CriteriaDim::Partition)?,
            states: set(CriteriaDim::State)?,
            uids: set(CriteriaDim::Uid)?,
        }))
    }

    /// Explicitly enumerated job ids, in submission order. Non-empty means
    /// the matcher skips the day-bucket walk entirely.
    pub fn jobs(&self) -> &[u32] {
        &self.jobs
    }

    pub fn start_day(&self) -> i64 {
        self.start_time.div_euclid(SECONDS_PER_DAY)
    }

    pub fn end_day(&self) -> i64 {
        self.end_time.div_euclid(SECONDS_PER_DAY)
    }

    /// Test one job against every predicate, cheapest discriminators
    /// first: time, gid, nnodes, jobname, partition, state, uid.
    pub fn matches(&self, store: &impl Store, jobid: u32) -> Result<MatchOutcome, VerbError> {
        let jkey = job_key(&self.prefix, jobid);
        match store.key_type(&jkey) {
            KeyType::Missing => return Ok(MatchOutcome::Gone),
            KeyType::Hash => {}
            _ => return Err(VerbError::WrongType),
        }

        let slots = store.hash_get(
            &jkey,
            &[
                FieldIndex::Abi.label(),
                FieldIndex::TimeFormat.label(),
                FieldIndex::Start.label(),
                FieldIndex::End.label(),
                FieldIndex::Gid.label(),
                FieldIndex::NNodes.label(),
                FieldIndex::JobName.label(),
                FieldIndex::Partition.label(),
                FieldIndex::State.label(),
                FieldIndex::Uid.label(),
            ],
        )?;
        let slot = |i: usize| slots[i].as_deref();

        // Records from another catalogue generation never match; refusing
        // them here keeps a mixed-ABI corpus queryable.
        match slot(0) {
            Some(abi) if abi == self.abi => {}
            Some(abi) => {
                warn!(job = jobid, job_abi = abi, query_abi = %self.abi, "abi mismatch, job skipped");
                return Ok(MatchOutcome::Fail);
            }
            None => return Ok(MatchOutcome::Fail),
        }
        match slot(1).and_then(|s| s.parse::<i64>().ok()) {
            Some(flag) if TimeFormat::from_flag(flag) == self.tmf => {}
            _ => return Ok(MatchOutcome::Fail),
        }

        if !self.time_in_range(slot(2), slot(3)) {
            return Ok(MatchOutcome::Fail);
        }
        if !member_of(&self.gids, slot(4)) {
            return Ok(MatchOutcome::Fail);
        }
        if !self.nnodes_in_range(slot(5)) {
            return Ok(MatchOutcome::Fail);
        }
        if !member_of(&self.jobnames, slot(6)) {
            return Ok(MatchOutcome::Fail);
        }
        if !member_of(&self.partitions, slot(7)) {
            return Ok(MatchOutcome::Fail);
        }
        if !member_of(&self.states, slot(8)) {
            return Ok(MatchOutcome::Fail);
        }
        if !member_of(&self.uids, slot(9)) {
            return Ok(MatchOutcome::Fail);
        }
        Ok(MatchOutcome::Pass)
    }

    /// `query.start <= job.start && job.end <= query.end`. Under the ISO
    /// rendering the cached literals compare lexicographically; otherwise
    /// both sides parse as signed decimal.
    fn time_in_range(&self, job_start: Option<&str>, job_end: Option<&str>) -> bool {
        let (Some(job_start), Some(job_end)) = (job_start, job_end) else {
            return false;
        };
        match self.tmf {
            TimeFormat::Iso8601 => {
                let (Some(start_lit), Some(end_lit)) = (&self.start_literal, &self.end_literal) else {
                    return false;
                };
                start_lit.as_str() <= job_start && job_end <= end_lit.as_str()
            }
            TimeFormat::Epoch => {
                let (Ok(start), Ok(end)) = (job_start.parse::<i64>(), job_end.parse::<i64>()) else {
                    return false;
                };
                self.start_time <= start && end <= self.end_time
            }
        }
    }

    /// `min <= n && (max == 0 || n <= max)`; both bounds zero means the
    /// dimension is unconstrained and the slot is not even parsed.
    fn nnodes_in_range(&self, nnodes: Option<&str>) -> bool {
        if self.nnodes_min == 0 && self.nnodes_max == 0 {
            return true;
        }
        let Some(n) = nnodes.and_then(|s| s.parse::<u32>().ok()) else {
            return false;
        };
        self.nnodes_min <= n && (self.nnodes_max == 0 || n <= self.nnodes_max)
    }
}

/// Byte-equal membership on the string rendering; an empty criteria list
/// is trivially satisfied.
fn member_of(criteria: &[String], value: Option<&str>) -> bool {
    if criteria.is_empty() {
        return true;
    }
    value.is_some_and(|v| criteria.iter().any(|c| c == v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use jobcomp_wire::{format_time, SLURM_REDIS_ABI};

    const UUID: &str = "0f8f6c2e-aaaa-bbbb-cccc-121212121212";

    fn submit_query(store: &mut MemoryStore, tmf: TimeFormat, start: i64, end: i64) {
        let qkey = query_key("job", UUID);
        store.hset(&qkey, "_abi", &SLURM_REDIS_ABI.to_string()).unwrap();
        store.hset(&qkey, "_tmf", &tmf.flag().to_string()).unwrap();
        store.hset(&qkey, "Start", &format_time(tmf, start)).unwrap();
        store.hset(&qkey, "End", &format_time(tmf, end)).unwrap();
        store.hset(&qkey, CRITERIA_NNODES_MIN, "0").unwrap();
        store.hset(&qkey, CRITERIA_NNODES_MAX, "0").unwrap();
    }

    fn put_job(store: &mut MemoryStore, tmf: TimeFormat, jobid: u32, start: i64, end: i64) {
        let jkey = job_key("job", jobid);
        store.hset(&jkey, "_abi", &SLURM_REDIS_ABI.to_string()).unwrap();
        store.hset(&jkey, "_tmf", &tmf.flag().to_string()).unwrap();
        store.hset(&jkey, "JobID", &jobid.to_string()).unwrap();
        store.hset(&jkey, "Start", &format_time(tmf, start)).unwrap();
        store.hset(&jkey, "End", &format_time(tmf, end)).unwrap();
        store.hset(&jkey, "UID", "1000").unwrap();
        store.hset(&jkey, "GID", "1000").unwrap();
        store.hset(&jkey, "NNodes", "2").unwrap();
        store.hset(&jkey, "JobName", "relion").unwrap();
        store.hset(&jkey, "Partition", "batch").unwrap();
        store.hset(&jkey, "State", "COMPLETED").unwrap();
    }

    #[test]
    fn load_reports_missing_query_as_none() {
        let store = MemoryStore::new();
        assert!(JobQuery::load(&store, "job", UUID).unwrap().is_none());
    }

    #[test]
    fn load_requires_scalars() {
        let mut store = MemoryStore::new();
        let qkey = query_key("job", UUID);
        store.hset(&qkey, "_abi", "1").unwrap();
        store.hset(&qkey, "_tmf", "0").unwrap();
        assert_eq!(
            JobQuery::load(&store, "job", UUID).unwrap_err(),
            VerbError::MissingField
        );
    }

    #[test]
    fn load_rejects_wrong_key_type() {
        let mut store = MemoryStore::new();
        store.sadd(&query_key("job", UUID), "x").unwrap();
        assert_eq!(
            JobQuery::load(&store, "job", UUID).unwrap_err(),
            VerbError::WrongType
        );
    }

    #[test]
    fn load_rejects_malformed_times() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Iso8601, 0, 1000);
        store.hset(&query_key("job", UUID), "End", "garbage").unwrap();
        assert_eq!(
            JobQuery::load(&store, "job", UUID).unwrap_err(),
            VerbError::BadTime { which: "end" }
        );
    }

    #[test]
    fn time_window_is_inclusive_both_ends() {
        for tmf in [TimeFormat::Epoch, TimeFormat::Iso8601] {
            let mut store = MemoryStore::new();
            submit_query(&mut store, tmf, 1000, 2000);
            put_job(&mut store, tmf, 1, 1000, 2000);
            put_job(&mut store, tmf, 2, 999, 2000);
            put_job(&mut store, tmf, 3, 1000, 2001);

            let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
            assert_eq!(qry.matches(&store, 1).unwrap(), MatchOutcome::Pass);
            assert_eq!(qry.matches(&store, 2).unwrap(), MatchOutcome::Fail);
            assert_eq!(qry.matches(&store, 3).unwrap(), MatchOutcome::Fail);
        }
    }

    #[test]
    fn missing_job_is_gone_not_an_error() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 0, 10);
        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.matches(&store, 99).unwrap(), MatchOutcome::Gone);
    }

    #[test]
    fn malformed_job_fails_instead_of_erroring() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 0, 10_000);
        put_job(&mut store, TimeFormat::Epoch, 5, 100, 200);
        store.hset(&job_key("job", 5u32), "Start", "not-a-number").unwrap();

        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.matches(&store, 5).unwrap(), MatchOutcome::Fail);
    }

    #[test]
    fn abi_mismatch_fails_the_record() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 0, 10_000);
        put_job(&mut store, TimeFormat::Epoch, 5, 100, 200);
        store.hset(&job_key("job", 5u32), "_abi", "0").unwrap();

        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.matches(&store, 5).unwrap(), MatchOutcome::Fail);
    }

    #[test]
    fn set_criteria_are_byte_equal_membership() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 0, 10_000);
        store.sadd(&criteria_key("job", UUID, CriteriaDim::Partition), "batch").unwrap();
        store.sadd(&criteria_key("job", UUID, CriteriaDim::Uid), "1000").unwrap();
        store.sadd(&criteria_key("job", UUID, CriteriaDim::State), "COMPLETED").unwrap();
        put_job(&mut store, TimeFormat::Epoch, 1, 100, 200);
        put_job(&mut store, TimeFormat::Epoch, 2, 100, 200);
        store.hset(&job_key("job", 2u32), "Partition", "debug").unwrap();

        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.matches(&store, 1).unwrap(), MatchOutcome::Pass);
        assert_eq!(qry.matches(&store, 2).unwrap(), MatchOutcome::Fail);
    }

    #[test]
    fn nnodes_bounds() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 0, 10_000);
        let qkey = query_key("job", UUID);
        store.hset(&qkey, CRITERIA_NNODES_MIN, "2").unwrap();
        store.hset(&qkey, CRITERIA_NNODES_MAX, "4").unwrap();

        put_job(&mut store, TimeFormat::Epoch, 1, 100, 200);
        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.matches(&store, 1).unwrap(), MatchOutcome::Pass);

        store.hset(&job_key("job", 1u32), "NNodes", "1").unwrap();
        assert_eq!(qry.matches(&store, 1).unwrap(), MatchOutcome::Fail);

        store.hset(&job_key("job", 1u32), "NNodes", "5").unwrap();
        assert_eq!(qry.matches(&store, 1).unwrap(), MatchOutcome::Fail);

        // max == 0 leaves the upper side unbounded
        store.hset(&qkey, CRITERIA_NNODES_MAX, "0").unwrap();
        store.hset(&job_key("job", 1u32), "NNodes", "4096").unwrap();
        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.matches(&store, 1).unwrap(), MatchOutcome::Pass);
    }

    #[test]
    fn explicit_job_list_parses_to_integers() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 0, 10_000);
        for id in ["300", "7", "41"] {
            store.sadd(&criteria_key("job", UUID, CriteriaDim::Job), id).unwrap();
        }
        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.jobs(), &[300, 7, 41]);
    }

    #[test]
    fn day_span_covers_query_window() {
        let mut store = MemoryStore::new();
        submit_query(&mut store, TimeFormat::Epoch, 86_400, 259_199);
        let qry = JobQuery::load(&store, "job", UUID).unwrap().unwrap();
        assert_eq!(qry.start_day(), 1);
        assert_eq!(qry.end_day(), 2);
    }
}
