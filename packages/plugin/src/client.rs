//! Connection lifecycle, pipelined transactions, and the query flow.
//!
//! Both write paths run as one pipelined multi-statement transaction:
//! queue `MULTI` plus the operations, drain every reply, then `EXEC` on a
//! clean drain or `DISCARD` the moment any reply is an error. A consumer
//! that can see a job hash is therefore guaranteed to see the job in its
//! day bucket, and the matcher sees a criteria bundle completely or not
//! at all.

use std::sync::Arc;
use std::time::Duration;

use jobcomp_wire::{
    criteria_key, format_time, job_key, query_key, CriteriaDim, FieldIndex, TimeFormat,
    CMD_FETCH, CMD_INDEX, CMD_MATCH, CRITERIA_NNODES_MAX, CRITERIA_NNODES_MIN, FIELD_LABELS,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{CodecError, FieldVector, RecordCodec};
use crate::config::Config;
use crate::identity::{IdentityResolver, SystemIdentityResolver};
use crate::link::{ConnLink, LinkError, Reply, RedisLink};
use crate::record::{CompletedJob, JobRecord, JobState};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("transaction discarded")]
    TransactionDiscarded,

    /// A store verb replied with a typed error.
    #[error("store verb error: {0}")]
    Verb(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Criteria bundle for a historical query. Empty lists leave their
/// dimension unconstrained; a non-empty `job_ids` list short-circuits the
/// day-bucket walk on the store side.
#[derive(Debug, Clone, Default)]
pub struct QueryConditions {
    /// UTC seconds; the window is `start <= job.start && job.end <= end`.
    pub start_time: i64,
    pub end_time: i64,
    /// Node-count bounds; zero means unbounded on that side.
    pub nodes_min: u32,
    pub nodes_max: u32,
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    pub job_ids: Vec<u32>,
    pub job_names: Vec<String>,
    pub partitions: Vec<String>,
    pub states: Vec<JobState>,
}

impl QueryConditions {
    pub fn window(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            ..Self::default()
        }
    }
}

/// The controller-facing client: codec, identity caches, and one lazily
/// connected store link.
pub struct JobcompRedis {
    config: Config,
    tmf: TimeFormat,
    prefix: String,
    codec: RecordCodec,
    client: redis::Client,
    link: Option<ConnLink>,
}

impl JobcompRedis {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        Self::with_resolver(config, Arc::new(SystemIdentityResolver))
    }

    pub fn with_resolver(
        config: Config,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self, ClientError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let codec = RecordCodec::new(
            config.abi,
            config.id_cache_size,
            Duration::from_secs(config.id_cache_ttl),
            resolver,
        );
        let prefix = location_prefix(config.location.as_deref());
        let tmf = config.time_format();
        Ok(Self {
            config,
            tmf,
            prefix,
            codec,
            client,
            link: None,
        })
    }

    /// Install the key prefix for a storage location; `None` keeps the
    /// default namespace.
    pub fn set_location(&mut self, location: Option<&str>) {
        self.prefix = location_prefix(location);
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Record one terminated job: encode, write the hash, index it, all
    /// in one transaction.
    pub fn log_record(&mut self, job: &JobRecord) -> Result<(), ClientError> {
        let slots = self.codec.encode(self.tmf, job)?;
        let prefix = self.prefix.clone();
        let job_ttl = self.config.job_ttl;

        self.ensure_connected()?;
        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
        let result = ingest_fields(link, &prefix, job_ttl, &slots);
        self.reset_on_transport(result)
    }

    /// Run a historical query: submit criteria, match, drain, decode.
    pub fn get_jobs(&mut self, cond: &QueryConditions) -> Result<Vec<CompletedJob>, ClientError> {
        let uuid = Uuid::new_v4().to_string();
        let prefix = self.prefix.clone();
        let tmf = self.tmf;
        let abi = self.config.abi;
        let query_ttl = self.config.query_ttl;
        let fetch_count = self.config.fetch_count;

        self.ensure_connected()?;
        let codec = &self.codec;
        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;

        let result = (|| {
            submit_criteria(link, &prefix, &uuid, cond, tmf, abi, query_ttl)?;
            match run_match(link, &prefix, &uuid)? {
                Some(_matchset) => fetch_jobs(link, &prefix, &uuid, fetch_count, codec),
                None => {
                    debug!(%uuid, "no jobs matched");
                    Ok(Vec::new())
                }
            }
        })();
        self.reset_on_transport(result)
    }

    /// Probe the link with `PING` and rebuild it when stale, running
    /// `AUTH` right after a fresh connect when a password is configured.
    fn ensure_connected(&mut self) -> Result<(), ClientError> {
        if let Some(mut link) = self.link.take() {
            if matches!(link.command(&["PING"]), Ok(Reply::Status(ref pong)) if pong == "PONG") {
                self.link = Some(link);
                return Ok(());
            }
            // Stale connection dropped; fall through to reconnect.
        }
        let mut link = ConnLink::new(self.client.get_connection()?);
        if let Some(password) = self.config.password.as_deref() {
            if let Reply::Error(err) = link.command(&["AUTH", password])? {
                return Err(ClientError::AuthRejected(err));
            }
        }
        self.link = Some(link);
        Ok(())
    }

    /// Transport failures invalidate the connection; the next call
    /// reconnects lazily. The transaction bracket means no partial state
    /// was left behind.
    fn reset_on_transport<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if matches!(result, Err(ClientError::Link(_))) {
            self.link = None;
        }
        result
    }
}

/// Default namespace, or one scoped under the configured location.
pub fn location_prefix(location: Option<&str>) -> String {
    match location {
        None | Some("") => "job".to_string(),
        Some(location) => format!("{location}:job"),
    }
}

/// Write one encoded record: `MULTI`, one `HSET` per populated slot, an
/// optional `EXPIRE`, the `INDEX` verb, then commit or roll back.
pub fn ingest_fields(
    link: &mut impl RedisLink,
    prefix: &str,
    job_ttl: u64,
    slots: &FieldVector,
) -> Result<(), ClientError> {
    let job_id = slots[FieldIndex::JobId as usize]
        .as_deref()
        .ok_or(CodecError::MissingSlot(FieldIndex::JobId.label()))?;
    let jkey = job_key(prefix, job_id);

    link.append(&["MULTI"]);
    for (label, value) in FIELD_LABELS.iter().copied().zip(slots.iter()) {
        if let Some(value) = value {
            link.append(&["HSET", jkey.as_str(), label, value.as_str()]);
        }
    }
    let ttl = job_ttl.to_string();
    if job_ttl > 0 {
        link.append(&["EXPIRE", jkey.as_str(), ttl.as_str()]);
    }
    link.append(&[CMD_INDEX, prefix, job_id]);

    finish_transaction(link, job_id)
}

/// Submit a criteria bundle under `uuid`: scalars in one hash, each
/// non-empty list as its own set, every key TTL-armed, transactionally.
pub fn submit_criteria(
    link: &mut impl RedisLink,
    prefix: &str,
    uuid: &str,
    cond: &QueryConditions,
    tmf: TimeFormat,
    abi: u32,
    query_ttl: u64,
) -> Result<(), ClientError> {
    let qkey = query_key(prefix, uuid);
    let ttl = query_ttl.to_string();
    let abi = abi.to_string();
    let flag = tmf.flag().to_string();
    let start = format_time(tmf, cond.start_time);
    let end = format_time(tmf, cond.end_time);
    let nodes_min = cond.nodes_min.to_string();
    let nodes_max = cond.nodes_max.to_string();

    link.append(&["MULTI"]);
    link.append(&[
        "HSET",
        qkey.as_str(),
        FieldIndex::Abi.label(),
        abi.as_str(),
        FieldIndex::TimeFormat.label(),
        flag.as_str(),
        FieldIndex::Start.label(),
        start.as_str(),
        FieldIndex::End.label(),
        end.as_str(),
        CRITERIA_NNODES_MIN,
        nodes_min.as_str(),
        CRITERIA_NNODES_MAX,
        nodes_max.as_str(),
    ]);
    link.append(&["EXPIRE", qkey.as_str(), ttl.as_str()]);

    let numeric = |ids: &[u32]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
    add_criteria(link, &criteria_key(prefix, uuid, CriteriaDim::Gid), &numeric(&cond.gids), &ttl);
    add_criteria(link, &criteria_key(prefix, uuid, CriteriaDim::Job), &numeric(&cond.job_ids), &ttl);
    add_criteria(link, &criteria_key(prefix, uuid, CriteriaDim::JobName), &cond.job_names, &ttl);
    add_criteria(link, &criteria_key(prefix, uuid, CriteriaDim::Partition), &cond.partitions, &ttl);
    let states: Vec<String> = cond.states.iter().map(|s| s.to_string()).collect();
    add_criteria(link, &criteria_key(prefix, uuid, CriteriaDim::State), &states, &ttl);
    add_criteria(link, &criteria_key(prefix, uuid, CriteriaDim::Uid), &numeric(&cond.uids), &ttl);

    finish_transaction(link, uuid)
}

fn add_criteria(link: &mut impl RedisLink, key: &str, members: &[String], ttl: &str) {
    if members.is_empty() {
        return;
    }
    for member in members {
        link.append(&["SADD", key, member.as_str()]);
    }
    link.append(&["EXPIRE", key, ttl]);
}

/// Drain the queued transaction and commit, or roll back on the first
/// error reply.
fn finish_transaction(link: &mut impl RedisLink, context: &str) -> Result<(), ClientError> {
    let replies = link.drain()?;
    if replies.iter().any(Reply::is_error) {
        debug!(context, "discarding transaction");
        link.command(&["DISCARD"])?;
        return Err(ClientError::TransactionDiscarded);
    }
    debug!(context, "committing transaction");
    match link.command(&["EXEC"])? {
        Reply::Error(err) => {
            debug!(context, %err, "exec aborted");
            Err(ClientError::TransactionDiscarded)
        }
        _ => Ok(()),
    }
}

/// Ask the store to build the match set. `None` means no criteria under
/// that uuid (expired) or nothing matched.
pub fn run_match(
    link: &mut impl RedisLink,
    prefix: &str,
    uuid: &str,
) -> Result<Option<String>, ClientError> {
    match link.command(&[CMD_MATCH, prefix, uuid])? {
        Reply::Bulk(matchset) => Ok(Some(matchset)),
        Reply::Nil => Ok(None),
        Reply::Error(err) => Err(ClientError::Verb(err)),
        other => Err(ClientError::Verb(format!("unexpected match reply: {other:?}"))),
    }
}

/// Drain the match set with repeated `FETCH` calls until an empty reply,
/// decoding each slot vector. Records that fail to decode are skipped;
/// the batch keeps going.
pub fn fetch_jobs(
    link: &mut impl RedisLink,
    prefix: &str,
    uuid: &str,
    fetch_count: u32,
    codec: &RecordCodec,
) -> Result<Vec<CompletedJob>, ClientError> {
    let mut jobs = Vec::new();
    let count = fetch_count.to_string();
    loop {
        let rows = match link.command(&[CMD_FETCH, prefix, uuid, count.as_str()])? {
            Reply::Array(rows) if !rows.is_empty() => rows,
            Reply::Error(err) => return Err(ClientError::Verb(err)),
            _ => break,
        };
        for row in rows {
            let Reply::Array(cells) = row else {
                continue;
            };
            let slots: Vec<Option<String>> = cells
                .into_iter()
                .map(|cell| match cell {
                    Reply::Bulk(s) => Some(s),
                    _ => None,
                })
                .collect();
            match codec.decode(&slots) {
                Ok(job) => jobs.push(job),
                Err(err) => debug!(%err, "skipping record that failed to decode"),
            }
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_defaults_and_location_scoping() {
        assert_eq!(location_prefix(None), "job");
        assert_eq!(location_prefix(Some("")), "job");
        assert_eq!(location_prefix(Some("tier2")), "tier2:job");
    }

    /// Records appended commands so pipeline construction is observable
    /// without a live store.
    #[derive(Default)]
    struct RecordingLink {
        appended: Vec<Vec<String>>,
        commands: Vec<Vec<String>>,
    }

    impl RedisLink for RecordingLink {
        fn append(&mut self, args: &[&str]) {
            self.appended.push(args.iter().map(|s| s.to_string()).collect());
        }
        fn drain(&mut self) -> Result<Vec<Reply>, LinkError> {
            Ok(vec![Reply::Status("QUEUED".into()); self.appended.len()])
        }
        fn command(&mut self, args: &[&str]) -> Result<Reply, LinkError> {
            self.commands.push(args.iter().map(|s| s.to_string()).collect());
            Ok(Reply::Array(vec![]))
        }
    }

    #[test]
    fn ingest_pipeline_shape() {
        let mut link = RecordingLink::default();
        let mut slots: FieldVector = std::array::from_fn(|_| None);
        slots[FieldIndex::Abi as usize] = Some("1".into());
        slots[FieldIndex::TimeFormat as usize] = Some("0".into());
        slots[FieldIndex::JobId as usize] = Some("42".into());
        slots[FieldIndex::End as usize] = Some("3600".into());

        ingest_fields(&mut link, "job", 300, &slots).unwrap();

        let flat: Vec<String> = link.appended.iter().map(|c| c.join(" ")).collect();
        assert_eq!(flat[0], "MULTI");
        assert!(flat.contains(&"HSET job:42 _abi 1".to_string()));
        assert!(flat.contains(&"HSET job:42 JobID 42".to_string()));
        assert!(flat.contains(&"EXPIRE job:42 300".to_string()));
        assert_eq!(flat.last().unwrap(), &format!("{CMD_INDEX} job 42"));
        // Only populated slots are written: MULTI + 4 HSET + EXPIRE + INDEX.
        assert_eq!(flat.len(), 7);
        assert_eq!(link.commands, vec![vec!["EXEC".to_string()]]);
    }

    #[test]
    fn criteria_pipeline_covers_every_populated_dimension() {
        let mut link = RecordingLink::default();
        let mut cond = QueryConditions::window(0, 86_400);
        cond.uids = vec![1000, 1001];
        cond.states = vec![JobState::Completed];

        submit_criteria(&mut link, "job", "u-1", &cond, TimeFormat::Epoch, 1, 60).unwrap();

        let flat: Vec<String> = link.appended.iter().map(|c| c.join(" ")).collect();
        assert_eq!(flat[0], "MULTI");
        assert!(flat[1].starts_with("HSET job:qry:u-1 _abi 1 _tmf 0 Start 0 End 86400 NNodesMin 0 NNodesMax 0"));
        assert!(flat.contains(&"SADD job:qry:u-1:uid 1000".to_string()));
        assert!(flat.contains(&"SADD job:qry:u-1:uid 1001".to_string()));
        assert!(flat.contains(&"SADD job:qry:u-1:stt COMPLETED".to_string()));
        assert!(flat.contains(&"EXPIRE job:qry:u-1:stt 60".to_string()));
        // Unconstrained dimensions write no keys at all.
        assert!(!flat.iter().any(|c| c.contains(":gid") || c.contains(":jnm") || c.contains(":prt") || c.contains(":job ")));
    }

    /// Link whose drain reports an error reply, as a store would for an
    /// unknown command queued into a transaction.
    struct FailingLink {
        discarded: bool,
    }

    impl RedisLink for FailingLink {
        fn append(&mut self, _args: &[&str]) {}
        fn drain(&mut self) -> Result<Vec<Reply>, LinkError> {
            Ok(vec![Reply::Error("ERR unknown command".into())])
        }
        fn command(&mut self, args: &[&str]) -> Result<Reply, LinkError> {
            if args == ["DISCARD"] {
                self.discarded = true;
            }
            Ok(Reply::Status("OK".into()))
        }
    }

    #[test]
    fn error_replies_roll_the_transaction_back() {
        let mut link = FailingLink { discarded: false };
        let mut slots: FieldVector = std::array::from_fn(|_| None);
        slots[FieldIndex::JobId as usize] = Some("7".into());

        let err = ingest_fields(&mut link, "job", 0, &slots).unwrap_err();
        assert!(matches!(err, ClientError::TransactionDiscarded));
        assert!(link.discarded);
    }
}
