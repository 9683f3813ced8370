//! The three verbs and their dispatch entry.

use jobcomp_wire::{
    day_bucket, index_key, job_key, match_key, parse_time, FieldIndex, TimeFormat, CMD_FETCH,
    CMD_INDEX, CMD_MATCH, FIELD_LABELS,
};
use tracing::{debug, warn};

use crate::error::VerbError;
use crate::query::{JobQuery, MatchOutcome};
use crate::reply::Reply;
use crate::sscan::ScanCursor;
use crate::store::{KeyType, Store};

/// Chunk-size hint for the day-bucket scan.
const SCAN_COUNT: usize = 500;

/// Knobs the hosting store wires in at load time; fixed for the process.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// TTL of day-bucket keys in seconds, refreshed on every insert.
    /// Zero disables expiry.
    pub index_ttl: u64,
    /// TTL of query and match keys in seconds.
    pub query_ttl: u64,
    /// Members popped from the match set per inner chunk of a fetch.
    pub fetch_count: usize,
    /// Hard cap on the jobs one `FETCH` call returns.
    pub fetch_limit: i64,
    /// Catalogue stamp expected on incoming records.
    pub abi: u32,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            index_ttl: 0,
            query_ttl: 60,
            fetch_count: 100,
            fetch_limit: 500,
            abi: jobcomp_wire::SLURM_REDIS_ABI,
        }
    }
}

/// Route one verb invocation. `argv` is the full argument vector including
/// the verb name; unknown names and wrong arities reply with the matching
/// typed errors before any verb logic runs.
pub fn dispatch(store: &mut impl Store, cfg: &ModuleConfig, argv: &[&str]) -> Result<Reply, VerbError> {
    let Some((name, args)) = argv.split_first() else {
        return Err(VerbError::UnknownCommand(String::new()));
    };
    if name.eq_ignore_ascii_case(CMD_INDEX) {
        match args {
            [prefix, jobid] => index(store, cfg, prefix, jobid),
            _ => Err(VerbError::Arity(CMD_INDEX)),
        }
    } else if name.eq_ignore_ascii_case(CMD_MATCH) {
        match args {
            [prefix, uuid] => match_jobs(store, cfg, prefix, uuid),
            _ => Err(VerbError::Arity(CMD_MATCH)),
        }
    } else if name.eq_ignore_ascii_case(CMD_FETCH) {
        match args {
            [prefix, uuid, max] => fetch(store, cfg, prefix, uuid, max),
            _ => Err(VerbError::Arity(CMD_FETCH)),
        }
    } else {
        Err(VerbError::UnknownCommand(name.to_string()))
    }
}

/// `INDEX <prefix> <jobid>`: place the job into the day bucket of its end
/// time and refresh the bucket's TTL. A missing job key replies null so a
/// delete racing the ingest pipeline stays a no-op.
pub fn index(store: &mut impl Store, cfg: &ModuleConfig, prefix: &str, jobid: &str) -> Result<Reply, VerbError> {
    let jkey = job_key(prefix, jobid);
    match store.key_type(&jkey) {
        KeyType::Missing => return Ok(Reply::Null),
        KeyType::Hash => {}
        _ => return Err(VerbError::WrongType),
    }

    let slots = store.hash_get(
        &jkey,
        &[
            FieldIndex::Abi.label(),
            FieldIndex::TimeFormat.label(),
            FieldIndex::End.label(),
        ],
    )?;

    if let Some(abi) = slots[0].as_deref() {
        if abi != cfg.abi.to_string() {
            warn!(job = jobid, job_abi = abi, expected = cfg.abi, "indexing job with mismatched abi");
        }
    }

    let tmf_flag: i64 = slots[1]
        .as_deref()
        .ok_or(VerbError::MissingField)?
        .parse()
        .map_err(|_| VerbError::BadTimeFormat)?;
    let end_literal = slots[2].as_deref().ok_or(VerbError::MissingField)?;
    let end_time = parse_time(TimeFormat::from_flag(tmf_flag), end_literal)
        .map_err(|_| VerbError::BadTime { which: "end" })?;

    let idx = index_key(prefix, day_bucket(end_time));
    store.sadd(&idx, jobid)?;
    if cfg.index_ttl > 0 {
        store.expire(&idx, cfg.index_ttl)?;
    }
    Ok(Reply::Bulk(idx))
}

/// `MATCH <prefix> <uuid>`: build the sorted match set for the submitted
/// criteria. Replies null when the criteria are gone or nothing matched;
/// otherwise replies the match-set key name, TTL already armed.
pub fn match_jobs(store: &mut impl Store, cfg: &ModuleConfig, prefix: &str, uuid: &str) -> Result<Reply, VerbError> {
    let Some(qry) = JobQuery::load(store, prefix, uuid)? else {
        return Ok(Reply::Null);
    };
    let mkey = match_key(prefix, uuid);

    if !qry.jobs().is_empty() {
        // Explicit job list: direct access, no index needed.
        for &jobid in qry.jobs() {
            if qry.matches(store, jobid)? == MatchOutcome::Pass {
                store.zadd(&mkey, jobid as f64, &jobid.to_string())?;
            }
        }
    } else {
        for day in qry.start_day()..=qry.end_day() {
            let idx = index_key(prefix, day);
            match store.key_type(&idx) {
                KeyType::Missing => continue,
                KeyType::Set => {}
                _ => return Err(VerbError::WrongType),
            }
            let mut cursor = ScanCursor::new(idx, SCAN_COUNT);
            while let Some(member) = cursor.next(store)? {
                // Bucket members are jobid renderings; skip strays.
                let Ok(jobid) = member.parse::<u32>() else {
                    debug!(%member, "skipping non-numeric bucket member");
                    continue;
                };
                if qry.matches(store, jobid)? == MatchOutcome::Pass {
                    store.zadd(&mkey, jobid as f64, &member)?;
                }
            }
        }
    }

    match store.key_type(&mkey) {
        KeyType::Missing => return Ok(Reply::Null),
        KeyType::SortedSet => {}
        _ => return Err(VerbError::WrongType),
    }
    if !store.expire(&mkey, cfg.query_ttl)? {
        return Err(VerbError::MatchSetTtl);
    }
    Ok(Reply::Bulk(mkey))
}

/// `FETCH <prefix> <uuid> <max>`: destructively drain the match set.
/// Members pop in ascending jobid order; jobs that expired since the
/// match are skipped without counting. Fewer than `max` jobs is not end
/// of stream, only an empty reply is.
pub fn fetch(store: &mut impl Store, cfg: &ModuleConfig, prefix: &str, uuid: &str, max: &str) -> Result<Reply, VerbError> {
    let mut max_count: i64 = max.parse().map_err(|_| VerbError::BadValue("max count"))?;
    if max_count > cfg.fetch_limit {
        max_count = cfg.fetch_limit;
    }
    let mkey = match_key(prefix, uuid);

    let mut rows: Vec<Reply> = Vec::new();
    let mut count: i64 = 0;
    'drain: while count < max_count {
        let popped = match store.zpopmin(&mkey, cfg.fetch_count) {
            Ok(popped) if !popped.is_empty() => popped,
            _ => break,
        };
        for (member, _score) in popped {
            if count >= max_count {
                break 'drain;
            }
            let Ok(jobid) = member.parse::<u32>() else {
                continue;
            };
            let jkey = job_key(prefix, jobid);
            if store.key_type(&jkey) != KeyType::Hash {
                continue;
            }
            let Ok(slots) = store.hash_get(&jkey, &FIELD_LABELS) else {
                continue;
            };
            rows.push(Reply::slot_row(slots));
            count += 1;
        }
    }
    Ok(Reply::Array(rows))
}
