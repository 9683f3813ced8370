//! Projection between controller job records and the wire slot vector.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jobcomp_wire::{format_time, parse_time, FieldIndex, TimeFormat, MAX_FIELDS};
use thiserror::Error;

use crate::identity::{IdentityResolver, SystemIdentityResolver};
use crate::record::{CompletedJob, ExitCode, JobRecord, JobState, TimeLimit};
use crate::ttl_cache::{CacheLookup, TtlCache};

/// One job as it crosses the wire: a slot per catalogue entry, `None`
/// where the record carries nothing.
pub type FieldVector = [Option<String>; MAX_FIELDS];

/// Per-record codec failures. A decode failure skips that record; a
/// batched fetch keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("job id must be a positive integer")]
    InvalidJobId,
    #[error("slot vector has {0} slots, expected 28")]
    WrongSlotCount(usize),
    #[error("record abi '{0}' does not match the deployment abi")]
    AbiMismatch(String),
    #[error("missing {0} slot")]
    MissingSlot(&'static str),
    #[error("invalid {0} slot")]
    BadSlot(&'static str),
    #[error("unknown job state '{0}'")]
    UnknownState(String),
}

/// Encoder/decoder plus the identity caches it consults for UID and GID
/// resolution. Cache misses fall through to the name service and the
/// result is inserted for the next record; an id the name service does
/// not know is rendered numerically.
pub struct RecordCodec {
    abi: u32,
    users: TtlCache,
    groups: TtlCache,
    resolver: Arc<dyn IdentityResolver>,
}

impl RecordCodec {
    pub fn new(
        abi: u32,
        cache_size: usize,
        cache_ttl: Duration,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            abi,
            users: TtlCache::new(cache_size, cache_ttl),
            groups: TtlCache::new(cache_size, cache_ttl),
            resolver,
        }
    }

    /// Codec backed by the host's name service.
    pub fn system(abi: u32, cache_size: usize, cache_ttl: Duration) -> Self {
        Self::new(abi, cache_size, cache_ttl, Arc::new(SystemIdentityResolver))
    }

    /// Project a controller record onto the slot vector.
    pub fn encode(&self, tmf: TimeFormat, job: &JobRecord) -> Result<FieldVector, CodecError> {
        if job.job_id == 0 {
            return Err(CodecError::InvalidJobId);
        }

        // A resizing job is recorded as the resize window ending now; a
        // job that resized earlier starts at its last resize. A start
        // after the end is controller clock skew and clamps to zero.
        let (state, start_time, end_time) = if job.resizing {
            (
                JobState::Resizing,
                job.resize_time.unwrap_or(job.start_time),
                Utc::now().timestamp(),
            )
        } else {
            let start = if let Some(resize_time) = job.resize_time {
                resize_time
            } else if job.start_time > job.end_time {
                0
            } else {
                job.start_time
            };
            (job.state, start, job.end_time)
        };

        let user = resolve_cached(&self.users, job.uid, |uid| self.resolver.user_name(uid));
        let group = resolve_cached(&self.groups, job.gid, |gid| self.resolver.group_name(gid));

        let mut slots: FieldVector = std::array::from_fn(|_| None);
        let mut set = |index: FieldIndex, value: String| slots[index as usize] = Some(value);

        set(FieldIndex::Abi, self.abi.to_string());
        set(FieldIndex::TimeFormat, tmf.flag().to_string());
        set(FieldIndex::JobId, job.job_id.to_string());
        set(FieldIndex::Partition, job.partition.clone());
        set(FieldIndex::Start, format_time(tmf, start_time));
        set(FieldIndex::End, format_time(tmf, end_time));
        set(FieldIndex::Elapsed, (end_time - start_time).to_string());
        set(FieldIndex::Uid, job.uid.to_string());
        set(FieldIndex::User, user);
        set(FieldIndex::Gid, job.gid.to_string());
        set(FieldIndex::Group, group);
        set(FieldIndex::NNodes, job.node_count.to_string());
        set(FieldIndex::NCpus, job.cpu_count.to_string());
        set(FieldIndex::NodeList, job.node_list.clone());
        set(
            FieldIndex::JobName,
            if job.job_name.is_empty() {
                "allocation".to_string()
            } else {
                job.job_name.clone()
            },
        );
        set(FieldIndex::State, state.to_string());
        set(FieldIndex::TimeLimit, job.time_limit.to_wire());

        // Everything below is stored only when the controller has a value;
        // an absent slot costs no memory in the store.
        let mut set_opt = |index: FieldIndex, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                slots[index as usize] = Some(value);
            }
        };
        set_opt(FieldIndex::WorkDir, job.work_dir.clone());
        set_opt(FieldIndex::Reservation, job.reservation.clone());
        set_opt(FieldIndex::ReqGres, job.req_gres.clone());
        set_opt(FieldIndex::Account, job.account.clone());
        set_opt(FieldIndex::Qos, job.qos.clone());
        set_opt(FieldIndex::WcKey, job.wckey.clone());
        set_opt(FieldIndex::Cluster, job.cluster.clone());
        set_opt(FieldIndex::Submit, job.submit_time.map(|t| format_time(tmf, t)));
        set_opt(FieldIndex::Eligible, job.eligible_time.map(|t| format_time(tmf, t)));
        set_opt(FieldIndex::DerivedExitCode, job.derived_exit_code.to_wire());
        set_opt(FieldIndex::ExitCode, job.exit_code.to_wire());

        Ok(slots)
    }

    /// Reconstruct a consumer record from a fetched slot vector. The
    /// vector must be a full catalogue row stamped with the deployment
    /// ABI; a prior-generation record is refused, not reinterpreted.
    pub fn decode(&self, slots: &[Option<String>]) -> Result<CompletedJob, CodecError> {
        if slots.len() != MAX_FIELDS {
            return Err(CodecError::WrongSlotCount(slots.len()));
        }
        let slot = |index: FieldIndex| slots[index as usize].as_deref();
        let required = |index: FieldIndex| slot(index).ok_or(CodecError::MissingSlot(index.label()));

        let abi_literal = required(FieldIndex::Abi)?;
        let abi: u32 = abi_literal
            .parse()
            .map_err(|_| CodecError::BadSlot(FieldIndex::Abi.label()))?;
        if abi != self.abi {
            return Err(CodecError::AbiMismatch(abi_literal.to_string()));
        }

        let tmf_flag: i64 = required(FieldIndex::TimeFormat)?
            .parse()
            .map_err(|_| CodecError::BadSlot(FieldIndex::TimeFormat.label()))?;
        let tmf = TimeFormat::from_flag(tmf_flag);

        let job_id: u32 = required(FieldIndex::JobId)?
            .parse()
            .map_err(|_| CodecError::BadSlot(FieldIndex::JobId.label()))?;
        if job_id == 0 {
            return Err(CodecError::InvalidJobId);
        }

        let parse_instant = |index: FieldIndex, literal: &str| {
            parse_time(tmf, literal).map_err(|_| CodecError::BadSlot(index.label()))
        };
        let start_time = parse_instant(FieldIndex::Start, required(FieldIndex::Start)?)?;
        let end_time = parse_instant(FieldIndex::End, required(FieldIndex::End)?)?;

        let parse_u32 = |index: FieldIndex| -> Result<u32, CodecError> {
            required(index)?
                .parse()
                .map_err(|_| CodecError::BadSlot(index.label()))
        };

        let state_literal = required(FieldIndex::State)?;
        let state: JobState = state_literal
            .parse()
            .map_err(|_| CodecError::UnknownState(state_literal.to_string()))?;

        let time_limit = slot(FieldIndex::TimeLimit)
            .map(|s| TimeLimit::from_wire(s).map_err(|_| CodecError::BadSlot(FieldIndex::TimeLimit.label())))
            .transpose()?;

        let optional_instant = |index: FieldIndex| {
            slot(index).map(|s| parse_instant(index, s)).transpose()
        };
        let exit_code = |index: FieldIndex| {
            slot(index)
                .map(|s| ExitCode::from_wire(s).map_err(|_| CodecError::BadSlot(index.label())))
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let owned = |index: FieldIndex| slot(index).map(str::to_string);

        Ok(CompletedJob {
            abi,
            time_format: tmf,
            job_id,
            partition: owned(FieldIndex::Partition),
            start_time,
            end_time,
            elapsed: required(FieldIndex::Elapsed)?
                .parse()
                .map_err(|_| CodecError::BadSlot(FieldIndex::Elapsed.label()))?,
            uid: parse_u32(FieldIndex::Uid)?,
            user: owned(FieldIndex::User),
            gid: parse_u32(FieldIndex::Gid)?,
            group: owned(FieldIndex::Group),
            node_count: parse_u32(FieldIndex::NNodes)?,
            cpu_count: parse_u32(FieldIndex::NCpus)?,
            node_list: owned(FieldIndex::NodeList),
            job_name: owned(FieldIndex::JobName),
            state,
            time_limit,
            work_dir: owned(FieldIndex::WorkDir),
            reservation: owned(FieldIndex::Reservation),
            req_gres: owned(FieldIndex::ReqGres),
            account: owned(FieldIndex::Account),
            qos: owned(FieldIndex::Qos),
            wckey: owned(FieldIndex::WcKey),
            cluster: owned(FieldIndex::Cluster),
            submit_time: optional_instant(FieldIndex::Submit)?,
            eligible_time: optional_instant(FieldIndex::Eligible)?,
            derived_exit_code: exit_code(FieldIndex::DerivedExitCode)?,
            exit_code: exit_code(FieldIndex::ExitCode)?,
        })
    }
}

fn resolve_cached(cache: &TtlCache, id: u32, resolve: impl Fn(u32) -> Option<String>) -> String {
    if let CacheLookup::Hit(name) = cache.get(u64::from(id)) {
        return name;
    }
    let name = resolve(id).unwrap_or_else(|| id.to_string());
    cache.set(u64::from(id), &name);
    name
}
