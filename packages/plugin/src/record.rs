//! Controller-side and consumer-facing job records.

use std::fmt;
use std::str::FromStr;

use jobcomp_wire::TimeFormat;

/// Base state of a finished job, rendered with the controller's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Completed,
    Failed,
    Cancelled,
    Timeout,
    NodeFail,
    Preempted,
    BootFail,
    Deadline,
    OutOfMemory,
    Resizing,
    Pending,
    Running,
    Suspended,
}

impl JobState {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
            JobState::Timeout => "TIMEOUT",
            JobState::NodeFail => "NODE_FAIL",
            JobState::Preempted => "PREEMPTED",
            JobState::BootFail => "BOOT_FAIL",
            JobState::Deadline => "DEADLINE",
            JobState::OutOfMemory => "OUT_OF_MEMORY",
            JobState::Resizing => "RESIZING",
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            "CANCELLED" => JobState::Cancelled,
            "TIMEOUT" => JobState::Timeout,
            "NODE_FAIL" => JobState::NodeFail,
            "PREEMPTED" => JobState::Preempted,
            "BOOT_FAIL" => JobState::BootFail,
            "DEADLINE" => JobState::Deadline,
            "OUT_OF_MEMORY" => JobState::OutOfMemory,
            "RESIZING" => JobState::Resizing,
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "SUSPENDED" => JobState::Suspended,
            _ => return Err(()),
        })
    }
}

/// Wall-clock limit of a job. On the wire: decimal minutes, `I` for
/// unlimited, `P` for the partition default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLimit {
    Minutes(u32),
    Unlimited,
    PartitionLimit,
}

impl TimeLimit {
    pub fn to_wire(self) -> String {
        match self {
            TimeLimit::Minutes(m) => m.to_string(),
            TimeLimit::Unlimited => "I".to_string(),
            TimeLimit::PartitionLimit => "P".to_string(),
        }
    }

    pub fn from_wire(s: &str) -> Result<Self, ()> {
        match s {
            "I" => Ok(TimeLimit::Unlimited),
            "P" => Ok(TimeLimit::PartitionLimit),
            other => other.parse().map(TimeLimit::Minutes).map_err(|_| ()),
        }
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeLimit::Minutes(m) => write!(f, "{m}"),
            TimeLimit::Unlimited => f.write_str("INFINITE"),
            TimeLimit::PartitionLimit => f.write_str("Partition_Limit"),
        }
    }
}

/// Exit status and terminating signal of a job, rendered `status:signal`.
/// `0:0` is the quiescent value and is never stored explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitCode {
    pub status: u32,
    pub signal: u32,
}

impl ExitCode {
    pub const fn new(status: u32, signal: u32) -> Self {
        Self { status, signal }
    }

    pub const fn is_zero(self) -> bool {
        self.status == 0 && self.signal == 0
    }

    /// Wire rendering; `None` when there is nothing worth storing.
    pub fn to_wire(self) -> Option<String> {
        if self.is_zero() {
            None
        } else {
            Some(format!("{}:{}", self.status, self.signal))
        }
    }

    pub fn from_wire(s: &str) -> Result<Self, ()> {
        let (status, signal) = s.split_once(':').ok_or(())?;
        Ok(Self {
            status: status.parse().map_err(|_| ())?,
            signal: signal.parse().map_err(|_| ())?,
        })
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.status, self.signal)
    }
}

/// The controller's view of a terminated job, as handed to the encoder.
///
/// Instants are UTC seconds since the epoch. Optional fields that the
/// controller never populated stay off the wire entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: u32,
    pub partition: String,
    pub start_time: i64,
    pub end_time: i64,
    pub uid: u32,
    pub gid: u32,
    pub node_count: u32,
    pub cpu_count: u32,
    pub node_list: String,
    pub job_name: String,
    pub state: JobState,
    /// The job is mid-resize: the effective state is overridden and the
    /// window becomes resize-start to now.
    pub resizing: bool,
    pub resize_time: Option<i64>,
    pub time_limit: TimeLimit,
    pub work_dir: Option<String>,
    pub reservation: Option<String>,
    pub req_gres: Option<String>,
    pub account: Option<String>,
    pub qos: Option<String>,
    pub wckey: Option<String>,
    pub cluster: Option<String>,
    pub submit_time: Option<i64>,
    pub eligible_time: Option<i64>,
    pub derived_exit_code: ExitCode,
    pub exit_code: ExitCode,
}

impl JobRecord {
    /// A minimal completed job; tests and callers fill in the rest.
    pub fn new(job_id: u32, start_time: i64, end_time: i64) -> Self {
        Self {
            job_id,
            partition: String::new(),
            start_time,
            end_time,
            uid: 0,
            gid: 0,
            node_count: 0,
            cpu_count: 0,
            node_list: String::new(),
            job_name: String::new(),
            state: JobState::Completed,
            resizing: false,
            resize_time: None,
            time_limit: TimeLimit::PartitionLimit,
            work_dir: None,
            reservation: None,
            req_gres: None,
            account: None,
            qos: None,
            wckey: None,
            cluster: None,
            submit_time: None,
            eligible_time: None,
            derived_exit_code: ExitCode::default(),
            exit_code: ExitCode::default(),
        }
    }
}

/// A historical job reconstructed from a fetched slot vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub abi: u32,
    pub time_format: TimeFormat,
    pub job_id: u32,
    pub partition: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub elapsed: i64,
    pub uid: u32,
    pub user: Option<String>,
    pub gid: u32,
    pub group: Option<String>,
    pub node_count: u32,
    pub cpu_count: u32,
    pub node_list: Option<String>,
    pub job_name: Option<String>,
    pub state: JobState,
    pub time_limit: Option<TimeLimit>,
    pub work_dir: Option<String>,
    pub reservation: Option<String>,
    pub req_gres: Option<String>,
    pub account: Option<String>,
    pub qos: Option<String>,
    pub wckey: Option<String>,
    pub cluster: Option<String>,
    pub submit_time: Option<i64>,
    pub eligible_time: Option<i64>,
    pub derived_exit_code: ExitCode,
    pub exit_code: ExitCode,
}
