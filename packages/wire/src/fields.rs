//! The slot catalogue.
//!
//! Every job hash carries the same ordered, fixed set of fields. The slot
//! order is part of the fetch reply format: `FETCH` returns each job as an
//! array of exactly [`MAX_FIELDS`] entries, indexed by [`FieldIndex`].

/// Number of slots in the catalogue. Inner fetch arrays always have this
/// length; decoders must refuse any other.
pub const MAX_FIELDS: usize = 28;

/// Version stamp written into slot 0 of every job and criteria hash.
/// Records stamped with a different ABI belong to an older catalogue and
/// are refused, never reinterpreted.
pub const SLURM_REDIS_ABI: u32 = 1;

/// Slot ordinals. The discriminant doubles as the index into a slot vector
/// and into [`FIELD_LABELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FieldIndex {
    Abi = 0,
    TimeFormat = 1,
    JobId = 2,
    Partition = 3,
    Start = 4,
    End = 5,
    Elapsed = 6,
    Uid = 7,
    User = 8,
    Gid = 9,
    Group = 10,
    NNodes = 11,
    NCpus = 12,
    NodeList = 13,
    JobName = 14,
    State = 15,
    TimeLimit = 16,
    WorkDir = 17,
    Reservation = 18,
    ReqGres = 19,
    Account = 20,
    Qos = 21,
    WcKey = 22,
    Cluster = 23,
    Submit = 24,
    Eligible = 25,
    DerivedExitCode = 26,
    ExitCode = 27,
}

/// Hash field labels, in slot order.
pub const FIELD_LABELS: [&str; MAX_FIELDS] = [
    "_abi",
    "_tmf",
    "JobID",
    "Partition",
    "Start",
    "End",
    "Elapsed",
    "UID",
    "User",
    "GID",
    "Group",
    "NNodes",
    "NCPUs",
    "NodeList",
    "JobName",
    "State",
    "TimeLimit",
    "WorkDir",
    "Reservation",
    "ReqGRES",
    "Account",
    "QOS",
    "WCKey",
    "Cluster",
    "Submit",
    "Eligible",
    "DerivedExitCode",
    "ExitCode",
];

/// Node-count bounds in the criteria hash. These deliberately do not reuse
/// the `NNodes` label so a criteria hash can never be mistaken for a job
/// hash field-for-field.
pub const CRITERIA_NNODES_MIN: &str = "NNodesMin";
pub const CRITERIA_NNODES_MAX: &str = "NNodesMax";

impl FieldIndex {
    /// The wire label for this slot.
    pub const fn label(self) -> &'static str {
        FIELD_LABELS[self as usize]
    }
}
