//! Typed errors a verb can reply with.

use thiserror::Error;

/// Error taxonomy of the store-side verbs. The hosting store turns these
/// into error replies; any partial pipeline the caller had in flight is
/// rolled back by the transaction bracket on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerbError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("expected field(s) missing")]
    MissingField,

    #[error("invalid time format flag")]
    BadTimeFormat,

    /// A stored time literal that does not parse under the record's own
    /// `_tmf` flag. `which` names the offending slot.
    #[error("invalid {which} date/time")]
    BadTime { which: &'static str },

    /// A malformed argument or stored value outside the time slots.
    #[error("invalid {0}")]
    BadValue(&'static str),

    #[error("failed to set ttl on match set")]
    MatchSetTtl,

    #[error("wrong number of arguments for '{0}' command")]
    Arity(&'static str),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}
