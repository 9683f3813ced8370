//! Pipelined command transport.
//!
//! The client speaks to the store through [`RedisLink`]: append commands,
//! drain their replies in order, or round-trip a single command. The
//! production implementation wraps one synchronous `redis` connection;
//! the end-to-end tests substitute an in-process harness. Server-side
//! error replies surface as [`Reply::Error`] values so the transaction
//! logic can inspect them; only transport failures are `Err`, and those
//! drop the connection for a lazy reconnect.

use redis::Value;
use thiserror::Error;

/// The connection to the store failed at the transport level. State on
/// the wire is indeterminate; the transaction bracket guarantees no
/// partial writes became visible.
#[derive(Debug, Clone, Error)]
#[error("store connection failed: {0}")]
pub struct LinkError(pub String);

/// A reply from the store, mirroring the wire taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Int(i64),
    Bulk(String),
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// Pipelined command submission against a single connection.
pub trait RedisLink {
    /// Queue a command without flushing.
    fn append(&mut self, args: &[&str]);

    /// Flush queued commands and collect one reply per command, in
    /// submission order.
    fn drain(&mut self) -> Result<Vec<Reply>, LinkError>;

    /// Round-trip a single command.
    fn command(&mut self, args: &[&str]) -> Result<Reply, LinkError>;
}

/// [`RedisLink`] over a live `redis::Connection`.
pub struct ConnLink {
    con: redis::Connection,
    pending: redis::Pipeline,
    pending_count: usize,
}

impl ConnLink {
    pub fn new(con: redis::Connection) -> Self {
        Self {
            con,
            pending: redis::pipe(),
            pending_count: 0,
        }
    }
}

fn build_cmd(args: &[&str]) -> redis::Cmd {
    debug_assert!(!args.is_empty());
    let mut cmd = redis::cmd(args.first().copied().unwrap_or_default());
    for arg in &args[1..] {
        cmd.arg(*arg);
    }
    cmd
}

fn convert(value: Value) -> Reply {
    match value {
        Value::Nil => Reply::Nil,
        Value::Okay => Reply::Status("OK".to_string()),
        Value::SimpleString(s) => Reply::Status(s),
        Value::Int(i) => Reply::Int(i),
        Value::BulkString(bytes) => Reply::Bulk(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Array(items) => Reply::Array(items.into_iter().map(convert).collect()),
        other => Reply::Error(format!("unsupported reply: {other:?}")),
    }
}

fn is_transport(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

impl RedisLink for ConnLink {
    fn append(&mut self, args: &[&str]) {
        self.pending.add_command(build_cmd(args));
        self.pending_count += 1;
    }

    fn drain(&mut self) -> Result<Vec<Reply>, LinkError> {
        let pipe = std::mem::replace(&mut self.pending, redis::pipe());
        self.pending_count = 0;
        match pipe.query::<Vec<Value>>(&mut self.con) {
            Ok(values) => Ok(values.into_iter().map(convert).collect()),
            Err(err) if is_transport(&err) => Err(LinkError(err.to_string())),
            // A server-side error reply anywhere in the pipeline; the
            // caller only needs to see that one errored to roll back.
            Err(err) => Ok(vec![Reply::Error(err.to_string())]),
        }
    }

    fn command(&mut self, args: &[&str]) -> Result<Reply, LinkError> {
        match build_cmd(args).query::<Value>(&mut self.con) {
            Ok(value) => Ok(convert(value)),
            Err(err) if is_transport(&err) => Err(LinkError(err.to_string())),
            Err(err) => Ok(Reply::Error(err.to_string())),
        }
    }
}
