//! In-process store harness for end-to-end tests.
//!
//! Implements the plugin's [`RedisLink`] on top of the module crate's
//! `MemoryStore` and verb dispatch, with real transaction queue
//! semantics: commands queued after `MULTI` apply only on `EXEC`, a
//! queue-phase error (unknown command, bad arity) marks the transaction
//! aborted exactly like the real store, and `DISCARD` drops it. Flip
//! `module_enabled` off to simulate a store without the verbs loaded.

use jobcomp_module::testing::MemoryStore;
use jobcomp_module::{dispatch, ModuleConfig, Reply as ModuleReply, Store};
use jobcomp_plugin::link::{LinkError, RedisLink, Reply};

struct Txn {
    queued: Vec<Vec<String>>,
    aborted: bool,
}

pub struct StoreHarness {
    pub store: MemoryStore,
    pub cfg: ModuleConfig,
    pub module_enabled: bool,
    pending: Vec<Vec<String>>,
    txn: Option<Txn>,
}

impl Default for StoreHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreHarness {
    pub fn new() -> Self {
        // Tests read the log with RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        Self {
            store: MemoryStore::new(),
            cfg: ModuleConfig::default(),
            module_enabled: true,
            pending: Vec::new(),
            txn: None,
        }
    }

    pub fn with_query_ttl(query_ttl: u64) -> Self {
        let mut harness = Self::new();
        harness.cfg.query_ttl = query_ttl;
        harness
    }

    /// Advance the store clock; TTL-armed keys age accordingly.
    pub fn advance(&mut self, secs: u64) {
        self.store.advance(secs);
    }

    fn execute(&mut self, args: &[String]) -> Reply {
        let name = args[0].to_ascii_uppercase();
        match name.as_str() {
            "PING" => Reply::Status("PONG".into()),
            "AUTH" => Reply::Status("OK".into()),
            "MULTI" => {
                self.txn = Some(Txn { queued: Vec::new(), aborted: false });
                Reply::Status("OK".into())
            }
            "DISCARD" => {
                self.txn = None;
                Reply::Status("OK".into())
            }
            "EXEC" => match self.txn.take() {
                None => Reply::Error("ERR EXEC without MULTI".into()),
                Some(txn) if txn.aborted => Reply::Error(
                    "EXECABORT Transaction discarded because of previous errors.".into(),
                ),
                Some(txn) => Reply::Array(txn.queued.iter().map(|cmd| self.apply(cmd)).collect()),
            },
            _ => {
                let queueable = self.is_queueable(args);
                if let Some(txn) = self.txn.as_mut() {
                    if queueable {
                        txn.queued.push(args.to_vec());
                        Reply::Status("QUEUED".into())
                    } else {
                        txn.aborted = true;
                        Reply::Error(format!("ERR unknown command '{}'", args[0]))
                    }
                } else if queueable {
                    self.apply(args)
                } else {
                    Reply::Error(format!("ERR unknown command '{}'", args[0]))
                }
            }
        }
    }

    /// Queue-phase validation, the part the store does before EXEC.
    fn is_queueable(&self, args: &[String]) -> bool {
        match args[0].to_ascii_uppercase().as_str() {
            "HSET" => args.len() >= 4 && args.len() % 2 == 0,
            "SADD" => args.len() >= 3,
            "EXPIRE" => args.len() == 3,
            name if name.starts_with("SLURMJC.") => self.module_enabled,
            _ => false,
        }
    }

    fn apply(&mut self, args: &[String]) -> Reply {
        let name = args[0].to_ascii_uppercase();
        match name.as_str() {
            "HSET" => {
                let mut added = 0;
                for pair in args[2..].chunks(2) {
                    match self.store.hset(&args[1], &pair[0], &pair[1]) {
                        Ok(true) => added += 1,
                        Ok(false) => {}
                        Err(err) => return Reply::Error(err.to_string()),
                    }
                }
                Reply::Int(added)
            }
            "SADD" => {
                let mut added = 0;
                for member in &args[2..] {
                    match self.store.sadd(&args[1], member) {
                        Ok(true) => added += 1,
                        Ok(false) => {}
                        Err(err) => return Reply::Error(err.to_string()),
                    }
                }
                Reply::Int(added)
            }
            "EXPIRE" => match args[2].parse::<u64>() {
                Ok(ttl) => match self.store.expire(&args[1], ttl) {
                    Ok(set) => Reply::Int(i64::from(set)),
                    Err(err) => Reply::Error(err.to_string()),
                },
                Err(_) => Reply::Error("ERR value is not an integer or out of range".into()),
            },
            name if name.starts_with("SLURMJC.") => {
                let argv: Vec<&str> = args.iter().map(String::as_str).collect();
                match dispatch(&mut self.store, &self.cfg, &argv) {
                    Ok(reply) => convert(reply),
                    Err(err) => Reply::Error(err.to_string()),
                }
            }
            _ => Reply::Error(format!("ERR unknown command '{}'", args[0])),
        }
    }
}

fn convert(reply: ModuleReply) -> Reply {
    match reply {
        ModuleReply::Null => Reply::Nil,
        ModuleReply::Bulk(s) => Reply::Bulk(s),
        ModuleReply::Array(items) => Reply::Array(items.into_iter().map(convert).collect()),
    }
}

impl RedisLink for StoreHarness {
    fn append(&mut self, args: &[&str]) {
        self.pending.push(args.iter().map(|s| s.to_string()).collect());
    }

    fn drain(&mut self) -> Result<Vec<Reply>, LinkError> {
        let pending = std::mem::take(&mut self.pending);
        Ok(pending.iter().map(|cmd| self.execute(cmd)).collect())
    }

    fn command(&mut self, args: &[&str]) -> Result<Reply, LinkError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        Ok(self.execute(&args))
    }
}
