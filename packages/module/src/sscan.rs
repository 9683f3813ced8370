//! Cursor over an incremental set scan.
//!
//! The store's scan primitive hands back `(cursor, chunk)` pairs and
//! requires callers to re-issue the scan until the cursor comes back
//! zero. This cursor hides that protocol behind a next/EOF/error
//! interface: the matcher asks for one member at a time and never sees
//! the chunking.

use crate::error::VerbError;
use crate::store::Store;

/// Stateful iterator over the members of one set.
pub struct ScanCursor {
    set: String,
    count: usize,
    /// `None` until the first scan call is issued.
    cursor: Option<u64>,
    chunk: Vec<String>,
    ix: usize,
    err: Option<VerbError>,
}

impl ScanCursor {
    /// `count` is the chunk-size hint forwarded to every scan call.
    pub fn new(set: impl Into<String>, count: usize) -> Self {
        Self {
            set: set.into(),
            count,
            cursor: None,
            chunk: Vec::new(),
            ix: 0,
            err: None,
        }
    }

    /// Fetch the next member. `Ok(None)` is end-of-set. Errors are sticky:
    /// once a scan call fails, every subsequent `next` repeats the error.
    pub fn next(&mut self, store: &impl Store) -> Result<Option<String>, VerbError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }

        // First call starts the scan from the zero cursor.
        if self.cursor.is_none() {
            self.scan(store, 0)?;
        }

        // Keep scanning while the chunk is drained and the loop is not done.
        while self.ix >= self.chunk.len() {
            match self.cursor {
                Some(0) | None => return Ok(None),
                Some(cursor) => self.scan(store, cursor)?,
            }
        }

        let member = self.chunk[self.ix].clone();
        self.ix += 1;
        Ok(Some(member))
    }

    /// The sticky error from a failed scan call, if any.
    pub fn last_error(&self) -> Option<&VerbError> {
        self.err.as_ref()
    }

    fn scan(&mut self, store: &impl Store, cursor: u64) -> Result<(), VerbError> {
        match store.sscan(&self.set, cursor, self.count) {
            Ok((next, chunk)) => {
                self.cursor = Some(next);
                self.chunk = chunk;
                self.ix = 0;
                Ok(())
            }
            Err(err) => {
                self.err = Some(err.clone());
                Err(err)
            }
        }
    }
}
