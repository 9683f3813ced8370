//! Reply values a verb hands back to the hosting store.

/// The subset of the store's reply surface the verbs produce. `INDEX` and
/// `MATCH` reply with a key name or the typed null; `FETCH` replies with
/// an array of fixed-width slot arrays in which absent slots are null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Null,
    Bulk(String),
    Array(Vec<Reply>),
}

impl Reply {
    /// Inner arrays of a `FETCH` reply: one entry per catalogue slot.
    pub fn slot_row(slots: Vec<Option<String>>) -> Reply {
        Reply::Array(
            slots
                .into_iter()
                .map(|s| s.map_or(Reply::Null, Reply::Bulk))
                .collect(),
        )
    }
}
