//! The satellite-to-keyspace mapping table.

use std::sync::Arc;

/// Process-wide, read-only mapping from satellite ids to keyspace names.
///
/// Built once at startup from configuration and shared by every pipeline
/// without synchronization. A satellite with no mapping is a hole in the
/// deployment's data layout: requests touching it report an error rather
/// than guessing.
#[derive(Debug, Default)]
pub struct SatMap {
    names: Vec<Option<Arc<str>>>,
}

impl SatMap {
    /// Build the table from (satellite, keyspace) pairs.
    ///
    /// Later pairs win on duplicate satellite ids. Negative satellite ids
    /// are ignored.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: AsRef<str>,
    {
        let mut names: Vec<Option<Arc<str>>> = Vec::new();
        for (sat, name) in pairs {
            let Ok(idx) = usize::try_from(sat) else {
                continue;
            };
            if idx >= names.len() {
                names.resize(idx + 1, None);
            }
            names[idx] = Some(name.as_ref().into());
        }
        Self { names }
    }

    /// The keyspace name for a satellite id, if mapped.
    pub fn keyspace(&self, sat: i32) -> Option<Arc<str>> {
        let idx = usize::try_from(sat).ok()?;
        self.names.get(idx)?.clone()
    }
}
