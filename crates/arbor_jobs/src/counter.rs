//! The demo counter task.
//!
//! Each iteration reads `<output>/last_string`, advances it through
//! "1".."8" and writes it back.

use crate::{JobRecord, WorkContext, WorkOutcome, WorkerTask, ensure_job};
use arbor_core::{CoreResult, Node, join_path};
use arbor_store::LocalStore;

/// Name of the counter value below the output path
pub const LAST_STRING: &str = "last_string";

/// Largest counter value before wrapping to 1
pub const CYCLE: u32 = 8;

/// Counter work function
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterTask;

impl CounterTask {
    /// Value following `last`; anything unparsable restarts at 1
    #[must_use]
    pub fn next_value(last: &str) -> u32 {
        last.trim().parse::<u32>().map_or(1, |n| n % CYCLE + 1)
    }

    /// Issue the counter job and seed its output unless already present
    ///
    /// # Errors
    ///
    /// Returns the store error if a write fails
    pub fn prepare(store: &LocalStore, job_path: &str, record: &JobRecord) -> CoreResult<()> {
        ensure_job(store, job_path, record)?;
        let seed = join_path(&record.output_path, LAST_STRING);
        if !store.has(&seed) {
            store.put(Node::str(LAST_STRING, CYCLE.to_string()), &seed)?;
        }
        Ok(())
    }
}

impl WorkerTask for CounterTask {
    fn work(&self, ctx: &WorkContext<'_>) -> CoreResult<WorkOutcome> {
        let path = ctx.output(LAST_STRING);
        let last = ctx
            .store
            .get_with(&path, |n| n.as_str().map(str::to_string))?
            .unwrap_or_default();
        let next = Self::next_value(&last);
        ctx.store.put(Node::str(LAST_STRING, next.to_string()), &path)?;
        Ok(WorkOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle() {
        assert_eq!(CounterTask::next_value("8"), 1);
        assert_eq!(CounterTask::next_value("1"), 2);
        assert_eq!(CounterTask::next_value("7"), 8);
        assert_eq!(CounterTask::next_value("garbage"), 1);
    }
}
