//! Lifecycle hooks.
//!
//! The persistence framework calls [`PersistHooks::before_persist`] right
//! before writing a record and [`PersistHooks::after_persist`] once the
//! write has finished, whatever its outcome. [`Denormalizer::persist_with`]
//! wraps a save closure with both.

use crate::engine::PersistCycle;
use crate::error::Error;
use crate::record::Model;
use crate::registry::Denormalizer;

/// Extension points of a save lifecycle.
pub trait PersistHooks<R> {
    /// Bring cached values up to date before the record is written.
    fn before_persist(&self, record: &mut R, cycle: &mut PersistCycle) -> Result<(), Error>;

    /// Reset per-pass state once the write is done.
    fn after_persist(&self, record: &R, cycle: &mut PersistCycle);
}

impl<R: Model> PersistHooks<R> for Denormalizer<R> {
    fn before_persist(&self, record: &mut R, cycle: &mut PersistCycle) -> Result<(), Error> {
        let recomputed = self.recompute_if_needed(record, cycle, false)?;
        tracing::debug!(record_type = R::RECORD_TYPE, recomputed, "before persist");
        Ok(())
    }

    fn after_persist(&self, _record: &R, cycle: &mut PersistCycle) {
        cycle.clear();
    }
}

impl<R: Model> Denormalizer<R> {
    /// Run `persist` between the before and after hooks.
    ///
    /// The cycle is cleared even when recomputation or `persist` fails.
    pub fn persist_with<T, E, F>(&self, record: &mut R, cycle: &mut PersistCycle, persist: F) -> Result<T, E>
    where
        F: FnOnce(&mut R) -> Result<T, E>,
        E: From<Error>,
    {
        let result = match self.before_persist(record, cycle) {
            Ok(()) => persist(record),
            Err(err) => Err(E::from(err)),
        };
        self.after_persist(record, cycle);
        result
    }
}
