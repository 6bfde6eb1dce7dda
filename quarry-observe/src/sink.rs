//! The sink contract.

use crate::ChangeBatch;

/// A list consumer (table or grid adapter) receiving change batches.
///
/// Delivery is strictly bracketed: `will_change` once, `apply` with the
/// whole batch, `did_change` once. The sink treats the bracket as a single
/// atomic UI transaction. Receiving structural operations outside a bracket,
/// or a second `will_change` before the matching `did_change`, is a
/// programming error on the bridge side — test sinks assert against it.
///
/// Sinks must not save the store from inside the bracket.
pub trait ChangeSink {
    fn will_change(&mut self);
    fn apply(&mut self, batch: &ChangeBatch);
    fn did_change(&mut self);
}
