//! The three passes a timer fire runs, in order: dispatch, merge, witness.
//!
//! Each pass owns no state of its own. It reads and writes the rig through a
//! [`RigStore`](crate::db::RigStore) and reaches the outside world only through
//! the collaborator ports, every call bounded by the external-call timeout.

mod dispatch;
mod merge;
mod witness;


pub use dispatch::run_dispatch;
pub use merge::run_merge;
pub use witness::{run_patrol, STUCK_DISPATCH_LABEL};

use crate::error::{GastownError, Result};
use crate::ports::PortFuture;
use std::time::Duration;

/// Awaits an external call, converting an elapsed deadline into
/// `ExternalUnavailable`.
pub(crate) async fn bounded<T>(limit: Duration, what: &str, call: PortFuture<'_, T>) -> Result<T> {
    tokio::time::timeout(limit, call).await.map_err(|_elapsed| {
        GastownError::ExternalUnavailable(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))
    })?
}
