use super::RigActor;
use crate::types::FireReport;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

/// Work executed against the actor's state between two other commands.
pub(super) type Job = Box<dyn for<'a> FnOnce(&'a mut RigActor) -> BoxFuture<'a, ()> + Send>;

pub(super) enum RigCommand {
    Run(Job),
    Fire {
        reply_tx: oneshot::Sender<FireReport>,
    },
    Alarm {
        reply_tx: oneshot::Sender<Option<DateTime<Utc>>>,
    },
    Stop {
        reply_tx: oneshot::Sender<()>,
    },
}
