//! Live feed consumption.
//!
//! The `Watcher` is the Serving state of the controller: it suspends on the
//! next feed element, hands each notification to the reconciler, tracks
//! relists so vanished claims are pruned, and replays the store on the resync
//! tick. Cancellation is checked before every element.

use crate::classifier::Notification;
use crate::error::ControllerError;
use crate::reconciler::{Reconciled, Reconciler};
use claim_source::{ClaimEvent, ClaimEventStream, ClaimId};
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Consumes the claim feed on behalf of the controller.
#[derive(Debug)]
pub struct Watcher<'a> {
    reconciler: &'a mut Reconciler,
    resync_interval: Option<Duration>,
    relist: Option<HashSet<ClaimId>>,
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<'a> Watcher<'a> {
    /// Creates a watcher driving `reconciler`.
    pub fn new(reconciler: &'a mut Reconciler, resync_interval: Option<Duration>) -> Self {
        Self {
            reconciler,
            resync_interval,
            relist: None,
        }
    }

    /// Serves `feed` until `stop` fires (`Ok`) or the feed ends (`FeedTerminated`).
    pub async fn serve(
        mut self,
        mut feed: ClaimEventStream,
        stop: &CancellationToken,
    ) -> Result<(), ControllerError> {
        info!("Serving claim feed");
        let mut resync = self.resync_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => {
                    info!("Stop requested; no further claim events will be processed");
                    return Ok(());
                }
                () = next_tick(&mut resync) => {
                    self.reconciler.resync();
                }
                event = feed.next() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        error!("Claim feed closed without a stop request");
                        return Err(ControllerError::FeedTerminated(
                            "watch channel closed".to_string(),
                        ));
                    }
                },
            }
        }
    }

    /// Applies one feed event.
    pub fn handle(&mut self, event: ClaimEvent) {
        match event {
            ClaimEvent::RelistStarted => {
                debug!("Relist started");
                self.relist = Some(HashSet::new());
            }
            ClaimEvent::RelistDone => self.finish_relist(),
            event => {
                if let (Some(seen), ClaimEvent::Added(pvc) | ClaimEvent::Modified(pvc)) =
                    (self.relist.as_mut(), &event)
                {
                    if let Some(id) = ClaimId::of(pvc) {
                        seen.insert(id);
                    }
                }
                if let Some(notification) = Notification::from_event(event) {
                    if let Reconciled::Applied {
                        kind,
                        edge: Some(edge),
                    } = self.reconciler.reconcile(notification)
                    {
                        debug!("{:?} crossed overage edge {:?}", kind, edge);
                    }
                }
            }
        }
    }

    fn finish_relist(&mut self) {
        match self.relist.take() {
            Some(seen) => {
                let pruned = self.reconciler.prune_unseen(&seen);
                debug!(
                    "Relist done: {} claims seen, {} pruned",
                    seen.len(),
                    pruned.len()
                );
            }
            None => debug!("Relist done without a matching start; ignoring"),
        }
    }
}
