use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::store::{SharedStore, TRAFFIC_ALERTED_KEY, TRAFFIC_MONTH_KEY};

use super::sink::AlertSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub bytes_used: u64,
    pub ceiling: u64,
    pub month: String,
    pub triggered_at: DateTime<Utc>,
}

/// Fires the over-ceiling alert at most once per month epoch.
///
/// The `alerted` flag lives in the shared store and holds the month it was
/// claimed for; it only counts as set while that month is the stored reset
/// month, so a rollover re-arms it without touching the flag. The claim is
/// taken before any sink runs. A failed notification leaves the flag set and
/// nothing is retried within the month.
#[derive(Clone)]
pub struct AlertDispatcher {
    store: Arc<dyn SharedStore>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn SharedStore>, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self {
            store,
            sinks: Arc::new(sinks),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_alerted(&self) -> bool {
        match (
            self.store.get(TRAFFIC_ALERTED_KEY),
            self.store.get(TRAFFIC_MONTH_KEY),
        ) {
            (Ok(flag), Ok(month)) => flag.is_some() && flag == month,
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "unable to read alert flag");
                false
            }
        }
    }

    /// Claims the alert for `epoch`, the reset month read before the usage
    /// that crossed the ceiling, and spawns the notifications. Returns the
    /// notification task when this call won the claim.
    pub fn maybe_alert(&self, epoch: u32, event: AlertEvent) -> Option<JoinHandle<()>> {
        let epoch = u64::from(epoch);
        let flag = match self.store.get(TRAFFIC_ALERTED_KEY) {
            Ok(flag) => flag,
            Err(err) => {
                warn!(error = %err, "unable to read alert flag; skipping alert");
                return None;
            }
        };
        if flag == Some(epoch) || !self.is_current_epoch(epoch) {
            return None;
        }

        match self.store.compare_and_swap(TRAFFIC_ALERTED_KEY, flag, epoch) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                warn!(error = %err, "unable to claim alert flag; skipping alert");
                return None;
            }
        }

        // The month may have rolled over while the claim was taken; a claim
        // for a past month is inert.
        if !self.is_current_epoch(epoch) {
            debug!(epoch, "month rolled over during alert claim; alert dropped");
            return None;
        }

        info!(
            bytes_used = event.bytes_used,
            ceiling = event.ceiling,
            month = %event.month,
            "traffic ceiling reached, dispatching alert"
        );

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                error!("no async runtime available; traffic alert dropped");
                return None;
            }
        };

        let sinks = Arc::clone(&self.sinks);
        Some(handle.spawn(async move {
            if sinks.is_empty() {
                debug!("no alert sinks configured");
            }
            for sink in sinks.iter() {
                match sink.notify(&event).await {
                    Ok(()) => info!(sink = sink.name(), "traffic alert delivered"),
                    Err(err) => error!(sink = sink.name(), error = %err, "traffic alert failed"),
                }
            }
        }))
    }

    fn is_current_epoch(&self, epoch: u64) -> bool {
        match self.store.get(TRAFFIC_MONTH_KEY) {
            Ok(Some(month)) => month == epoch,
            Ok(None) => true,
            Err(err) => {
                warn!(error = %err, "reset month unavailable; skipping alert");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::alert::AlertError;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn notify(&self, _event: &AlertEvent) -> Result<(), AlertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AlertError::WebhookStatus(500))
            } else {
                Ok(())
            }
        }
    }

    const MAY: u32 = 5;

    fn event() -> AlertEvent {
        AlertEvent {
            bytes_used: 10,
            ceiling: 10,
            month: "2024-05".to_string(),
            triggered_at: Utc::now(),
        }
    }

    fn may_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set(TRAFFIC_MONTH_KEY, MAY as u64).unwrap();
        store
    }

    fn dispatcher_with(store: &Arc<MemoryStore>, sink: &Arc<CountingSink>) -> AlertDispatcher {
        let sink: Arc<dyn AlertSink> = sink.clone();
        AlertDispatcher::new(store.clone(), vec![sink])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_alert_once() {
        let sink = Arc::new(CountingSink::default());
        let dispatcher = dispatcher_with(&may_store(), &sink);

        let callers: Vec<_> = (0..32)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.maybe_alert(MAY, event()) })
            })
            .collect();

        let mut dispatched = Vec::new();
        for caller in callers {
            if let Some(task) = caller.await.unwrap() {
                dispatched.push(task);
            }
        }
        assert_eq!(dispatched.len(), 1);
        for task in dispatched {
            task.await.unwrap();
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_alerted());
    }

    #[tokio::test]
    async fn failed_delivery_keeps_flag_set() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let dispatcher = dispatcher_with(&may_store(), &sink);

        dispatcher.maybe_alert(MAY, event()).unwrap().await.unwrap();
        assert!(dispatcher.is_alerted());
        assert!(dispatcher.maybe_alert(MAY, event()).is_none());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_month_rearms_the_alert() {
        let sink = Arc::new(CountingSink::default());
        let store = may_store();
        let dispatcher = dispatcher_with(&store, &sink);

        dispatcher.maybe_alert(MAY, event()).unwrap().await.unwrap();
        store.set(TRAFFIC_MONTH_KEY, 6).unwrap();
        assert!(!dispatcher.is_alerted());

        dispatcher.maybe_alert(6, event()).unwrap().await.unwrap();
        assert!(dispatcher.is_alerted());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn claim_for_a_past_month_is_refused() {
        let sink = Arc::new(CountingSink::default());
        let store = may_store();
        let dispatcher = dispatcher_with(&store, &sink);
        store.set(TRAFFIC_MONTH_KEY, 6).unwrap();

        assert!(dispatcher.maybe_alert(MAY, event()).is_none());
        assert!(!dispatcher.is_alerted());
        assert_eq!(store.get(TRAFFIC_ALERTED_KEY).unwrap(), None);

        dispatcher.maybe_alert(6, event()).unwrap().await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn claim_without_runtime_still_sets_flag() {
        let dispatcher = AlertDispatcher::new(may_store(), Vec::new());
        assert!(dispatcher.maybe_alert(MAY, event()).is_none());
        assert!(dispatcher.is_alerted());
    }
}
