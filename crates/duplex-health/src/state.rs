//! Recorded serving statuses.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::watch;

use crate::status::{ServingStatus, OVERALL};

/// Status per service name plus the closed flag.
///
/// The empty name is the overall status. Watch channels exist only while
/// someone holds a receiver; abandoned channels are pruned on the next
/// subscribe or update.
#[derive(Debug)]
pub(crate) struct HealthState {
    statuses: HashMap<String, ServingStatus>,
    watchers: HashMap<String, watch::Sender<ServingStatus>>,
    closed: bool,
}

impl HealthState {
    pub(crate) fn new<'a>(services: impl IntoIterator<Item = &'a str>) -> Self {
        let mut statuses: HashMap<String, ServingStatus> = services
            .into_iter()
            .map(|name| (name.to_string(), ServingStatus::Unknown))
            .collect();
        statuses.insert(OVERALL.to_string(), ServingStatus::Serving);
        Self {
            statuses,
            watchers: HashMap::new(),
            closed: false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn get(&self, service: &str) -> Option<ServingStatus> {
        self.statuses.get(service).copied()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, ServingStatus> {
        self.statuses
            .iter()
            .map(|(name, status)| (name.clone(), *status))
            .collect()
    }

    /// Records a status. Returns `false` once closed.
    pub(crate) fn set(&mut self, service: &str, status: ServingStatus) -> bool {
        if self.closed {
            return false;
        }
        self.statuses.insert(service.to_string(), status);
        self.prune();
        if let Some(sender) = self.watchers.get(service) {
            sender.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
        }
        true
    }

    /// Subscribes to a service, creating its channel on first use.
    pub(crate) fn subscribe(&mut self, service: &str) -> watch::Receiver<ServingStatus> {
        self.prune();
        let current = self.get(service).unwrap_or(ServingStatus::ServiceUnknown);
        self.watchers
            .entry(service.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    fn prune(&mut self) {
        self.watchers.retain(|_, sender| sender.receiver_count() > 0);
    }

    #[cfg(test)]
    pub(crate) fn watched(&self) -> usize {
        self.watchers.len()
    }

    /// Forces every known service to `NotServing`, freezes the state and
    /// drops the watch channels so watchers end after the final update.
    pub(crate) fn close(&mut self) -> Vec<String> {
        let names: Vec<String> = self.statuses.keys().cloned().collect();
        for name in &names {
            self.set(name, ServingStatus::NotServing);
        }
        self.closed = true;
        self.watchers.clear();
        names
    }
}
