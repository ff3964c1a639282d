use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::error::DsparError;
use crate::protocol::channel::Channel;
use crate::transport::Rank;

/// A rank's incoming records, one arrival-ordered queue per channel. Receiving 'from any source'
///  takes the oldest record on a channel, receiving from a specific source takes the oldest
///  record from that source, leaving records from other sources in place.
///
/// The inbox is shared between the code delivering records (peers in the same process, or
///  network receive loops) and the rank's own receive calls.
pub struct Inbox {
    state: Mutex<InboxState>,
    notify: Notify,
}

#[derive(Default)]
struct InboxState {
    queues: FxHashMap<Channel, VecDeque<(Rank, Bytes)>>,
    aborted: Option<String>,
}

impl InboxState {
    fn check_aborted(&self) -> anyhow::Result<()> {
        match &self.aborted {
            Some(reason) => Err(DsparError::GroupAborted(reason.clone()).into()),
            None => Ok(()),
        }
    }
}

impl Inbox {
    pub fn new() -> Inbox {
        Inbox {
            state: Mutex::new(InboxState::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        // no code panics while holding the lock, but a poisoned state is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn deliver(&self, from: Rank, channel: Channel, buf: Bytes) {
        trace!("delivering {} bytes from rank {} on {:?}", buf.len(), from, channel);
        self.lock().queues
            .entry(channel)
            .or_default()
            .push_back((from, buf));
        self.notify.notify_waiters();
    }

    /// Mark the inbox as aborted, waking up all pending receives. Only the first reason is kept.
    pub fn abort(&self, reason: &str) {
        {
            let mut state = self.lock();
            if state.aborted.is_some() {
                return;
            }
            warn!("aborting: {}", reason);
            state.aborted = Some(reason.to_string());
        }
        self.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted.is_some()
    }

    pub async fn recv_any(&self, channel: Channel) -> anyhow::Result<(Rank, Bytes)> {
        loop {
            // registered before checking the queue so that no delivery can slip in between
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                state.check_aborted()?;
                if let Some(record) = state.queues.get_mut(&channel).and_then(|q| q.pop_front()) {
                    return Ok(record);
                }
            }
            notified.await;
        }
    }

    pub async fn recv_from(&self, from: Rank, channel: Channel) -> anyhow::Result<Bytes> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                state.check_aborted()?;
                if let Some(queue) = state.queues.get_mut(&channel) {
                    if let Some(pos) = queue.iter().position(|(sender, _)| *sender == from) {
                        if let Some((_, buf)) = queue.remove(pos) {
                            return Ok(buf);
                        }
                    }
                }
            }
            notified.await;
        }
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Inbox::new()
    }
}
