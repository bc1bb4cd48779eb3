//! Per-tab tracking of live subscriptions and their messages.
//!
//! Each tab owns at most one generation of subscription ids. Running a new
//! batch for the tab kills the previous generation before the new one is
//! registered. Notifications flow from one channel per subscription into a
//! single pump task, which appends them to the owning tab's buffer and drops
//! anything tagged with a superseded generation.

use futures_util::stream::{self, BoxStream, SelectAll, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::scanner::live_statement_indices;
use crate::connection::ConnectionSlot;
use crate::error::Result;
use crate::models::{LiveMessage, LiveNotification, QueryResponse};
use crate::query::QueryExecutor;
use crate::transport::Transport;

/// Default number of messages kept per tab.
pub const DEFAULT_MESSAGE_CAPACITY: usize = 50;

#[derive(Debug, Default)]
struct TabLive {
    generation: u64,
    subscriptions: Vec<String>,
    /// Newest first
    messages: VecDeque<LiveMessage>,
    is_live: bool,
}

type Tabs = Arc<Mutex<HashMap<String, TabLive>>>;

struct Attach {
    tab: String,
    generation: u64,
    subscription_id: String,
    timestamp: i64,
    receiver: mpsc::Receiver<LiveNotification>,
}

/// Outcome of committing a tab's new generation.
#[derive(Debug, PartialEq, Eq)]
enum Commit {
    Registered,
    /// A later run or cancel took over the tab.
    Superseded,
    /// The session the batch ran on is gone; the tab was left empty.
    SessionLost,
}

struct Tagged {
    tab: String,
    generation: u64,
    subscription_id: String,
    timestamp: i64,
    notification: LiveNotification,
}

/// Tracks live subscriptions per tab.
pub struct LiveQueryRegistry {
    slot: Arc<ConnectionSlot>,
    executor: QueryExecutor,
    capacity: usize,
    tabs: Tabs,
    pump: Mutex<Option<mpsc::UnboundedSender<Attach>>>,
}

impl LiveQueryRegistry {
    pub fn new(slot: Arc<ConnectionSlot>, executor: QueryExecutor, capacity: usize) -> Self {
        Self {
            slot,
            executor,
            capacity: capacity.max(1),
            tabs: Arc::new(Mutex::new(HashMap::new())),
            pump: Mutex::new(None),
        }
    }

    /// Run a user batch for `tab` and replace the tab's live generation.
    ///
    /// Blank text is a no-op. A missing session or malformed variables fail
    /// before anything about the tab changes.
    pub async fn run_user_query(
        &self,
        tab: &str,
        text: &str,
        variables: Option<&str>,
    ) -> Result<Vec<QueryResponse>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let live_indices = live_statement_indices(text);
        let protocol = self.slot.protocol();
        let live_supported = protocol.map_or(false, |p| p.supports_live_queries());

        if !live_indices.is_empty() && !live_supported {
            self.slot.handlers().emit_warning(format!(
                "Live queries are not supported over the {} protocol",
                protocol.map(|p| p.to_string()).unwrap_or_else(|| "current".to_string())
            ));
        }

        let epoch = self.slot.epoch();
        let responses = self.executor.execute(text, variables).await?;

        let new_ids: Vec<String> = if live_supported {
            live_indices
                .iter()
                .filter_map(|&index| responses.get(index))
                .filter_map(QueryResponse::live_query_id)
                .map(|id| id.to_string())
                .collect()
        } else {
            Vec::new()
        };

        let (old_ids, generation) = self.begin_generation(tab);
        let transport = self.slot.active_transport().ok();
        if let Some(transport) = &transport {
            kill_all(transport.as_ref(), &old_ids).await;
        }

        match self.commit_generation(tab, generation, epoch, &new_ids) {
            Commit::Registered => {},
            Commit::Superseded => {
                log::debug!("[LIVE] Tab {} was superseded while running, dropping new ids", tab);
                if let Some(transport) = &transport {
                    kill_all(transport.as_ref(), &new_ids).await;
                }
                return Ok(responses);
            },
            Commit::SessionLost => {
                log::debug!(
                    "[LIVE] Session ended while tab {} was running, forgetting {} id(s)",
                    tab,
                    new_ids.len()
                );
                return Ok(responses);
            },
        }

        if !new_ids.is_empty() {
            log::info!("[LIVE] Tab {} registered {} live query id(s)", tab, new_ids.len());
        }

        if let Some(transport) = transport {
            let timestamp = chrono::Utc::now().timestamp_millis();
            for id in &new_ids {
                match transport.subscribe_live(id).await {
                    Ok(receiver) => self.attach(Attach {
                        tab: tab.to_string(),
                        generation,
                        subscription_id: id.clone(),
                        timestamp,
                        receiver,
                    }),
                    Err(e) => log::warn!("[LIVE] Failed to subscribe to {}: {}", id, e),
                }
            }
        }

        Ok(responses)
    }

    /// Kill every subscription of `tab` and mark it not live.
    pub async fn cancel(&self, tab: &str) {
        let old_ids = {
            let mut tabs = self.tabs.lock();
            match tabs.get_mut(tab) {
                Some(state) => {
                    state.generation += 1;
                    state.is_live = false;
                    std::mem::take(&mut state.subscriptions)
                },
                None => return,
            }
        };

        if old_ids.is_empty() {
            return;
        }
        match self.slot.active_transport() {
            Ok(transport) => kill_all(transport.as_ref(), &old_ids).await,
            Err(_) => log::debug!("[LIVE] Not connected, forgetting {} id(s) of tab {}", old_ids.len(), tab),
        }
    }

    /// Forget every subscription of every tab without contacting the
    /// transport. Used once the session is gone; message history stays.
    pub fn clear_all(&self) {
        let mut tabs = self.tabs.lock();
        for state in tabs.values_mut() {
            state.generation += 1;
            state.is_live = false;
            state.subscriptions.clear();
        }
    }

    /// Drop a tab entirely, including its messages.
    pub async fn remove_tab(&self, tab: &str) {
        self.cancel(tab).await;
        self.tabs.lock().remove(tab);
    }

    /// Messages of `tab`, newest first.
    pub fn messages(&self, tab: &str) -> Vec<LiveMessage> {
        self.tabs
            .lock()
            .get(tab)
            .map(|state| state.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_live(&self, tab: &str) -> bool {
        self.tabs.lock().get(tab).map_or(false, |state| state.is_live)
    }

    /// Subscription ids of the tab's current generation.
    pub fn subscriptions(&self, tab: &str) -> Vec<String> {
        self.tabs
            .lock()
            .get(tab)
            .map(|state| state.subscriptions.clone())
            .unwrap_or_default()
    }

    /// Take the tab's previous generation and start a new, empty one.
    fn begin_generation(&self, tab: &str) -> (Vec<String>, u64) {
        let mut tabs = self.tabs.lock();
        let state = tabs.entry(tab.to_string()).or_default();
        state.generation += 1;
        state.is_live = false;
        state.messages.clear();
        (std::mem::take(&mut state.subscriptions), state.generation)
    }

    /// Install `ids` as the tab's generation.
    ///
    /// Runs under the tabs lock, which the session teardown also takes after
    /// moving the slot to a new epoch, so a batch that outlived its session
    /// can never register ids once `clear_all` has run.
    fn commit_generation(
        &self,
        tab: &str,
        generation: u64,
        epoch: u64,
        ids: &[String],
    ) -> Commit {
        let mut tabs = self.tabs.lock();
        let state = match tabs.get_mut(tab) {
            Some(state) if state.generation == generation => state,
            _ => return Commit::Superseded,
        };

        if self.slot.epoch() != epoch || self.slot.active_transport().is_err() {
            state.subscriptions.clear();
            state.is_live = false;
            return Commit::SessionLost;
        }

        state.subscriptions = ids.to_vec();
        state.is_live = !ids.is_empty();
        Commit::Registered
    }

    fn attach(&self, attach: Attach) {
        let mut pump = self.pump.lock();
        let attach = match pump.as_ref() {
            Some(tx) => match tx.send(attach) {
                Ok(()) => return,
                Err(mpsc::error::SendError(attach)) => attach,
            },
            None => attach,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_task(rx, self.tabs.clone(), self.capacity));
        if tx.send(attach).is_err() {
            log::warn!("[LIVE] Notification pump exited immediately");
        }
        *pump = Some(tx);
    }
}

async fn kill_all(transport: &dyn Transport, ids: &[String]) {
    for id in ids {
        if let Err(e) = transport.kill(id).await {
            log::warn!("[LIVE] Failed to kill live query {}: {}", id, e);
        }
    }
}

fn tagged_stream(attach: Attach) -> BoxStream<'static, Tagged> {
    let Attach {
        tab,
        generation,
        subscription_id,
        timestamp,
        receiver,
    } = attach;

    stream::unfold(receiver, move |mut receiver| {
        let tab = tab.clone();
        let subscription_id = subscription_id.clone();
        async move {
            receiver.recv().await.map(|notification| {
                (
                    Tagged {
                        tab,
                        generation,
                        subscription_id,
                        timestamp,
                        notification,
                    },
                    receiver,
                )
            })
        }
    })
    .boxed()
}

/// Single receiver for every subscription channel.
async fn pump_task(mut attach_rx: mpsc::UnboundedReceiver<Attach>, tabs: Tabs, capacity: usize) {
    let mut streams: SelectAll<BoxStream<'static, Tagged>> = SelectAll::new();

    loop {
        tokio::select! {
            attach = attach_rx.recv() => match attach {
                Some(attach) => streams.push(tagged_stream(attach)),
                None => return,
            },
            Some(tagged) = streams.next(), if !streams.is_empty() => {
                deliver(&tabs, capacity, tagged);
            },
        }
    }
}

fn deliver(tabs: &Tabs, capacity: usize, tagged: Tagged) {
    let mut tabs = tabs.lock();
    let Some(state) = tabs.get_mut(&tagged.tab) else {
        return;
    };
    if state.generation != tagged.generation {
        log::debug!(
            "[LIVE] Dropping notification for superseded live query {}",
            tagged.subscription_id
        );
        return;
    }

    state.messages.push_front(LiveMessage {
        id: Uuid::new_v4().to_string(),
        subscription_id: tagged.subscription_id,
        action: tagged.notification.action,
        data: tagged.notification.data,
        timestamp: tagged.timestamp,
    });
    state.messages.truncate(capacity);
}
