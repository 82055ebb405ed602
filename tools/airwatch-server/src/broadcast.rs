// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic membership and fan-out.
//!
//! A deployment uses one topic shape: a single global topic, or one topic per
//! sensor. Each subscriber owns a bounded queue; publishing never waits on a
//! subscriber. A subscriber whose queue is full or closed is removed from its
//! topic on the spot.

use airwatch::{Publish, Reading, SensorId};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// Topic layout of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TopicShape {
    /// Every subscriber receives every reading.
    Global,
    /// Subscribers receive only their sensor's readings.
    PerSensor,
}

/// One topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKey {
    Global,
    Sensor(SensorId),
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKey::Global => f.write_str("sensor_data"),
            TopicKey::Sensor(id) => write!(f, "sensor_data_{}", id),
        }
    }
}

#[derive(Default)]
struct Topic {
    members: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<str>>>>,
}

/// Counters exposed on `/health` and logged by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    pub topics: usize,
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub evicted: u64,
}

/// Membership registry plus fan-out.
pub struct BroadcastRouter {
    shape: TopicShape,
    queue_depth: usize,
    topics: DashMap<TopicKey, Topic>,
    /// Live memberships, reserved before the topic insert.
    active: AtomicUsize,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

impl BroadcastRouter {
    pub fn new(shape: TopicShape, queue_depth: usize) -> Self {
        Self {
            shape,
            queue_depth: queue_depth.max(1),
            topics: DashMap::new(),
            active: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn shape(&self) -> TopicShape {
        self.shape
    }

    /// Topic a reading from `sensor_id` is published to.
    pub fn topic_for(&self, sensor_id: SensorId) -> TopicKey {
        match self.shape {
            TopicShape::Global => TopicKey::Global,
            TopicShape::PerSensor => TopicKey::Sensor(sensor_id),
        }
    }

    /// Topic for a subscription path, or `None` if the path does not fit the
    /// deployment's shape.
    pub fn resolve(&self, sensor_id: Option<SensorId>) -> Option<TopicKey> {
        match (self.shape, sensor_id) {
            (TopicShape::Global, None) => Some(TopicKey::Global),
            (TopicShape::PerSensor, Some(id)) => Some(TopicKey::Sensor(id)),
            _ => None,
        }
    }

    /// Join a topic. Membership ends when the returned guard is dropped.
    pub fn join(self: &Arc<Self>, key: TopicKey) -> Membership {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.attach(key)
    }

    /// Join a topic unless `limit` memberships are already live.
    ///
    /// The slot is reserved atomically, so concurrent callers never exceed
    /// the limit.
    pub fn try_join(self: &Arc<Self>, key: TopicKey, limit: usize) -> Option<Membership> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        Some(self.attach(key))
    }

    fn attach(self: &Arc<Self>, key: TopicKey) -> Membership {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);

        // Insert while holding the shard lock so `leave` cannot drop the topic
        // between lookup and insert.
        let topic = self.topics.entry(key).or_default();
        topic.members.lock().insert(id, tx);
        drop(topic);

        debug!(topic = %key, subscriber = id, "joined");
        Membership {
            router: Arc::clone(self),
            key,
            id,
            rx,
        }
    }

    fn leave(&self, key: &TopicKey, id: SubscriberId) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(topic) = self.topics.get(key) {
            topic.members.lock().remove(&id);
        }
        self.topics
            .remove_if(key, |_, topic| topic.members.lock().is_empty());
        debug!(topic = %key, subscriber = id, "left");
    }

    /// Deliver `payload` to every member of `key`.
    ///
    /// Returns the number of members that accepted it.
    pub fn publish_to(&self, key: &TopicKey, payload: Arc<str>) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let Some(topic) = self.topics.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        topic.members.lock().retain(|id, tx| match tx.try_send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(topic = %key, subscriber = *id, "subscriber queue full, dropping subscriber");
                self.evicted.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(topic = %key, subscriber = *id, "subscriber gone");
                false
            }
        });

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    pub fn member_count(&self, key: &TopicKey) -> usize {
        self.topics
            .get(key)
            .map(|t| t.members.lock().len())
            .unwrap_or(0)
    }

    /// Live memberships across all topics, evicted ones included until
    /// their session ends.
    pub fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            topics: self.topics.len(),
            subscribers: self.subscriber_count(),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Publish for BroadcastRouter {
    fn publish(&self, reading: &Reading) {
        let key = self.topic_for(reading.sensor_id());
        let payload: Arc<str> = reading.broadcast_json().into();
        let delivered = self.publish_to(&key, payload);
        debug!(topic = %key, delivered, "reading broadcast");
    }
}

/// A subscriber's place in one topic.
///
/// Dropping it (normal close, error, task abort) removes the subscriber.
pub struct Membership {
    router: Arc<BroadcastRouter>,
    key: TopicKey,
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Membership {
    pub fn key(&self) -> TopicKey {
        self.key
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next payload, or `None` once the router dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.router.leave(&self.key, self.id);
    }
}
