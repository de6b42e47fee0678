//! Background lifecycle-event publisher.
//!
//! API handlers enqueue and return immediately; a small pool of workers
//! drains the queue and performs the network publish with the retry
//! policy. Jobs are routed to workers by partition key, so events for the
//! same entity keep their produce order all the way to the broker.
//!
//! Nothing in here propagates an error back into the calling mutation:
//! publishing is best-effort and failures are logged.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::EventsConfig;
use crate::dapr::DaprClient;
use crate::db::models::Task;
use crate::events::schemas::{TaskEvent, TaskEventKind};
use crate::events::TOPIC_TASK_EVENTS;

#[derive(Debug)]
struct PublishJob {
    topic: &'static str,
    event_type: String,
    partition_key: String,
    payload: Value,
}

pub struct EventPublisher {
    senders: Vec<mpsc::Sender<PublishJob>>,
    enabled: bool,
}

impl EventPublisher {
    /// Spawn the worker pool. Workers run until the publisher is dropped
    /// and their queues drain.
    pub fn new(client: Arc<DaprClient>, config: &EventsConfig) -> Self {
        let mut senders = Vec::with_capacity(config.workers);

        for worker in 0..config.workers {
            let (tx, mut rx) = mpsc::channel::<PublishJob>(config.queue_capacity);
            let client = client.clone();
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    if let Err(e) = client
                        .publish_event(
                            job.topic,
                            &job.event_type,
                            Some(&job.partition_key),
                            job.payload,
                        )
                        .await
                    {
                        tracing::error!(
                            worker,
                            topic = job.topic,
                            event_type = %job.event_type,
                            key = %job.partition_key,
                            "Dropping event after exhausted publish retries: {}",
                            e
                        );
                    }
                }
            });
            senders.push(tx);
        }

        EventPublisher {
            senders,
            enabled: config.publishing_enabled,
        }
    }

    /// Publish a single task lifecycle event.
    pub fn publish_task_event(&self, kind: TaskEventKind, task: &Task) {
        let event = TaskEvent::new(kind, task);
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize task event: {}", e);
                return;
            }
        };
        self.enqueue(
            TOPIC_TASK_EVENTS,
            kind.as_str().to_string(),
            task.id.clone(),
            payload,
        );
    }

    /// Publish the pair of events describing a completion transition:
    /// `task.updated` then `task.completed`, in that order, on the same
    /// partition key.
    pub fn publish_task_completion(&self, task: &Task) {
        self.publish_task_event(TaskEventKind::Updated, task);
        self.publish_task_event(TaskEventKind::Completed, task);
    }

    fn enqueue(&self, topic: &'static str, event_type: String, partition_key: String, payload: Value) {
        if !self.enabled {
            tracing::debug!(topic, "Event publishing disabled, skipping {}", event_type);
            return;
        }

        let index = worker_index(&partition_key, self.senders.len());
        let job = PublishJob {
            topic,
            event_type,
            partition_key,
            payload,
        };

        match self.senders[index].try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    topic,
                    event_type = %job.event_type,
                    "Publish queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    topic,
                    event_type = %job.event_type,
                    "Publish worker gone, dropping event"
                );
            }
        }
    }
}

fn worker_index(partition_key: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    partition_key.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}
