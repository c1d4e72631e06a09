use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::{NotificationEvent, NotificationSink, Notifier, NotifyError};

/// How many delivered event ids the worker remembers for de-duplication.
const SEEN_CAPACITY: usize = 10_000;

const DEFAULT_DELIVERY_ATTEMPTS: u32 = 3;
const DEFAULT_DELIVERY_BACKOFF: Duration = Duration::from_millis(50);

/// Enqueues notifications on a bounded in-process channel.
///
/// `enqueue` uses `try_send`, so a full queue fails fast with
/// `NotifyError::QueueFull` instead of applying back-pressure to the order path.
#[derive(Debug, Clone)]
pub struct QueueNotifier {
    sender: mpsc::Sender<NotificationEvent>,
}

impl QueueNotifier {
    /// Creates a queue of `capacity` messages and the worker that drains it.
    pub fn with_worker<K: NotificationSink>(
        capacity: usize,
        sink: K,
    ) -> (Self, NotificationWorker<K>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, NotificationWorker::new(receiver, sink))
    }
}

#[async_trait]
impl Notifier for QueueNotifier {
    async fn enqueue(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(NotifyError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(NotifyError::QueueClosed),
        }
    }
}

/// Outcome of handling one queued notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Duplicate,
    Dropped,
}

/// Drains the notification queue into a [`NotificationSink`].
///
/// Events whose `event_id` was already delivered are skipped. A failing
/// delivery is retried a bounded number of times, then dropped with an
/// error log.
pub struct NotificationWorker<K> {
    receiver: mpsc::Receiver<NotificationEvent>,
    sink: K,
    seen: HashSet<Uuid>,
    seen_order: VecDeque<Uuid>,
    max_attempts: u32,
    backoff: Duration,
}

impl<K: NotificationSink> NotificationWorker<K> {
    pub fn new(receiver: mpsc::Receiver<NotificationEvent>, sink: K) -> Self {
        Self {
            receiver,
            sink,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            max_attempts: DEFAULT_DELIVERY_ATTEMPTS,
            backoff: DEFAULT_DELIVERY_BACKOFF,
        }
    }

    pub fn with_delivery_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Runs until every sender has been dropped and the queue is empty.
    pub async fn run(mut self) {
        tracing::info!("notification worker started");
        while let Some(event) = self.receiver.recv().await {
            self.handle(event).await;
        }
        tracing::info!("notification queue closed, worker stopped");
    }

    /// Handles a single event.
    pub async fn handle(&mut self, event: NotificationEvent) -> Delivery {
        let event_id = event.event_id();
        if self.seen.contains(&event_id) {
            tracing::debug!(%event_id, "duplicate notification skipped");
            metrics::counter!("notifications_duplicates_total").increment(1);
            return Delivery::Duplicate;
        }

        let mut attempt = 1;
        loop {
            match self.sink.deliver(&event).await {
                Ok(()) => {
                    self.remember(event_id);
                    metrics::counter!("notifications_delivered_total").increment(1);
                    return Delivery::Delivered;
                }
                Err(err) if attempt < self.max_attempts => {
                    tracing::warn!(%event_id, attempt, error = %err, "notification delivery failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        %event_id,
                        order_id = %event.order_id(),
                        attempts = attempt,
                        error = %err,
                        "notification dropped"
                    );
                    metrics::counter!("notifications_dropped_total").increment(1);
                    return Delivery::Dropped;
                }
            }
        }
    }

    fn remember(&mut self, event_id: Uuid) {
        if self.seen_order.len() == SEEN_CAPACITY
            && let Some(oldest) = self.seen_order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.seen.insert(event_id);
        self.seen_order.push_back(event_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use common::{OrderId, UserId};
    use domain::{Money, NewOrder, NewProduct, StockRequest};

    use super::*;
    use crate::notification::{InMemoryNotifier, LogSink};

    fn sample_event() -> NotificationEvent {
        let widget =
            NewProduct::new("W", "Widget", Money::from_cents(500), 5).into_product(Utc::now());
        let order = NewOrder::new(UserId::new(), vec![StockRequest::new(widget.id, 1)])
            .into_order(OrderId::new(), &[widget], Utc::now())
            .unwrap();
        NotificationEvent::order_created(&order)
    }

    /// Fails the first `failures` deliveries.
    struct FlakySink {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn deliver(&self, _event: &NotificationEvent) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(NotifyError::Rejected("broker down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_worker_delivers_queued_events() {
        let sink = InMemoryNotifier::new();
        let (notifier, worker) = QueueNotifier::with_worker(8, sink.clone());
        let handle = tokio::spawn(worker.run());

        notifier.enqueue(sample_event()).await.unwrap();
        notifier.enqueue(sample_event()).await.unwrap();
        drop(notifier);

        handle.await.unwrap();
        assert_eq!(sink.event_count().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_event_ids_are_delivered_once() {
        let sink = InMemoryNotifier::new();
        let (notifier, worker) = QueueNotifier::with_worker(8, sink.clone());
        let event = sample_event();

        notifier.enqueue(event.clone()).await.unwrap();
        notifier.enqueue(event.clone()).await.unwrap();
        drop(notifier);

        worker.run().await;
        let delivered = sink.events().await;
        assert_eq!(delivered, vec![event]);
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let (notifier, _worker) = QueueNotifier::with_worker(1, InMemoryNotifier::new());

        notifier.enqueue(sample_event()).await.unwrap();
        let result = notifier.enqueue(sample_event()).await;
        assert_eq!(result, Err(NotifyError::QueueFull));
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let (notifier, worker) = QueueNotifier::with_worker(4, InMemoryNotifier::new());
        drop(worker);

        let result = notifier.enqueue(sample_event()).await;
        assert_eq!(result, Err(NotifyError::QueueClosed));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let sink = FlakySink {
            failures: 2,
            calls: calls.clone(),
        };
        let (_notifier, worker) = QueueNotifier::with_worker(4, sink);
        let mut worker = worker.with_delivery_retry(3, Duration::from_millis(1));

        assert_eq!(worker.handle(sample_event()).await, Delivery::Delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_delivery_gives_up_after_bounded_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let sink = FlakySink {
            failures: u32::MAX,
            calls: calls.clone(),
        };
        let (_notifier, worker) = QueueNotifier::with_worker(4, sink);
        let mut worker = worker.with_delivery_retry(2, Duration::from_millis(1));

        let event = sample_event();
        assert_eq!(worker.handle(event.clone()).await, Delivery::Dropped);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // A dropped event was never delivered, so a redelivery is attempted.
        assert_eq!(worker.handle(event).await, Delivery::Dropped);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_events() {
        let mut worker = NotificationWorker::new(mpsc::channel(1).1, LogSink);
        assert_eq!(worker.handle(sample_event()).await, Delivery::Delivered);
    }
}
