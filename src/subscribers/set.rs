//! # Non-blocking event fan-out to multiple subscribers.
//!
//! [`SubscriberSet`] distributes events to all registered subscribers
//! without blocking the publisher.
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N
//!   while B is still on N-5.
//! - **Overflow**: the event is dropped for that subscriber only and a
//!   `SubscriberOverflow` is published (never re-published for overflow
//!   events themselves, which prevents feedback loops).
//! - **Panic isolation**: worker tasks catch panics and report them as
//!   `SubscriberPanicked`, then keep processing.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator: one bounded queue and one worker task per subscriber.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let capacity = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(capacity);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let fut = sub.on_event(event.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await
                    {
                        let info = {
                            let any = &*panic_err;
                            if let Some(msg) = any.downcast_ref::<&'static str>() {
                                (*msg).to_string()
                            } else if let Some(msg) = any.downcast_ref::<String>() {
                                msg.clone()
                            } else {
                                "unknown panic".to_string()
                            }
                        };
                        bus_for_worker.publish(Event::subscriber_panicked(sub.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self { channels, workers }
    }

    /// Spawns the bus listener feeding this set.
    ///
    /// The listener holds the set alive and runs until the bus sender side
    /// is dropped.
    pub fn listen(self: Arc<Self>, bus: &Bus) {
        let mut rx = bus.subscribe();
        let bus = bus.clone();
        let set = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => set.dispatch(Arc::new(event), &bus),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Delivers one event to every subscriber queue (non-blocking).
    fn dispatch(&self, event: Arc<Event>, bus: &Bus) {
        let is_overflow_event = matches!(event.kind, EventKind::SubscriberOverflow);

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_event {
                        bus.publish(Event::subscriber_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_event {
                        bus.publish(Event::subscriber_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Gracefully shuts down all subscriber workers: closes the queues and
    /// awaits the workers.
    pub async fn shutdown(self) {
        drop(self.channels);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
