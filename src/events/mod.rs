//! Progress events streamed by the map engine and crawl orchestrator, as a
//! tagged enum (`sitemap | discovery | metadata | mapping | page | progress
//! | error | complete`).
//!
//! Producers push onto an `mpsc` channel wrapped as a [`tokio_stream::Stream`];
//! a slow consumer applies backpressure naturally because `send` awaits a
//! free slot. Event streams are lazy: a slow or absent consumer never
//! blocks the producer beyond the channel's buffer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::map::MapResult;
use crate::scrape::ScrapeData;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    Sitemap { found: usize, message: String },
    Discovery { url: String, discovered: usize, total: usize },
    Metadata { url: String, completed: usize, total: usize },
    Complete { result: MapResult },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    Mapping { event: MapEvent },
    Progress { completed: usize, total: usize },
    Page { url: String, data: Box<ScrapeData>, completed: usize, total: usize },
    Error { url: Option<String>, error: String, completed: Option<usize>, total: Option<usize> },
    Complete { completed: usize, total: usize },
}

/// The writer half of an event stream. Cloneable so multiple workers inside
/// one batch can push concurrently; the channel itself is still a single
/// logical producer as far as ordering within a batch goes (unordered,
/// per spec's concurrency model).
#[derive(Clone)]
pub struct EventSender<E>(mpsc::Sender<E>);

impl<E> EventSender<E> {
    pub async fn send(&self, event: E) {
        if self.0.send(event).await.is_err() {
            tracing::debug!("event receiver dropped; discarding event");
        }
    }
}

/// Create a bounded single-producer (logically) event channel; the receiver
/// is exposed as a `Stream` for callers to drain lazily.
pub fn channel<E: Send + 'static>(capacity: usize) -> (EventSender<E>, ReceiverStream<E>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender(tx), ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn events_drain_in_send_order() {
        let (tx, mut rx) = channel::<CrawlEvent>(8);
        tx.send(CrawlEvent::Progress { completed: 0, total: 2 }).await;
        tx.send(CrawlEvent::Progress { completed: 1, total: 2 }).await;
        drop(tx);

        let first = rx.next().await.unwrap();
        let second = rx.next().await.unwrap();
        assert!(matches!(first, CrawlEvent::Progress { completed: 0, .. }));
        assert!(matches!(second, CrawlEvent::Progress { completed: 1, .. }));
        assert!(rx.next().await.is_none());
    }
}
