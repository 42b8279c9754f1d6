//! Pull-based view over the `response` events of one generation.
//!
//! Adapts the push channel into a [`futures::Stream`] through an unbounded
//! mpsc queue.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::channel::{EngineEvent, EventChannel, EventName, Subscription};
use crate::types::StreamingResponse;

#[derive(Debug)]
enum Item {
    Chunk(StreamingResponse),
    /// `generating=false` without a final response (stop or failure).
    Interrupted,
}

/// Yields responses up to and including the final one.
///
/// Ends early if generation is stopped or fails. Dropping the stream
/// unsubscribes from the channel.
#[derive(Debug)]
pub struct ResponseStream {
    rx: UnboundedReceiverStream<Item>,
    subscriptions: [Subscription; 2],
    done: bool,
}

impl ResponseStream {
    /// Subscribe to `channel`. Must be called before the generation is
    /// dispatched, since the channel does not replay.
    pub(crate) fn attach(channel: &EventChannel) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let chunks = tx.clone();
        let responses = channel.subscribe(EventName::Response, move |event| {
            if let EngineEvent::Response(response) = event {
                let _ = chunks.send(Item::Chunk(response.clone()));
            }
        });
        let generating = channel.subscribe(EventName::Generating, move |event| {
            if let EngineEvent::Generating(false) = event {
                let _ = tx.send(Item::Interrupted);
            }
        });

        Self {
            rx: UnboundedReceiverStream::new(rx),
            subscriptions: [responses, generating],
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

impl Stream for ResponseStream {
    type Item = StreamingResponse;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.rx).poll_next(cx) {
            Poll::Ready(Some(Item::Chunk(response))) => {
                if response.is_final {
                    this.finish();
                }
                Poll::Ready(Some(response))
            }
            Poll::Ready(Some(Item::Interrupted)) | Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_stream_ends_at_final() {
        let channel = EventChannel::new();
        let stream = ResponseStream::attach(&channel);

        channel.publish(EngineEvent::Generating(true));
        channel.publish(EngineEvent::Response(StreamingResponse::partial("He")));
        channel.publish(EngineEvent::Response(StreamingResponse::complete("Hello")));
        channel.publish(EngineEvent::Generating(false));

        let all: Vec<_> = stream.collect().await;
        assert_eq!(all.len(), 2);
        assert!(all[1].is_final);
        assert_eq!(channel.subscriber_count(EventName::Response), 0);
    }

    #[tokio::test]
    async fn test_stream_ends_on_interruption() {
        let channel = EventChannel::new();
        let mut stream = ResponseStream::attach(&channel);

        channel.publish(EngineEvent::Response(StreamingResponse::partial("Hel")));
        channel.publish(EngineEvent::Generating(false));
        channel.publish(EngineEvent::Response(StreamingResponse::complete("Hello")));

        assert_eq!(stream.next().await.unwrap().accumulated_text, "Hel");
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let channel = EventChannel::new();
        let stream = ResponseStream::attach(&channel);
        assert_eq!(channel.subscriber_count(EventName::Generating), 1);
        drop(stream);
        assert_eq!(channel.subscriber_count(EventName::Generating), 0);
        assert_eq!(channel.subscriber_count(EventName::Response), 0);
    }
}
