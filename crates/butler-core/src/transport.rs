//! Line-delimited JSON transport
//!
//! Carries bridge envelopes over any byte stream so the requester and the
//! responder can live in different processes (TCP, stdio, pipes).

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, SubscriberId, Subscription};
use crate::error::{BridgeError, Result};
use crate::protocol::BridgeEvent;

/// Upper bound on a single envelope line
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Encode an event as a single envelope line (without the newline)
pub fn encode(event: &BridgeEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decode an envelope line
pub fn decode(line: &str) -> Result<BridgeEvent> {
    serde_json::from_str(line).map_err(|e| BridgeError::Protocol(format!("malformed envelope: {e}")))
}

/// One inbound line, or the reason it was thrown away
#[derive(Debug)]
enum Frame {
    Line(String),
    Rejected(LinesCodecError),
}

/// [`LinesCodec`] that reports bad lines as frames instead of failing the stream
///
/// An oversized line is discarded up to its newline and invalid UTF-8 is
/// dropped whole, so the lines after it are still read.
struct EnvelopeCodec {
    lines: LinesCodec,
}

impl EnvelopeCodec {
    fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Frame>, LinesCodecError> {
        match self.lines.decode(src) {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(e) => Ok(Some(Frame::Rejected(e))),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Frame>, LinesCodecError> {
        match self.lines.decode_eof(src) {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(e) => {
                src.clear();
                Ok(Some(Frame::Rejected(e)))
            }
        }
    }
}

impl Encoder<String> for EnvelopeCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> std::result::Result<(), LinesCodecError> {
        self.lines.encode(line, dst)
    }
}

/// Link `bus` to a peer on `io` until either side closes or `shutdown` fires
///
/// Events published locally are written to the peer by a dedicated writer
/// task, so reading never waits on a blocked write. Events read from the
/// peer are dispatched locally, tagged with this pipe's subscription so they
/// are not echoed back. Malformed and oversized lines are skipped.
pub async fn pipe<B, T>(bus: &B, io: T, shutdown: CancellationToken) -> Result<()>
where
    B: EventBus + ?Sized,
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let subscription = bus.subscribe()?;
    let origin = subscription.id();
    let (sink, lines) = Framed::new(io, EnvelopeCodec::new()).split();

    let stop = shutdown.child_token();
    let writer = tokio::spawn(write_events(subscription, sink, stop.clone()));

    let read = read_events(bus, origin, lines, &stop).await;
    stop.cancel();
    let written = writer
        .await
        .map_err(|e| BridgeError::Io(std::io::Error::other(e)))?;

    read.and(written)
}

async fn read_events<B, S>(bus: &B, origin: SubscriberId, mut lines: S, stop: &CancellationToken) -> Result<()>
where
    B: EventBus + ?Sized,
    S: Stream<Item = std::result::Result<Frame, LinesCodecError>> + Unpin,
{
    loop {
        let inbound = tokio::select! {
            () = stop.cancelled() => {
                tracing::debug!("bridge transport shutting down");
                return Ok(());
            }
            inbound = lines.next() => inbound,
        };

        match inbound {
            None => {
                tracing::debug!("peer closed bridge transport");
                return Ok(());
            }
            Some(Err(e)) => return Err(codec_error(e)),
            Some(Ok(Frame::Rejected(e))) => tracing::warn!(error = %e, "skipping inbound line"),
            Some(Ok(Frame::Line(line))) if line.trim().is_empty() => {}
            Some(Ok(Frame::Line(line))) => match decode(&line) {
                Ok(event) => bus.dispatch(Some(origin), event)?,
                Err(e) => tracing::warn!(error = %e, "skipping inbound line"),
            },
        }
    }
}

/// Forward local events to the peer until the bus closes or `stop` fires
async fn write_events<S>(mut subscription: Subscription, mut sink: S, stop: CancellationToken) -> Result<()>
where
    S: Sink<String, Error = LinesCodecError> + Unpin,
{
    // The reader ends with the writer
    let _stop = stop.clone().drop_guard();

    loop {
        let outbound = tokio::select! {
            () = stop.cancelled() => return Ok(()),
            outbound = subscription.recv() => outbound,
        };
        let Some(event) = outbound else {
            tracing::debug!("local bus closed, ending bridge transport");
            return Ok(());
        };

        let line = encode(&event)?;
        tokio::select! {
            () = stop.cancelled() => return Ok(()),
            sent = sink.send(line) => sent.map_err(codec_error)?,
        }
    }
}

fn codec_error(error: LinesCodecError) -> BridgeError {
    match error {
        LinesCodecError::Io(e) => BridgeError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => {
            BridgeError::Protocol(format!("envelope exceeds {MAX_LINE_LENGTH} bytes"))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::bus::LocalBus;
    use crate::protocol::{ReadyEvent, ResponseEvent};

    #[tokio::test]
    async fn local_events_are_written_as_lines() {
        let bus = LocalBus::new();
        let (local, remote) = tokio::io::duplex(4096);
        let shutdown = CancellationToken::new();

        let task = {
            let bus = bus.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pipe(&bus, local, shutdown).await })
        };

        // Wait until the pipe has subscribed
        while bus.listener_count() == 0 {
            tokio::task::yield_now().await;
        }

        bus.publish(BridgeEvent::Ready(ReadyEvent {
            version: "1.0.0".to_owned(),
        }))
        .unwrap();

        let mut reader = BufReader::new(remote);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        assert_eq!(
            line.trim_end(),
            r#"{"name":"zotero-ai-butler-bridge-ready","detail":{"version":"1.0.0"}}"#
        );

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn inbound_lines_are_dispatched_without_echo() {
        let bus = LocalBus::new();
        let mut listener = bus.subscribe().unwrap();
        let (local, mut remote) = tokio::io::duplex(4096);
        let shutdown = CancellationToken::new();

        let task = {
            let bus = bus.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pipe(&bus, local, shutdown).await })
        };

        remote.write_all(b"not json\n\n").await.unwrap();
        let event = BridgeEvent::Response(ResponseEvent::complete("req-1".into(), "done"));
        let line = format!("{}\n", encode(&event).unwrap());
        remote.write_all(line.as_bytes()).await.unwrap();

        assert_eq!(listener.recv().await, Some(event));

        shutdown.cancel();
        task.await.unwrap().unwrap();

        // The pipe dropped its end; everything it wrote is still readable
        let mut echoed = String::new();
        remote.read_to_string(&mut echoed).await.unwrap();
        assert_eq!(echoed, "");
    }

    #[tokio::test]
    async fn oversized_and_invalid_lines_are_skipped() {
        let bus = LocalBus::new();
        let mut listener = bus.subscribe().unwrap();
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let shutdown = CancellationToken::new();

        let task = {
            let bus = bus.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pipe(&bus, local, shutdown).await })
        };

        let mut oversized = vec![b'x'; MAX_LINE_LENGTH + 1024];
        oversized.push(b'\n');
        remote.write_all(&oversized).await.unwrap();
        remote.write_all(b"\xff\xfe not utf-8\n").await.unwrap();

        let event = BridgeEvent::Response(ResponseEvent::complete("req-2".into(), "after"));
        let line = format!("{}\n", encode(&event).unwrap());
        remote.write_all(line.as_bytes()).await.unwrap();

        assert_eq!(listener.recv().await, Some(event));
        assert!(!task.is_finished());

        drop(remote);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn large_frames_cross_in_both_directions() {
        let near = LocalBus::new();
        let far = LocalBus::new();
        let mut near_listener = near.subscribe().unwrap();
        let mut far_listener = far.subscribe().unwrap();
        // Far smaller than either frame, so both writes block until the peer reads
        let (near_io, far_io) = tokio::io::duplex(1024);
        let shutdown = CancellationToken::new();

        let tasks = [(near.clone(), near_io), (far.clone(), far_io)].map(|(bus, io)| {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pipe(&bus, io, shutdown).await })
        });
        while near.listener_count() < 2 || far.listener_count() < 2 {
            tokio::task::yield_now().await;
        }

        let outbound = BridgeEvent::Response(ResponseEvent::complete("near".into(), "n".repeat(256 * 1024)));
        let inbound = BridgeEvent::Response(ResponseEvent::complete("far".into(), "f".repeat(256 * 1024)));
        near.publish(outbound.clone()).unwrap();
        far.publish(inbound.clone()).unwrap();

        let crossed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            // Each listener first sees its own publish, then the peer's
            near_listener.recv().await;
            far_listener.recv().await;
            (near_listener.recv().await, far_listener.recv().await)
        })
        .await
        .unwrap();
        assert_eq!(crossed, (Some(inbound), Some(outbound)));

        shutdown.cancel();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn detaching_the_bus_ends_the_pipe() {
        let bus = LocalBus::new();
        let (local, _remote) = tokio::io::duplex(4096);

        let task = {
            let bus = bus.clone();
            tokio::spawn(async move { pipe(&bus, local, CancellationToken::new()).await })
        };
        while bus.listener_count() == 0 {
            tokio::task::yield_now().await;
        }

        bus.detach();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn decode_reports_protocol_errors() {
        let err = decode(r#"{"name":"something-else","detail":{}}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }
}
