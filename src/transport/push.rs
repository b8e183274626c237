// file: src/transport/push.rs
// description: WebSocket push transport with connect timeout and per-frame error isolation

use super::{EventSink, Transport, TransportEventKind};
use crate::{
    dispatcher::parse_frame,
    types::{CLOSE_ABNORMAL, CLOSE_HEARTBEAT_TIMEOUT, OutboundMessage, TransportKind},
};
use futures_util::{SinkExt, StreamExt};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message, Utf8Bytes,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

// "no status received" per RFC 6455; a close frame without a code is not a normal closure
const CLOSE_NO_STATUS: u16 = 1005;

pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Duration,
    open: Arc<AtomicBool>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            open: Arc::new(AtomicBool::new(false)),
            outbound: None,
            task: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    fn start(&mut self, sink: EventSink) {
        if self.task.is_some() {
            warn!(url = %self.url, "WebSocket transport already started");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(run_connection(
            self.url.clone(),
            self.connect_timeout,
            rx,
            self.open.clone(),
            sink,
        )));
    }

    fn close(&mut self, code: u16) {
        let was_open = self.open.swap(false, Ordering::AcqRel);

        if let Some(outbound) = self.outbound.take()
            && was_open
        {
            let reason = if code == CLOSE_HEARTBEAT_TIMEOUT {
                "heartbeat timeout"
            } else {
                "client closed"
            };
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: Utf8Bytes::from_static(reason),
            };
            // the connection task writes this close frame and exits on its own
            if outbound.send(Message::Close(Some(frame))).is_ok() {
                self.task.take();
                return;
            }
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn send(&mut self, message: &OutboundMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(outbound) = self.outbound.as_ref() else {
            return false;
        };

        match message.to_json() {
            Ok(text) => {
                trace!(message = %text, "Sending frame");
                outbound.send(Message::Text(text.into())).is_ok()
            }
            Err(e) => {
                // unserialisable messages can never succeed, so do not ask for a retry
                error!("Failed to serialize outbound message: {}", e);
                true
            }
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_connection(
    url: Url,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
    sink: EventSink,
) {
    debug!(url = %url, generation = sink.generation(), "Opening WebSocket connection");

    let stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            warn!(url = %url, "Failed to connect to WebSocket: {}", e);
            sink.emit(TransportEventKind::Close {
                code: CLOSE_ABNORMAL,
                reason: e.to_string(),
            });
            return;
        }
        Err(_) => {
            warn!(url = %url, timeout_ms = connect_timeout.as_millis() as u64, "WebSocket connect timed out");
            sink.emit(TransportEventKind::Close {
                code: CLOSE_ABNORMAL,
                reason: "connect timed out".to_string(),
            });
            return;
        }
    };

    info!(url = %url, "WebSocket connection established");
    open.store(true, Ordering::Release);
    sink.emit(TransportEventKind::Open);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let Some(message) = outgoing else {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                };

                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    open.store(false, Ordering::Release);
                    if !closing {
                        warn!("Failed to write WebSocket frame: {}", e);
                        sink.emit(TransportEventKind::Close {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                        });
                    }
                    return;
                }
                if closing {
                    debug!(url = %url, "Sent close frame");
                    return;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => forward_frame(&sink, text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => forward_frame(&sink, text),
                        Err(_) => {
                            sink.emit(TransportEventKind::Error(format!(
                                "binary frame of {} bytes is not UTF-8",
                                data.len()
                            )));
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // protocol-level keepalive is answered by tungstenite itself
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        open.store(false, Ordering::Release);
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        info!(code, reason = %reason, "Server closed WebSocket");
                        sink.emit(TransportEventKind::Close { code, reason });
                        return;
                    }
                    Some(Err(e)) => {
                        open.store(false, Ordering::Release);
                        warn!("WebSocket stream error: {}", e);
                        sink.emit(TransportEventKind::Close {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                        });
                        return;
                    }
                    None => {
                        open.store(false, Ordering::Release);
                        info!("WebSocket stream ended");
                        sink.emit(TransportEventKind::Close {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                }
            }
        }
    }
}

fn forward_frame(sink: &EventSink, text: &str) {
    match parse_frame(text) {
        Ok(message) => {
            sink.emit(TransportEventKind::Message(message));
        }
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            sink.emit(TransportEventKind::Error(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;
    use crate::types::{CLOSE_NORMAL, MessageKind};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{WebSocketStream, accept_async};

    async fn listen() -> (Url, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse(&format!("ws://{addr}/ws/market/")).unwrap();
        (url, listener)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        accept_async(stream).await.unwrap()
    }

    /// Text frames the client sent, then the code of its close frame.
    async fn record_client(ws: &mut WebSocketStream<TcpStream>) -> (Vec<String>, Option<u16>) {
        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => received.push(text.as_str().to_string()),
                Message::Close(frame) => return (received, frame.map(|f| u16::from(f.code))),
                _ => {}
            }
        }
        (received, None)
    }

    async fn next_kind(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEventKind {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .kind
    }

    #[tokio::test]
    async fn test_bad_frame_keeps_connection_open() {
        let (url, listener) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.send(Message::text("not json at all")).await.unwrap();
            ws.send(Message::text(
                r#"{"type":"price_update","data":{"cryptocurrencies":[]}}"#,
            ))
            .await
            .unwrap();
            record_client(&mut ws).await
        });

        let mut transport = WebSocketTransport::new(url, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.start(EventSink::new(1, tx));

        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Open);
        assert!(matches!(next_kind(&mut rx).await, TransportEventKind::Error(_)));
        match next_kind(&mut rx).await {
            TransportEventKind::Message(message) => {
                assert_eq!(message.kind, MessageKind::PriceUpdate)
            }
            other => panic!("expected price update, got {other:?}"),
        }

        assert!(transport.is_open());
        assert!(transport.send(&OutboundMessage::ping()));
        transport.stop();
        assert!(!transport.send(&OutboundMessage::ping()));

        let (received, code) = server.await.unwrap();
        assert_eq!(received, vec![r#"{"type":"ping"}"#.to_string()]);
        assert_eq!(code, Some(CLOSE_NORMAL));
    }

    #[tokio::test]
    async fn test_close_carries_requested_code() {
        let (url, listener) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            record_client(&mut ws).await
        });

        let mut transport = WebSocketTransport::new(url, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.start(EventSink::new(1, tx));
        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Open);

        transport.close(CLOSE_HEARTBEAT_TIMEOUT);
        let (_, code) = server.await.unwrap();
        assert_eq!(code, Some(CLOSE_HEARTBEAT_TIMEOUT));
    }

    #[tokio::test]
    async fn test_server_close_code_is_reported() {
        let (url, listener) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.close(Some(CloseFrame {
                code: CloseCode::from(4001),
                reason: Utf8Bytes::from_static("maintenance"),
            }))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut transport = WebSocketTransport::new(url, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.start(EventSink::new(3, tx));

        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Open);
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Close {
                code: 4001,
                reason: "maintenance".to_string()
            }
        );
        assert!(!transport.is_open());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_refused_before_open() {
        let url = Url::parse("ws://127.0.0.1:9/ws/market/").unwrap();
        let mut transport = WebSocketTransport::new(url, Duration::from_millis(50));
        assert!(!transport.send(&OutboundMessage::ping()));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_abnormal_close() {
        // port 9 (discard) is not expected to accept WebSocket handshakes
        let url = Url::parse("ws://127.0.0.1:9/ws/market/").unwrap();
        let mut transport = WebSocketTransport::new(url, Duration::from_secs(2));
        let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
        transport.start(EventSink::new(7, tx));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation, 7);
        assert!(matches!(
            event.kind,
            TransportEventKind::Close { code: CLOSE_ABNORMAL, .. }
        ));
        assert!(!transport.is_open());
        transport.stop();
        transport.stop();
    }
}
