//! WebSocket channel adapter.
//!
//! One socket per conversation. `connect` opens it and writes the auth frame;
//! after that two local tasks own the halves:
//!   writer: forwards `ClientFrame`s from an unbounded queue, closes the
//!           socket when the queue's sender is dropped
//!   reader: parses `ServerFrame`s into the inbound queue, reports `Closed`
//!           when the socket ends
//!
//! Each connection carries an epoch. `disconnect` bumps it, so a reader that
//! outlives its connection stops delivering.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gloo_net::websocket::{futures::WebSocket, Message as WsMessage};
use gloo_utils::errors::JsError;
use wasm_bindgen_futures::spawn_local;

use chat_core::event_bus::EventBus;
use chat_core::ports::{ClientContext, TransportPort};
use chat_types::{
    ChatError, Result,
    conversation::Credential,
    event::{ChannelEvent, ClientFrame, ServerFrame},
    message::OutgoingMessage,
};

pub struct WebSocketTransport {
    url: String,
    epoch: Rc<Cell<u64>>,
    outbound: RefCell<Option<UnboundedSender<ClientFrame>>>,
    inbound: EventBus<ChannelEvent>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            epoch: Rc::new(Cell::new(0)),
            outbound: RefCell::new(None),
            inbound: EventBus::new(),
        }
    }
}

fn js_error(e: JsError) -> ChatError {
    ChatError::JsInterop(e.to_string())
}

fn encode_frame(frame: &ClientFrame) -> Result<WsMessage> {
    Ok(WsMessage::Text(serde_json::to_string(frame)?))
}

/// Parse one server frame; unknown or malformed frames are logged and skipped.
pub fn decode_frame(text: &str) -> Option<ChannelEvent> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::Message(message)) => Some(ChannelEvent::Message(message)),
        Ok(ServerFrame::Error { message }) => {
            log::warn!("Channel error frame: {}", message);
            None
        }
        Err(e) => {
            log::warn!("Ignoring malformed channel frame: {}", e);
            None
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut frames: UnboundedReceiver<ClientFrame>,
) {
    while let Some(frame) = frames.next().await {
        let message = match encode_frame(&frame) {
            Ok(message) => message,
            Err(e) => {
                log::error!("Could not encode frame: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(message).await {
            log::error!("Channel write failed: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    inbound: EventBus<ChannelEvent>,
    epoch: Rc<Cell<u64>>,
    mine: u64,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                if epoch.get() != mine {
                    return;
                }
                if let Some(event) = decode_frame(&text) {
                    inbound.emit(event);
                }
            }
            Some(Ok(WsMessage::Bytes(bytes))) => {
                log::debug!("Ignoring {} byte binary frame", bytes.len());
            }
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };
    if epoch.get() == mine {
        inbound.emit(ChannelEvent::Closed { reason });
    }
}

#[async_trait(?Send)]
impl TransportPort for WebSocketTransport {
    async fn connect(&self, credential: &Credential, context: &ClientContext) -> Result<()> {
        self.disconnect();
        let mine = self.epoch.get();

        log::info!("Opening channel {} for {}", self.url, context.chat_id);
        let socket = WebSocket::open(&self.url).map_err(js_error)?;
        let (mut sink, stream) = socket.split();

        // The first send waits for the socket to open.
        let auth = ClientFrame::Auth {
            token: credential.token.clone(),
            chat_id: context.chat_id.clone(),
        };
        sink.send(encode_frame(&auth)?)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if self.epoch.get() != mine {
            let _ = sink.close().await;
            return Err(ChatError::Transport("connection superseded".to_string()));
        }

        let (sender, receiver) = mpsc::unbounded();
        *self.outbound.borrow_mut() = Some(sender);
        spawn_local(write_loop(sink, receiver));
        spawn_local(read_loop(stream, self.inbound.clone(), self.epoch.clone(), mine));
        Ok(())
    }

    fn disconnect(&self) {
        self.epoch.set(self.epoch.get() + 1);
        if self.outbound.borrow_mut().take().is_some() {
            log::debug!("Channel closed by client");
        }
        self.inbound.clear();
    }

    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let outbound = self.outbound.borrow();
        let sender = outbound
            .as_ref()
            .ok_or_else(|| ChatError::Transport("not connected".to_string()))?;
        sender
            .unbounded_send(ClientFrame::Message(message.clone()))
            .map_err(|e| ChatError::Transport(e.to_string()))
    }

    fn drain_inbound(&self) -> Vec<ChannelEvent> {
        self.inbound.drain()
    }

    fn is_connected(&self) -> bool {
        self.outbound
            .borrow()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}
