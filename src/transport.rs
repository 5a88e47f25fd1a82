//! Tokio transport runtime for the stream controller
//!
//! Single event loop in front of a [`StreamController`]: everything — socket
//! events, the reconnect timer, user commands, capture frames — funnels
//! through one mpsc channel and is processed in arrival order, so all
//! session and turn mutations are strictly serialized.
//!
//! Each dial spawns a connect-and-pump task tagged with its attempt number.
//! The session drops events from stale attempts, which keeps a socket torn
//! down during a mode switch from scheduling a duplicate reconnect.

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::controller::{CaptureHandle, StreamController};
use crate::session::{Action, SessionEvent, SessionMode, TransportState};

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Everything the event loop reacts to
pub enum ClientEvent {
    /// Handshake finished; the writer half is handed to the loop
    Connected { attempt: u64, writer: Box<WsWriter> },
    /// Raw transport event for the session reducer
    Transport(SessionEvent),
    /// User typed a message
    SendText(String),
    /// One captured PCM frame from the audio source
    CaptureFrame(Vec<u8>),
    SwitchMode(SessionMode),
    StartRecording(Box<dyn CaptureHandle>),
    StopRecording,
    Shutdown,
}

impl ClientEvent {
    fn name(&self) -> &'static str {
        match self {
            ClientEvent::Connected { .. } => "Connected",
            ClientEvent::Transport(_) => "Transport",
            ClientEvent::SendText(_) => "SendText",
            ClientEvent::CaptureFrame(_) => "CaptureFrame",
            ClientEvent::SwitchMode(_) => "SwitchMode",
            ClientEvent::StartRecording(_) => "StartRecording",
            ClientEvent::StopRecording => "StopRecording",
            ClientEvent::Shutdown => "Shutdown",
        }
    }
}

/// Owns the controller, the socket writer, and the event channel
pub struct ClientRuntime {
    controller: StreamController,
    rx: mpsc::Receiver<ClientEvent>,
    tx: mpsc::Sender<ClientEvent>,
    writer: Option<Box<WsWriter>>,
    /// Handshake still in flight for this attempt
    dial_task: Option<(u64, JoinHandle<()>)>,
}

impl ClientRuntime {
    pub fn new(
        controller: StreamController,
        tx: mpsc::Sender<ClientEvent>,
        rx: mpsc::Receiver<ClientEvent>,
    ) -> Self {
        Self {
            controller,
            rx,
            tx,
            writer: None,
            dial_task: None,
        }
    }

    /// Dial once, then process events until shutdown
    pub async fn run(mut self) {
        log::info!("Client runtime started");
        let initial = self.controller.connect();
        self.run_actions(vec![initial]).await;

        while let Some(event) = self.rx.recv().await {
            log::debug!("Event: {}", event.name());
            match event {
                ClientEvent::Connected { attempt, writer } => {
                    let session = self.controller.session();
                    if attempt == session.attempt()
                        && session.state() == TransportState::Connecting
                    {
                        self.writer = Some(writer);
                        self.dial_task = None;
                        self.dispatch(SessionEvent::Opened { attempt }).await;
                    } else {
                        log::debug!("Dropping writer from stale attempt {}", attempt);
                    }
                }
                ClientEvent::Transport(session_event) => {
                    if let SessionEvent::Closed { attempt } = &session_event {
                        if matches!(&self.dial_task, Some((a, _)) if a == attempt) {
                            self.dial_task = None;
                        }
                        if *attempt == self.controller.session().attempt() {
                            self.writer = None;
                        }
                    }
                    self.dispatch(session_event).await;
                }
                ClientEvent::SendText(text) => {
                    if let Some(action) = self.controller.send_text(&text) {
                        self.run_actions(vec![action]).await;
                    } else {
                        log::debug!("Dropping text message, transport not open");
                    }
                }
                ClientEvent::CaptureFrame(pcm) => {
                    if let Some(action) = self.controller.capture_frame(&pcm) {
                        self.run_actions(vec![action]).await;
                    }
                }
                ClientEvent::SwitchMode(mode) => {
                    let actions = self.controller.switch_mode(mode);
                    self.run_actions(actions).await;
                }
                ClientEvent::StartRecording(handle) => {
                    self.controller.start_recording(handle);
                }
                ClientEvent::StopRecording => {
                    self.controller.stop_recording();
                }
                ClientEvent::Shutdown => {
                    log::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.controller.stop_recording();
        if let Some((_, task)) = self.dial_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close().await {
                log::debug!("Error closing socket on shutdown: {}", e);
            }
        }
        log::info!("Client runtime stopped");
    }

    /// Feed one transport event through the controller
    async fn dispatch(&mut self, event: SessionEvent) {
        let actions = self.controller.handle_event(event);
        self.run_actions(actions).await;
    }

    /// Execute actions; a close can synthesize a follow-up close event
    /// whose own actions are processed in turn.
    async fn run_actions(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            if let Some(event) = self.execute(action).await {
                queue.extend(self.controller.handle_event(event));
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<SessionEvent> {
        match action {
            Action::Dial { attempt, url } => {
                self.writer = None;
                let tx = self.tx.clone();
                let task = tokio::spawn(dial(attempt, url, tx));
                self.dial_task = Some((attempt, task));
                None
            }
            Action::Transmit(frame) => {
                if let Some(writer) = self.writer.as_mut() {
                    if let Err(e) = writer.send(Message::Text(frame)).await {
                        // The reader half reports the failure as close
                        log::warn!("Send failed: {}", e);
                    }
                }
                None
            }
            Action::CloseTransport => {
                if let Some(mut writer) = self.writer.take() {
                    if let Err(e) = writer.close().await {
                        log::debug!("Error closing socket: {}", e);
                    }
                    // The pump observes the close and emits the event
                    None
                } else {
                    // Still handshaking (or nothing to close): abort and
                    // synthesize the close the socket can no longer send
                    let attempt = self.controller.session().attempt();
                    if let Some((_, task)) = self.dial_task.take() {
                        task.abort();
                    }
                    Some(SessionEvent::Closed { attempt })
                }
            }
            Action::ScheduleReconnect(delay) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx
                        .send(ClientEvent::Transport(SessionEvent::ReconnectDue))
                        .await;
                });
                None
            }
            // Consumed inside the controller, never reaches the runtime
            Action::Status(_) | Action::Inbound(_) => None,
        }
    }
}

/// Connect and pump inbound frames into the event channel.
///
/// A failed handshake surfaces as an error followed by a close, matching
/// the guarantee the session reducer relies on.
async fn dial(attempt: u64, url: String, tx: mpsc::Sender<ClientEvent>) {
    match connect_async(url.as_str()).await {
        Ok((stream, _response)) => {
            let (writer, mut reader) = stream.split();
            if tx
                .send(ClientEvent::Connected {
                    attempt,
                    writer: Box::new(writer),
                })
                .await
                .is_err()
            {
                return;
            }

            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(frame)) => {
                        let event = SessionEvent::Frame { attempt, frame };
                        if tx.send(ClientEvent::Transport(event)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {} // ping/pong/binary
                    Err(e) => {
                        let event = SessionEvent::Errored {
                            attempt,
                            reason: e.to_string(),
                        };
                        let _ = tx.send(ClientEvent::Transport(event)).await;
                        break;
                    }
                }
            }
            let _ = tx
                .send(ClientEvent::Transport(SessionEvent::Closed { attempt }))
                .await;
        }
        Err(e) => {
            let errored = SessionEvent::Errored {
                attempt,
                reason: e.to_string(),
            };
            let _ = tx.send(ClientEvent::Transport(errored)).await;
            let _ = tx
                .send(ClientEvent::Transport(SessionEvent::Closed { attempt }))
                .await;
        }
    }
}

/// Channel capacity for the event loop
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Convenience constructor: channel plus runtime
pub fn client_channel(
    controller: StreamController,
) -> (mpsc::Sender<ClientEvent>, ClientRuntime) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let runtime = ClientRuntime::new(controller, tx.clone(), rx);
    (tx, runtime)
}
