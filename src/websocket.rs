//! # WebSocket Response Stream Handler
//!
//! The transport side of the engine. A client (the game, or a relay in front
//! of the conversational service) connects to `/ws/stream`, registers one
//! response stream and forwards every response chunk it receives. Playable
//! units come back on the same socket as soon as the tick loop emits them.
//!
//! ## WebSocket Protocol:
//! 1. **start_stream**: registers the stream (`session_id` optional, a UUID is
//!    generated otherwise; `sample_rate` is the fallback for damaged headers)
//! 2. **audio_response**: metadata for the *next* binary frame (transcript,
//!    sample rate). With `end_of_response: true` it is itself the end marker
//! 3. **Binary frames**: raw chunks exactly as received from the service
//! 4. **stop_stream**: interrupts and unregisters the stream
//!
//! ## Server → Client:
//! - `stream_status`, `error`, `ping` / `pong` as JSON text
//! - `playable_unit` JSON, followed by one binary frame of little-endian f32
//!   samples when the unit carries audio

use crate::audio::chunk::{PlayableUnit, RawChunk};
use crate::audio::playback::ChannelSink;
use crate::audio::session::ResponseStream;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket message types for client-server communication.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Register a response stream for this connection
    StartStream {
        session_id: Option<String>,
        sample_rate: Option<u32>,
    },

    /// Metadata accompanying the next binary chunk, or an end marker
    AudioResponse {
        text_data: Option<String>,
        sample_rate_hertz: Option<u32>,
        #[serde(default)]
        end_of_response: bool,
    },

    /// Interrupt and unregister the stream
    StopStream,

    StreamStatus {
        session_id: String,
        status: String,
        message: Option<String>,
    },

    /// Header for an emitted unit; samples follow as a binary frame
    PlayableUnit {
        session_id: String,
        transcript: Option<String>,
        sample_rate: u32,
        sample_count: usize,
        duration_seconds: f64,
        is_final: bool,
    },

    Error {
        code: String,
        message: String,
        session_id: Option<String>,
    },

    Ping {
        timestamp: u64,
    },

    Pong {
        timestamp: u64,
    },
}

/// A unit from the tick loop, tagged with the stream that produced it.
#[derive(Debug)]
pub struct StreamUnit {
    pub session_id: String,
    pub unit: PlayableUnit,
}

/// Header message for `tagged`, or `None` when it belongs to a stream this
/// connection no longer owns.
pub fn unit_header(current_session: Option<&str>, tagged: &StreamUnit) -> Option<StreamMessage> {
    if current_session != Some(tagged.session_id.as_str()) {
        return None;
    }
    Some(StreamMessage::PlayableUnit {
        session_id: tagged.session_id.clone(),
        transcript: tagged.unit.transcript.clone(),
        sample_rate: tagged.unit.sample_rate,
        sample_count: tagged.unit.samples.len(),
        duration_seconds: tagged.unit.duration_seconds(),
        is_final: tagged.unit.is_final,
    })
}

/// Metadata waiting for its binary frame.
#[derive(Debug, Default)]
struct PendingChunk {
    transcript: Option<String>,
    sample_rate_hint: Option<u32>,
}

/// WebSocket actor for one response stream.
///
/// ## Actor Model:
/// The actor is the arrival path: it only enqueues. Units produced by the
/// tick loop reach it through a channel registered as a second actor stream.
pub struct ResponseStreamSocket {
    state: web::Data<AppState>,
    stream: Option<Arc<ResponseStream>>,
    units: Option<SpawnHandle>,
    default_sample_rate: Option<u32>,
    pending: Option<PendingChunk>,
    last_heartbeat: Instant,
}

impl ResponseStreamSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            state,
            stream: None,
            units: None,
            default_sample_rate: None,
            pending: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn session_id(&self) -> Option<String> {
        self.stream.as_ref().map(|s| s.session_id.clone())
    }

    fn send_json(ctx: &mut ws::WebsocketContext<Self>, msg: &StreamMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize WebSocket message: {}", err),
        }
    }

    /// Send error message to client.
    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        Self::send_json(
            ctx,
            &StreamMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
                session_id: self.session_id(),
            },
        );
        warn!("WebSocket error {}: {}", code, message);
    }

    fn send_status(
        ctx: &mut ws::WebsocketContext<Self>,
        session_id: &str,
        status: &str,
        message: &str,
    ) {
        Self::send_json(
            ctx,
            &StreamMessage::StreamStatus {
                session_id: session_id.to_string(),
                status: status.to_string(),
                message: Some(message.to_string()),
            },
        );
    }

    fn handle_start(
        &mut self,
        session_id: Option<String>,
        sample_rate: Option<u32>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        if self.stream.is_some() {
            self.send_error(ctx, "stream_already_started", "This connection already has a stream");
            return;
        }

        let (sink, units) = ChannelSink::channel();
        match self.state.sessions.create_session(session_id, Arc::new(sink)) {
            Ok(stream) => {
                let session_id = stream.session_id.clone();
                let tag = session_id.clone();
                let handle = ctx.add_stream(futures_util::stream::unfold(units, move |mut rx| {
                    let session_id = tag.clone();
                    async move {
                        let unit = rx.recv().await?;
                        Some((StreamUnit { session_id, unit }, rx))
                    }
                }));

                self.units = Some(handle);
                self.stream = Some(stream);
                self.default_sample_rate = sample_rate;

                info!(%session_id, "WebSocket response stream started");
                Self::send_status(ctx, &session_id, "started", "Stream registered");
            }
            Err(err) => self.send_error(ctx, "session_error", &err.to_string()),
        }
    }

    fn handle_audio_response(
        &mut self,
        text_data: Option<String>,
        sample_rate_hertz: Option<u32>,
        end_of_response: bool,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let Some(stream) = &self.stream else {
            self.send_error(ctx, "no_stream", "Send start_stream first");
            return;
        };

        if end_of_response {
            if self.pending.take().is_some() {
                debug!("End of response replaced unused chunk metadata");
            }
            stream.enqueue(RawChunk::end_marker());
            return;
        }

        self.pending = Some(PendingChunk {
            transcript: text_data,
            sample_rate_hint: sample_rate_hertz,
        });
    }

    fn handle_binary(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let Some(stream) = &self.stream else {
            self.send_error(ctx, "no_stream", "Send start_stream before audio data");
            return;
        };

        let pending = self.pending.take().unwrap_or_default();
        let mut chunk = RawChunk::data(data.to_vec(), pending.transcript);
        if let Some(rate) = pending.sample_rate_hint.or(self.default_sample_rate) {
            chunk = chunk.with_sample_rate_hint(rate);
        }

        debug!(len = data.len(), "Received response chunk");
        stream.enqueue(chunk);
    }

    fn handle_stop(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(stream) = self.stream.take() else {
            self.send_error(ctx, "no_stream", "No stream to stop");
            return;
        };

        if let Some(handle) = self.units.take() {
            ctx.cancel_future(handle);
        }
        stream.interrupt();
        self.state.sessions.remove(&stream.session_id);
        self.pending = None;
        Self::send_status(ctx, &stream.session_id, "stopped", "Stream unregistered");
    }
}

/// Little-endian f32 payload for a unit's binary frame.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 4];
    LittleEndian::write_f32_into(samples, &mut bytes);
    bytes
}

impl Actor for ResponseStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                Self::send_json(
                    ctx,
                    &StreamMessage::Ping {
                        timestamp: chrono::Utc::now().timestamp_millis() as u64,
                    },
                );
            }
        });
    }

    /// Called when the WebSocket connection stops.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(stream) = self.stream.take() {
            stream.interrupt();
            self.state.sessions.remove(&stream.session_id);
            info!(session_id = %stream.session_id, "Cleaned up WebSocket stream");
        }
        info!("WebSocket connection stopped");
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ResponseStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<StreamMessage>(&text) {
                Ok(StreamMessage::StartStream { session_id, sample_rate }) => {
                    self.handle_start(session_id, sample_rate, ctx);
                }
                Ok(StreamMessage::AudioResponse {
                    text_data,
                    sample_rate_hertz,
                    end_of_response,
                }) => {
                    self.handle_audio_response(text_data, sample_rate_hertz, end_of_response, ctx);
                }
                Ok(StreamMessage::StopStream) => self.handle_stop(ctx),
                Ok(StreamMessage::Ping { timestamp }) => {
                    self.last_heartbeat = Instant::now();
                    Self::send_json(ctx, &StreamMessage::Pong { timestamp });
                }
                Ok(StreamMessage::Pong { .. }) => {
                    self.last_heartbeat = Instant::now();
                }
                Ok(_) => {
                    warn!("Received unexpected message type from client");
                }
                Err(err) => {
                    self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err));
                }
            },
            Ok(ws::Message::Binary(data)) => self.handle_binary(&data, ctx),
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// Units emitted by the tick loop for this connection's stream.
impl StreamHandler<StreamUnit> for ResponseStreamSocket {
    fn handle(&mut self, tagged: StreamUnit, ctx: &mut Self::Context) {
        let current = self.session_id();
        let Some(header) = unit_header(current.as_deref(), &tagged) else {
            debug!(session_id = %tagged.session_id, "Dropping unit from a stopped stream");
            return;
        };

        Self::send_json(ctx, &header);
        if !tagged.unit.samples.is_empty() {
            ctx.binary(encode_samples(&tagged.unit.samples));
        }
    }

    /// The unit channel closes when the stream is unregistered; the
    /// connection itself stays open.
    fn finished(&mut self, _ctx: &mut Self::Context) {
        debug!("Playable unit channel closed");
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Upgrades the request and hands the connection to a `ResponseStreamSocket`.
pub async fn response_stream_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    ws::start(ResponseStreamSocket::new(app_state), &req, stream)
}
