//! Discord adapter: gateway websocket for inbound messages, REST for reactions.
//!
//! `DiscordGateway::connect()` spawns a task that owns the websocket session:
//! Hello → Identify → heartbeat loop → `MESSAGE_CREATE` dispatches forwarded
//! over a channel. Transport errors are forwarded too (the relay logs them)
//! and the task reconnects with capped exponential backoff. Close codes that
//! no reconnect can fix (bad token, disallowed intents) end the stream.
//!
//! Required bot setting: the privileged MESSAGE CONTENT intent must be enabled
//! in the Developer Portal, otherwise `content` arrives empty.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::{InboundMessage, MessageSource, Reactions, TransportError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const API_BASE: &str = "https://discord.com/api/v10";

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Inbound messages buffered while the relay is busy.
const INBOUND_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: User,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    author: User,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

// ---------------------------------------------------------------------------
// Gateway (inbound)
// ---------------------------------------------------------------------------

type Inbound = Result<InboundMessage, TransportError>;

/// Inbound message stream backed by a reconnecting gateway session.
pub struct DiscordGateway {
    rx: mpsc::Receiver<Inbound>,
}

impl DiscordGateway {
    /// Starts the gateway task. Connection errors surface through
    /// `next_message`, not here.
    pub fn connect(token: &str) -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(run_gateway(token.to_owned(), tx));
        Self { rx }
    }
}

#[async_trait]
impl MessageSource for DiscordGateway {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        self.rx.recv().await.transpose()
    }
}

/// How a gateway session ended without a transport error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Server asked us to reconnect, closed the socket, or the heartbeat went
    /// unanswered.
    Reconnect,
    /// op 9: the server rejected the session and wants a randomized pause.
    InvalidSession,
    /// Reconnecting cannot help; the reason is reported once.
    Fatal(String),
    /// The relay dropped the receiver.
    Detached,
}

/// Capped doubling delay between gateway sessions. Reset only once a
/// session reaches READY.
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: INITIAL_BACKOFF,
        }
    }

    fn reset(&mut self) {
        self.next = INITIAL_BACKOFF;
    }

    /// Returns the delay to wait now and doubles the following one.
    fn advance(&mut self) -> Duration {
        let wait = self.next;
        self.next = (self.next * 2).min(MAX_BACKOFF);
        wait
    }
}

/// Random pause of 1 to 5 seconds required after an invalid session.
fn invalid_session_wait() -> Duration {
    Duration::from_secs_f64(rand::thread_rng().gen_range(1.0..=5.0))
}

async fn run_gateway(token: String, tx: mpsc::Sender<Inbound>) {
    let mut backoff = Backoff::new();
    loop {
        let mut ready = false;
        let end = run_session(&token, &tx, &mut ready).await;
        if ready {
            backoff.reset();
        }

        let wait = match end {
            Ok(SessionEnd::Reconnect) => backoff.advance(),
            Ok(SessionEnd::InvalidSession) => backoff.advance().max(invalid_session_wait()),
            Ok(SessionEnd::Fatal(reason)) => {
                let _ = tx.send(Err(TransportError::Api(reason))).await;
                return;
            }
            Ok(SessionEnd::Detached) => return,
            Err(e) => {
                if tx.send(Err(e)).await.is_err() {
                    return;
                }
                backoff.advance()
            }
        };

        log::info!("discord: reconnecting in {:.1}s", wait.as_secs_f64());
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = tx.closed() => return,
        }
    }
}

/// Runs one websocket session from Hello until it ends.
///
/// `ready` is set once the server has accepted the Identify.
async fn run_session(
    token: &str,
    tx: &mpsc::Sender<Inbound>,
    ready: &mut bool,
) -> Result<SessionEnd, TransportError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(GATEWAY_URL).await?;

    let hello: Hello = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let payload = parse_payload(&text)?;
                if payload.op == OP_HELLO {
                    break decode(payload.d)?;
                }
            }
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    };

    ws.send(Message::Text(identify_payload(token).to_string()))
        .await?;

    let period = Duration::from_millis(hello.heartbeat_interval);
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + period / 2, period);
    let mut acked = true;
    let mut sequence: Option<u64> = None;
    let mut self_id: Option<String> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !acked {
                    log::warn!("discord: heartbeat not acknowledged");
                    return Ok(SessionEnd::Reconnect);
                }
                acked = false;
                ws.send(Message::Text(heartbeat_payload(sequence).to_string())).await?;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let payload = parse_payload(&text)?;
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }
                    match payload.op {
                        OP_DISPATCH => {
                            let event = payload.t.as_deref().unwrap_or_default();
                            let message = on_dispatch(event, payload.d, &mut self_id)?;
                            *ready |= self_id.is_some();
                            if let Some(message) = message {
                                if tx.send(Ok(message)).await.is_err() {
                                    return Ok(SessionEnd::Detached);
                                }
                            }
                        }
                        OP_HEARTBEAT => {
                            ws.send(Message::Text(heartbeat_payload(sequence).to_string())).await?;
                        }
                        OP_HEARTBEAT_ACK => acked = true,
                        OP_RECONNECT => return Ok(SessionEnd::Reconnect),
                        OP_INVALID_SESSION => return Ok(SessionEnd::InvalidSession),
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    return Ok(match code.and_then(fatal_close_reason) {
                        Some(reason) => SessionEnd::Fatal(reason),
                        None => SessionEnd::Reconnect,
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::Closed),
            },
        }
    }
}

/// Handles a dispatch event; returns a message to forward, if any.
fn on_dispatch(
    event: &str,
    data: serde_json::Value,
    self_id: &mut Option<String>,
) -> Result<Option<InboundMessage>, TransportError> {
    match event {
        "READY" => {
            let ready: Ready = decode(data)?;
            log::info!("discord: connected as {}", ready.user.username);
            *self_id = Some(ready.user.id);
            Ok(None)
        }
        "MESSAGE_CREATE" => {
            let message: MessageCreate = decode(data)?;
            Ok(Some(to_inbound(message, self_id.as_deref())))
        }
        _ => Ok(None),
    }
}

fn to_inbound(message: MessageCreate, self_id: Option<&str>) -> InboundMessage {
    let from_self = self_id == Some(message.author.id.as_str());
    InboundMessage {
        id: message.id,
        channel_id: message.channel_id,
        author_is_bot: message.author.bot || from_self,
        author_id: message.author.id,
        author_name: message.author.username,
        content: message.content,
    }
}

fn parse_payload(text: &str) -> Result<GatewayPayload, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Protocol(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, TransportError> {
    serde_json::from_value(data).map_err(|e| TransportError::Protocol(e.to_string()))
}

fn identify_payload(token: &str) -> serde_json::Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "keyrelay",
                "device": "keyrelay",
            },
        },
    })
}

fn heartbeat_payload(sequence: Option<u64>) -> serde_json::Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

/// Close codes after which reconnecting with the same settings cannot succeed.
fn fatal_close_reason(code: u16) -> Option<String> {
    let reason = match code {
        4004 => "authentication failed (check BOT_TOKEN)",
        4010 => "invalid shard",
        4011 => "sharding required",
        4012 => "invalid gateway API version",
        4013 => "invalid intents",
        4014 => "disallowed intents (enable MESSAGE CONTENT in the Developer Portal)",
        _ => return None,
    };
    Some(format!("gateway closed with {code}: {reason}"))
}

// ---------------------------------------------------------------------------
// REST (reactions)
// ---------------------------------------------------------------------------

/// Adds reactions through the REST API.
pub struct DiscordRest {
    http: reqwest::Client,
    auth: String,
    base: Url,
}

impl DiscordRest {
    pub fn new(token: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("DiscordBot (keyrelay, ", env!("CARGO_PKG_VERSION"), ")"))
            .timeout(Duration::from_secs(15))
            .build()?;
        let base =
            Url::parse(API_BASE).map_err(|e| TransportError::Protocol(e.to_string()))?;
        Ok(Self {
            http,
            auth: format!("Bot {token}"),
            base,
        })
    }

    async fn put_reaction(&self, url: Url) -> Result<reqwest::Response, TransportError> {
        Ok(self
            .http
            .put(url)
            .header(AUTHORIZATION, &self.auth)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?)
    }
}

#[async_trait]
impl Reactions for DiscordRest {
    async fn react(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let url = reaction_url(&self.base, channel_id, message_id, emoji)?;
        let mut response = self.put_reaction(url.clone()).await?;

        // Reactions have a tight per-channel limit; honor one retry hint.
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = response
                .json::<RateLimited>()
                .await
                .map(|r| Duration::from_secs_f64(r.retry_after.clamp(0.0, 5.0)))
                .unwrap_or(Duration::from_secs(1));
            log::debug!("discord: rate limited, retrying reaction in {wait:?}");
            tokio::time::sleep(wait).await;
            response = self.put_reaction(url).await?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Api(format!("{status}: {}", body.trim())))
    }
}

/// `<base>/channels/{channel}/messages/{message}/reactions/{emoji}/@me`,
/// with each segment percent-encoded.
fn reaction_url(
    base: &Url,
    channel_id: &str,
    message_id: &str,
    emoji: &str,
) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::Protocol(format!("{base} cannot be a base URL")))?
        .extend(&["channels", channel_id, "messages", message_id, "reactions", emoji, "@me"]);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn message_create(author_id: &str, bot: bool) -> serde_json::Value {
        json!({
            "id": "m1",
            "channel_id": "c1",
            "content": "3 not that one",
            "author": { "id": author_id, "username": "alice", "bot": bot },
            "pinned": false,
        })
    }

    #[test]
    fn intents_include_message_content() {
        assert_eq!(INTENTS, 37377);
    }

    #[test]
    fn identify_carries_token_and_intents() {
        let payload = identify_payload("tok");
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "tok");
        assert_eq!(payload["d"]["intents"], INTENTS);
    }

    #[test]
    fn heartbeat_sends_last_sequence_or_null() {
        assert_eq!(heartbeat_payload(None)["d"], serde_json::Value::Null);
        assert_eq!(heartbeat_payload(Some(42))["d"], 42);
    }

    #[test]
    fn ready_records_own_user_id() {
        let mut self_id = None;
        let data = json!({ "v": 10, "user": { "id": "bot1", "username": "relay", "bot": true } });
        assert_eq!(on_dispatch("READY", data, &mut self_id).unwrap(), None);
        assert_eq!(self_id.as_deref(), Some("bot1"));
    }

    #[test]
    fn message_create_becomes_inbound() {
        let mut self_id = Some("bot1".to_string());
        let message = on_dispatch("MESSAGE_CREATE", message_create("u1", false), &mut self_id)
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            InboundMessage {
                id: "m1".into(),
                channel_id: "c1".into(),
                author_id: "u1".into(),
                author_name: "alice".into(),
                author_is_bot: false,
                content: "3 not that one".into(),
            }
        );
    }

    #[test]
    fn own_messages_are_flagged_as_bot() {
        let mut self_id = Some("bot1".to_string());
        let message = on_dispatch("MESSAGE_CREATE", message_create("bot1", false), &mut self_id)
            .unwrap()
            .unwrap();
        assert!(message.author_is_bot);
    }

    #[test]
    fn other_bots_are_flagged() {
        let mut self_id = None;
        let message = on_dispatch("MESSAGE_CREATE", message_create("other", true), &mut self_id)
            .unwrap()
            .unwrap();
        assert!(message.author_is_bot);
    }

    #[test]
    fn other_events_are_skipped() {
        let mut self_id = None;
        assert_eq!(
            on_dispatch("TYPING_START", json!({}), &mut self_id).unwrap(),
            None
        );
    }

    #[test]
    fn malformed_dispatch_is_a_protocol_error() {
        let mut self_id = None;
        let err = on_dispatch("MESSAGE_CREATE", json!({ "id": 1 }), &mut self_id).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn payload_without_data_parses() {
        let payload = parse_payload(r#"{"op":11,"s":null,"t":null}"#).unwrap();
        assert_eq!(payload.op, OP_HEARTBEAT_ACK);
        assert!(payload.d.is_null());
    }

    #[test]
    fn auth_and_intent_closes_are_fatal() {
        assert!(fatal_close_reason(4004).unwrap().contains("BOT_TOKEN"));
        assert!(fatal_close_reason(4014).is_some());
        assert_eq!(fatal_close_reason(1000), None);
        assert_eq!(fatal_close_reason(4000), None);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap_and_resets() {
        let mut backoff = Backoff::new();
        let waits: Vec<u64> = (0..8).map(|_| backoff.advance().as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16, 32, 60, 60]);
        backoff.reset();
        assert_eq!(backoff.advance(), INITIAL_BACKOFF);
    }

    #[test]
    fn every_reconnect_waits_at_least_the_initial_backoff() {
        let mut backoff = Backoff::new();
        for _ in 0..20 {
            assert!(backoff.advance() >= INITIAL_BACKOFF);
        }
    }

    #[test]
    fn invalid_session_wait_is_between_one_and_five_seconds() {
        for _ in 0..200 {
            let wait = invalid_session_wait();
            assert!(wait >= Duration::from_secs(1), "{wait:?}");
            assert!(wait <= Duration::from_secs(5), "{wait:?}");
        }
    }

    #[test]
    fn reaction_url_encodes_emoji() {
        let base = Url::parse(API_BASE).unwrap();
        let url = reaction_url(&base, "c1", "m1", "⏳").unwrap();
        assert_eq!(
            url.as_str(),
            "https://discord.com/api/v10/channels/c1/messages/m1/reactions/%E2%8F%B3/@me"
        );
    }

    #[test]
    fn reaction_url_cannot_escape_its_path() {
        let base = Url::parse(API_BASE).unwrap();
        let url = reaction_url(&base, "../../users", "m1", "✅").unwrap();
        assert!(url.path().starts_with("/api/v10/channels/"));
        assert!(url.path().contains("..%2F..%2Fusers"));
    }
}
