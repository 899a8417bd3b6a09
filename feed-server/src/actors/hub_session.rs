// feed-server/src/actors/hub_session.rs
use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Recipient, StreamHandler};
use actix_web_actors::ws;
use common::{FeedConfig, HubConfig, HubFrame, Tick, ECHO_METHOD, FEED_METHOD};
use serde_json::Value;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::hub_registry::{Broadcast, HubPush, HubRegistry, Join, Leave};
use crate::auth::AuthenticatedUser;
use crate::feed::{FeedController, FeedStart, TickSink};

// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connected,
    Feeding,
    Disconnected,
}

/// One authenticated hub connection
pub struct HubSession {
    connection_id: Uuid,
    user: AuthenticatedUser,
    state: SessionState,
    last_heartbeat: Instant,
    feed: FeedController,
    registry: Addr<HubRegistry>,
    hub: HubConfig,
}

impl HubSession {
    pub fn new(
        user: AuthenticatedUser,
        registry: Addr<HubRegistry>,
        feed: &FeedConfig,
        hub: HubConfig,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user,
            state: SessionState::Connected,
            last_heartbeat: Instant::now(),
            feed: FeedController::new(feed.interval(), feed.payload_length),
            registry,
            hub,
        }
    }

    // Ping the client and drop it when it goes quiet
    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = Duration::from_secs(self.hub.heartbeat_interval_secs);
        let timeout = Duration::from_secs(self.hub.client_timeout_secs);

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                tracing::warn!("Hub client heartbeat timeout: {}", act.connection_id);
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn push(&self, frame: &HubFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!("Failed to serialize hub frame: {}", e),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame = match HubFrame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Invalid hub frame from {}: {}", self.connection_id, e);
                self.push(
                    &HubFrame::Close {
                        error: Some("Invalid hub frame".to_string()),
                    },
                    ctx,
                );
                ctx.close(Some(ws::CloseCode::Invalid.into()));
                ctx.stop();
                return;
            }
        };

        match frame {
            HubFrame::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                let outcome = self.invoke(&target, arguments, ctx);
                if let Err(error) = &outcome {
                    tracing::warn!("Invocation {} from {} failed: {}", target, self.connection_id, error);
                }
                if let Some(id) = invocation_id {
                    self.push(&HubFrame::completion(id, outcome.err()), ctx);
                }
            }
            HubFrame::Ping | HubFrame::Completion { .. } => {}
            HubFrame::Close { error } => {
                tracing::info!("Hub client {} sent close: {:?}", self.connection_id, error);
                ctx.close(None);
                ctx.stop();
            }
        }
    }

    fn invoke(
        &mut self,
        target: &str,
        arguments: Vec<Value>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Result<(), String> {
        match target {
            FEED_METHOD => {
                self.start_feed(ctx);
                Ok(())
            }
            ECHO_METHOD => {
                let (user, message) = echo_arguments(arguments)?;
                self.registry.do_send(Broadcast {
                    frame: HubFrame::receive(&user, &message),
                });
                Ok(())
            }
            other => Err(format!("Unknown hub method '{}'", other)),
        }
    }

    fn start_feed(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let sink: Recipient<HubPush> = ctx.address().recipient();

        match self.feed.start(sink) {
            FeedStart::Started => {
                self.state = SessionState::Feeding;
                tracing::info!("Feed started for {}", self.connection_id);
            }
            FeedStart::AlreadyRunning => {
                tracing::debug!("Ignoring duplicate Feed request from {}", self.connection_id);
            }
            FeedStart::Cancelled => {
                tracing::debug!("Feed requested on closing session {}", self.connection_id);
            }
        }
    }
}

/// `Echo(user, message)` takes exactly two strings.
fn echo_arguments(arguments: Vec<Value>) -> Result<(String, String), String> {
    let mut strings = arguments.into_iter().map(|value| match value {
        Value::String(s) => Some(s),
        _ => None,
    });

    match (strings.next(), strings.next(), strings.next()) {
        (Some(Some(user)), Some(Some(message)), None) => Ok((user, message)),
        _ => Err("Echo expects (user: string, message: string)".to_string()),
    }
}

impl TickSink for Recipient<HubPush> {
    fn deliver(&self, tick: Tick) -> bool {
        if !self.connected() {
            return false;
        }
        self.do_send(HubPush(HubFrame::data(&tick)));
        true
    }
}

impl Actor for HubSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            "Hub client connected: {} (subject {})",
            self.connection_id,
            self.user.subject
        );

        self.last_heartbeat = Instant::now();
        self.heartbeat(ctx);

        self.registry.do_send(Join {
            connection_id: self.connection_id,
            subject: self.user.subject.clone(),
            addr: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let was_feeding = self.state == SessionState::Feeding;
        self.state = SessionState::Disconnected;

        // Ends the feed loop, if any
        self.feed.cancel();

        self.registry.do_send(Leave {
            connection_id: self.connection_id,
        });

        tracing::info!(
            "Hub client disconnected: {} (was feeding: {})",
            self.connection_id,
            was_feeding
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for HubSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Ignoring binary frame from {}", self.connection_id);
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("Hub client {} closing connection: {:?}", self.connection_id, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => (),
            Err(e) => {
                tracing::info!("Hub transport error for {}: {}", self.connection_id, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<HubPush> for HubSession {
    type Result = ();

    fn handle(&mut self, msg: HubPush, ctx: &mut Self::Context) -> Self::Result {
        self.push(&msg.0, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_arguments_accepts_two_strings() {
        let args = vec![Value::from("alice"), Value::from("hi")];
        assert_eq!(
            echo_arguments(args).unwrap(),
            ("alice".to_string(), "hi".to_string())
        );
    }

    #[test]
    fn test_echo_arguments_rejects_bad_shapes() {
        assert!(echo_arguments(vec![]).is_err());
        assert!(echo_arguments(vec![Value::from("alice")]).is_err());
        assert!(echo_arguments(vec![Value::from("alice"), Value::from(3)]).is_err());
        assert!(echo_arguments(vec![
            Value::from("a"),
            Value::from("b"),
            Value::from("c")
        ])
        .is_err());
    }
}
