// feed-server/src/actors/hub_registry.rs
use actix::{Actor, Context, Handler, Message, MessageResult, Recipient};
use common::HubFrame;
use std::collections::HashMap;
use uuid::Uuid;

/// A frame to be written to one hub connection
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct HubPush(pub HubFrame);

/// Message for session registration
#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub connection_id: Uuid,
    pub subject: String,
    pub addr: Recipient<HubPush>,
}

/// Message for session unregistration
#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub connection_id: Uuid,
}

/// Deliver a frame to every connected session
#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast {
    pub frame: HubFrame,
}

/// Number of registered sessions
#[derive(Message)]
#[rtype(result = "usize")]
pub struct ConnectionCount;

struct Member {
    subject: String,
    addr: Recipient<HubPush>,
}

/// Tracks live hub sessions for fan-out delivery
#[derive(Default)]
pub struct HubRegistry {
    members: HashMap<Uuid, Member>,
}

impl HubRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for HubRegistry {
    type Context = Context<Self>;
}

impl Handler<Join> for HubRegistry {
    type Result = ();

    fn handle(&mut self, msg: Join, _ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Session joined hub: {} (subject {})", msg.connection_id, msg.subject);
        self.members.insert(
            msg.connection_id,
            Member {
                subject: msg.subject,
                addr: msg.addr,
            },
        );
    }
}

impl Handler<Leave> for HubRegistry {
    type Result = ();

    fn handle(&mut self, msg: Leave, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(member) = self.members.remove(&msg.connection_id) {
            tracing::info!("Session left hub: {} (subject {})", msg.connection_id, member.subject);
        }
    }
}

impl Handler<Broadcast> for HubRegistry {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _ctx: &mut Self::Context) -> Self::Result {
        tracing::debug!("Broadcasting to {} sessions", self.members.len());

        // Drop members whose actor has already stopped
        self.members.retain(|_, member| member.addr.connected());

        for member in self.members.values() {
            member.addr.do_send(HubPush(msg.frame.clone()));
        }
    }
}

impl Handler<ConnectionCount> for HubRegistry {
    type Result = MessageResult<ConnectionCount>;

    fn handle(&mut self, _msg: ConnectionCount, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.members.len())
    }
}
