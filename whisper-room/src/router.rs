//! Routing of inbound events.
//!
//! [`route`] and [`depart`] take the roster, the acting session and the
//! current [`Stamp`], apply any roster change, and return the events to
//! deliver. Nothing here touches a transport, so the whole decision table
//! can be tested without sockets.

use tracing::{debug, info};

use crate::{
    clock::Stamp,
    event::{ClientEvent, ServerEvent},
    roster::{RegisterError, Roster, normalize_name},
    session::{Session, SessionHandle, SessionId},
};

/// One outbound event addressed to one session.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: SessionHandle,
    pub event: ServerEvent,
}

impl Delivery {
    fn to(target: &SessionHandle, event: ServerEvent) -> Self {
        Self {
            target: target.clone(),
            event,
        }
    }

    pub fn target_id(&self) -> SessionId {
        self.target.id()
    }
}

pub fn route(
    roster: &mut Roster,
    session: &mut Session,
    event: ClientEvent,
    now: Stamp,
) -> Vec<Delivery> {
    match event {
        ClientEvent::Register { name } => register(roster, session, &name, now),
        ClientEvent::Chat { body, recipients } => chat(roster, session, &body, &recipients, now),
    }
}

/// Handles a closed channel. Only a named session changes the roster or
/// produces notices; calling this again for the same session is a no-op.
pub fn depart(roster: &mut Roster, session: &mut Session, now: Stamp) -> Vec<Delivery> {
    let Some(name) = session.close() else {
        debug!(session = %session.id(), "unnamed session disconnected");
        return Vec::new();
    };

    roster.remove(&name);
    info!(session = %session.id(), %name, "left the room");

    let notice = format!("{name} left the chatroom ({now})");
    let mut deliveries = fan_out(roster, ServerEvent::chat(notice));
    deliveries.extend(fan_out(roster, roster_update(roster)));
    deliveries
}

fn register(
    roster: &mut Roster,
    session: &mut Session,
    candidate: &str,
    now: Stamp,
) -> Vec<Delivery> {
    let name = match claim_name(roster, session, candidate) {
        Ok(name) => name,
        Err(error) => {
            debug!(session = %session.id(), %error, "registration rejected");
            let rejected = ServerEvent::RegisterResult { ok: false };
            return vec![Delivery::to(session.handle(), rejected)];
        }
    };
    info!(session = %session.id(), %name, "joined the room");

    let notice = format!("{name} entered the chatroom ({now})");
    let mut deliveries = fan_out(roster, ServerEvent::chat(notice));
    let accepted = ServerEvent::RegisterResult { ok: true };
    deliveries.push(Delivery::to(session.handle(), accepted));
    deliveries.extend(fan_out(roster, roster_update(roster)));
    deliveries
}

fn claim_name(
    roster: &mut Roster,
    session: &mut Session,
    candidate: &str,
) -> Result<String, RegisterError> {
    session.ensure_unnamed()?;
    let name = normalize_name(candidate);
    roster.try_register(&name, session.handle().clone())?;
    session.assign_name(name.clone())?;
    Ok(name)
}

fn chat(
    roster: &Roster,
    session: &Session,
    body: &str,
    recipients: &[String],
    now: Stamp,
) -> Vec<Delivery> {
    let Some(sender) = session.name() else {
        debug!(session = %session.id(), "dropping chat from unnamed session");
        return Vec::new();
    };
    if body.trim().is_empty() {
        return Vec::new();
    }

    if recipients.is_empty() {
        let text = format!("{sender} : {body} ({now})");
        fan_out(roster, ServerEvent::chat(text))
    } else {
        whisper(roster, session.handle(), sender, body, recipients)
    }
}

fn whisper(
    roster: &Roster,
    sender: &SessionHandle,
    sender_name: &str,
    body: &str,
    recipients: &[String],
) -> Vec<Delivery> {
    let mut delivered: Vec<&str> = Vec::new();
    let mut deliveries = Vec::new();

    for target in recipients {
        if delivered.contains(&target.as_str()) {
            continue;
        }
        let Some(handle) = roster.lookup(target) else {
            continue;
        };
        if handle.id() == sender.id() {
            continue;
        }
        let text = format!("{sender_name} whispers to you : {body}");
        deliveries.push(Delivery::to(handle, ServerEvent::chat(text)));
        delivered.push(target);
    }

    let confirmation = format!("You whisper to {} : {body}", delivered.join(", "));
    deliveries.push(Delivery::to(sender, ServerEvent::chat(confirmation)));
    deliveries
}

fn roster_update(roster: &Roster) -> ServerEvent {
    ServerEvent::RosterUpdate {
        names: roster.list_names(),
    }
}

fn fan_out(roster: &Roster, event: ServerEvent) -> Vec<Delivery> {
    roster
        .handles()
        .map(|handle| Delivery::to(handle, event.clone()))
        .collect()
}
