use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{
    clock::Stamp,
    event::{ClientEvent, ServerEvent},
    roster::Roster,
    router::{self, Delivery},
    session::{Session, SessionHandle, SessionId},
};

/// The single chat room shared by every dispatcher.
///
/// All roster reads and writes, and the fan-out that follows them, run while
/// holding one lock, so no session ever observes a half-applied join or
/// leave. Deliveries go into unbounded per-session queues and never wait on
/// a socket while the lock is held.
pub struct Room {
    roster: Mutex<Roster>,
    next_id: AtomicU64,
    clock: fn() -> Stamp,
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

impl Room {
    pub fn new() -> Self {
        Self::with_clock(Stamp::now)
    }

    pub fn with_clock(clock: fn() -> Stamp) -> Self {
        Self {
            roster: Mutex::new(Roster::new()),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Opens a new unnamed session and returns it with the receiving end of
    /// its outbound queue.
    pub fn connect(&self) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbox, inbox) = mpsc::unbounded_channel();
        (Session::new(SessionHandle::new(id, outbox)), inbox)
    }

    pub async fn handle(&self, session: &mut Session, event: ClientEvent) {
        let mut roster = self.roster.lock().await;
        let deliveries = router::route(&mut roster, session, event, (self.clock)());
        deliver(deliveries);
    }

    pub async fn disconnect(&self, session: &mut Session) {
        let mut roster = self.roster.lock().await;
        let deliveries = router::depart(&mut roster, session, (self.clock)());
        deliver(deliveries);
    }

    pub async fn names(&self) -> Vec<String> {
        self.roster.lock().await.list_names()
    }
}

fn deliver(deliveries: Vec<Delivery>) {
    for Delivery { target, event } in deliveries {
        target.send(event);
    }
}
