//! A single presence-and-messaging chat room.
//!
//! Clients connect, claim a unique name, then talk to the whole room or
//! whisper to a few named members. The crate is split by responsibility:
//!
//! - [`roster`] is the name registry and enforces uniqueness.
//! - [`session`] holds per-connection state (`Unnamed` → `Named` →
//!   `Disconnected`).
//! - [`router`] turns one inbound event into roster changes plus a list of
//!   outbound deliveries, without touching any transport.
//! - [`room`] puts the roster behind one lock and performs the deliveries.
//! - [`clock`] renders the timestamps attached to room notices.
//! - [`event`] defines the JSON events and the line framing used over TCP.
//! - [`broker`] and [`web`] accept TCP and WebSocket connections and feed
//!   them into a shared [`room::Room`].
//! - [`client`] and [`cli`] make up the terminal front end.

pub mod broker;
pub mod cli;
pub mod client;
pub mod clock;
pub mod event;
pub mod room;
pub mod roster;
pub mod router;
pub mod session;
pub mod web;
