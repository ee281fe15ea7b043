//! Typed events, and delivery of those events to user listeners.
//!
//! Dispatch payloads which clear the [dispatch] stage are decoded into an
//! [`Event`] by the [`EventTransmitter`], which then notifies each
//! [`EventListener`]. Listeners can be registered for all events, or for
//! specific [`EventIdentifier`]s:
//!
//! ```rust,no_run
//! use courier::{
//!     events::{EventIdentifier, EventListener, EventTransmitter},
//!     model::Message,
//! };
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl EventListener for Echo {
//!     fn on_guild_message_create(&self, msg: &Message) {
//!         println!("{}: {}", msg.author.username, msg.content);
//!     }
//! }
//!
//! let transmitter = EventTransmitter::new();
//! transmitter.add_specified_listener(EventIdentifier::GuildMessageCreate, Arc::new(Echo));
//! ```
//!
//! [dispatch]: crate::dispatch

mod event;
mod identifier;
mod listener;
mod transmitter;

pub use self::{event::*, identifier::*, listener::EventListener, transmitter::*};
