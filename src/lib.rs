#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Courier is a threaded client core for Discord bots, written in Rust.
//!
//! The library offers:
//!  * A [gateway] session which identifies, heartbeats, and resumes or
//!  re-identifies as Discord's close codes require.
//!  * A [dispatch] stage which spreads gateway events over one or many
//!  threads, keeping each guild's events in order and holding them back until
//!  that guild's `GUILD_CREATE` has been handled.
//!  * Typed [events], delivered to registered listeners.
//!  * A [request] queue which runs outbound calls one at a time, in order,
//!  with cancellable [`QueueableFuture`]s, used by the [http] client.
//!
//! Most bots only need a [`Client`]:
//!
//! ```rust,no_run
//! use courier::{events::EventListener, model::Message, Client, Config};
//! use std::sync::Arc;
//!
//! struct Ping;
//!
//! impl EventListener for Ping {
//!     fn on_guild_message_create(&self, msg: &Message) {
//!         println!("#{}: {}", msg.channel_id, msg.content);
//!     }
//! }
//!
//! let client = Client::new(Config::new("my-token")).expect("Client failed to start.");
//! client.transmitter().add_listener(Arc::new(Ping));
//! client.connect().expect("Invalid gateway configuration.");
//! client.wait().expect("Session ended.");
//! ```
//!
//! ## Intents
//! Message content is a privileged intent. Enable it in the developer portal,
//! and request it with [`Config::intents()`], to receive message text.
//!
//! [`QueueableFuture`]: request::QueueableFuture

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
)]

pub mod awaiter;
mod client;
mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod id;
pub mod model;
pub mod request;

pub use crate::{
    client::Client,
    config::{Config, ProcessorMode},
};
