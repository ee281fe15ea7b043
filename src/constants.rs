//! Constants affecting gateway and API handling.

use std::time::Duration;

/// The Discord API and gateway version used by the library.
pub const API_VERSION: u8 = 10;

/// Base URL of Discord's REST API.
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Gateway URL used when none is configured.
///
/// Version and encoding query parameters are added when connecting.
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/";

/// `User-Agent` sent with every REST request, in the form Discord requires.
pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/courier-rs/courier, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Maximum number of guild events handled by one dispatch worker before it
/// yields to other guilds.
pub const DEFAULT_DISPATCH_BATCH_LIMIT: usize = 32;

/// Number of times a rate-limited request is retried before failing.
pub const DEFAULT_REQUEST_RETRY_LIMIT: usize = 3;

/// Longest a request queue's worker sleeps before rechecking for shutdown.
pub const DEFAULT_QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(250);
