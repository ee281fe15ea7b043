use crate::{
    constants::*,
    gateway::retry::Retry,
    model::GatewayIntents,
};
use derivative::Derivative;
use std::{num::NonZeroUsize, time::Duration};

/// How dispatch events are spread across handler threads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessorMode {
    /// Every event is handled in arrival order by one thread.
    SingleThread,
    /// Events are handled by a pool of this many threads.
    ///
    /// Events for one guild are still handled in arrival order, but events
    /// for different guilds may be handled concurrently.
    MultiThread(NonZeroUsize),
}

impl Default for ProcessorMode {
    fn default() -> Self {
        Self::SingleThread
    }
}

/// Configuration for the gateway, dispatch and REST clients.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    #[derivative(Debug = "ignore")]
    /// Bot token used to identify and to authorize REST requests, without the
    /// `Bot ` prefix.
    ///
    /// Defaults to an empty token, which Discord will reject.
    pub token: String,

    /// Gateway events to subscribe to.
    ///
    /// Defaults to [`GatewayIntents::non_privileged`].
    pub intents: GatewayIntents,

    /// WebSocket URL first connected to.
    ///
    /// Defaults to [`GATEWAY_URL`]. Once a session is established, Discord's
    /// `resume_gateway_url` is used for resuming it.
    pub gateway_url: String,

    /// `[shard_id, shard_count]` sent with `IDENTIFY`.
    ///
    /// Defaults to `None`, which is treated by Discord as a single shard.
    pub shard: Option<[u32; 2]>,

    /// Selects how dispatch events are spread across threads.
    ///
    /// Defaults to [`ProcessorMode::SingleThread`].
    pub processor: ProcessorMode,

    /// Number of events one dispatch worker handles for a guild before
    /// giving other guilds a turn. Only used by [`ProcessorMode::MultiThread`].
    ///
    /// Defaults to [`DEFAULT_DISPATCH_BATCH_LIMIT`].
    pub dispatch_batch_limit: usize,

    /// Number of times a rate-limited REST request is retried.
    ///
    /// Defaults to [`DEFAULT_REQUEST_RETRY_LIMIT`].
    pub request_retry_limit: usize,

    /// Longest time the request queue's worker sleeps before rechecking its
    /// shutdown state.
    ///
    /// Defaults to [`DEFAULT_QUEUE_POLL_INTERVAL`].
    pub queue_poll_interval: Duration,

    /// Reconnection behaviour after the gateway connection is lost.
    ///
    /// Defaults to exponential backoff between 1s and 60s, retrying forever.
    pub gateway_retry: Retry,

    /// `User-Agent` sent with REST requests.
    ///
    /// Defaults to [`USER_AGENT`].
    pub user_agent: String,

    /// Base URL of the REST API.
    ///
    /// Defaults to [`API_BASE`].
    pub api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            intents: GatewayIntents::non_privileged(),
            gateway_url: GATEWAY_URL.to_string(),
            shard: None,
            processor: ProcessorMode::default(),
            dispatch_batch_limit: DEFAULT_DISPATCH_BATCH_LIMIT,
            request_retry_limit: DEFAULT_REQUEST_RETRY_LIMIT,
            queue_poll_interval: DEFAULT_QUEUE_POLL_INTERVAL,
            gateway_retry: Retry::default(),
            user_agent: USER_AGENT.to_string(),
            api_base: API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Creates a default `Config` for the given bot token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::default().token(token)
    }

    /// Sets this `Config`'s bot token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets this `Config`'s gateway intents.
    #[must_use]
    pub fn intents(mut self, intents: GatewayIntents) -> Self {
        self.intents = intents;
        self
    }

    /// Sets this `Config`'s initial gateway URL.
    #[must_use]
    pub fn gateway_url(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    /// Sets this `Config`'s shard, as `(shard_id, shard_count)`.
    #[must_use]
    pub fn shard(mut self, shard_id: u32, shard_count: u32) -> Self {
        self.shard = Some([shard_id, shard_count]);
        self
    }

    /// Sets this `Config`'s dispatch processor.
    #[must_use]
    pub fn processor(mut self, processor: ProcessorMode) -> Self {
        self.processor = processor;
        self
    }

    /// Sets this `Config`'s per-guild dispatch batch limit.
    #[must_use]
    pub fn dispatch_batch_limit(mut self, dispatch_batch_limit: usize) -> Self {
        self.dispatch_batch_limit = dispatch_batch_limit.max(1);
        self
    }

    /// Sets this `Config`'s REST rate-limit retry count.
    #[must_use]
    pub fn request_retry_limit(mut self, request_retry_limit: usize) -> Self {
        self.request_retry_limit = request_retry_limit;
        self
    }

    /// Sets this `Config`'s request queue poll interval.
    #[must_use]
    pub fn queue_poll_interval(mut self, queue_poll_interval: Duration) -> Self {
        self.queue_poll_interval = queue_poll_interval;
        self
    }

    /// Sets this `Config`'s gateway reconnection behaviour.
    #[must_use]
    pub fn gateway_retry(mut self, gateway_retry: Retry) -> Self {
        self.gateway_retry = gateway_retry;
        self
    }

    /// Sets this `Config`'s REST `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets this `Config`'s REST base URL.
    #[must_use]
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_hides_token() {
        let config = Config::new("very-secret-token");

        assert_eq!(config.token, "very-secret-token");
        assert!(!format!("{:?}", config).contains("very-secret-token"));
    }

    #[test]
    fn batch_limit_is_at_least_one() {
        assert_eq!(Config::default().dispatch_batch_limit(0).dispatch_batch_limit, 1);
    }
}
