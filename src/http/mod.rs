//! A minimal client for Discord's REST API.
//!
//! Every call is submitted to the shared [`RequestQueue`], so requests are
//! sent one at a time, in the order they were made. Each call returns a
//! [`QueueableFuture`] for its decoded response.
//!
//! Rate limits are respected in two ways: buckets reported in response
//! headers delay later requests on the same route, and a `429` response is
//! retried by the queue after the wait Discord asks for.

mod ratelimit;
mod route;

pub use self::route::*;

use self::ratelimit::{parse_429, RateLimitHeaders, RateLimits};
use crate::{
    id::{ChannelId, GuildId, MessageId, RoleId, UserId},
    model::{Channel, FromData, Guild, Message, User},
    request::{task_fn, QueueableFuture, RequestError, RequestQueue, RequestResult},
    Config,
};
use reqwest::{header::AUTHORIZATION, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, sync::Arc, time::Instant};
use tokio::{runtime::Handle, time::sleep};
use tracing::{debug, instrument, warn};

/// Response of `GET /gateway/bot`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewayBot {
    /// WebSocket URL to connect to.
    pub url: String,
    /// Recommended number of shards.
    pub shards: u32,
    /// Limits on new sessions.
    pub session_start_limit: SessionStartLimit,
}

/// Remaining `IDENTIFY` budget reported by `GET /gateway/bot`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionStartLimit {
    /// Sessions allowed per reset period.
    pub total: u32,
    /// Sessions left in this reset period.
    pub remaining: u32,
    /// Milliseconds until the limit resets.
    pub reset_after: u64,
    /// Identify requests allowed per 5 seconds.
    pub max_concurrency: u32,
}

struct HttpInner {
    client: Client,
    api_base: String,
    authorization: String,
    limits: RateLimits,
    runtime: Handle,
}

/// Handle to the REST API. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpInner>,
    queue: Arc<RequestQueue>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("api_base", &self.inner.api_base)
            .field("queue", &self.queue)
            .finish()
    }
}

impl HttpClient {
    /// Creates a client whose requests run on `queue`.
    ///
    /// `runtime` drives the underlying connections; the queue's worker thread
    /// blocks on it while each request is in flight.
    pub fn new(config: &Config, queue: Arc<RequestQueue>, runtime: Handle) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(config.user_agent.clone()).build()?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                api_base: config.api_base.trim_end_matches('/').to_string(),
                authorization: format!("Bot {}", config.token),
                limits: RateLimits::new(),
                runtime,
            }),
            queue,
        })
    }

    /// The queue this client submits to.
    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    /// Queues a request to `route`, decoding the response body as `T`.
    ///
    /// Fails immediately if a route parameter is missing, or if the queue no
    /// longer accepts requests.
    pub fn request<T>(
        &self,
        route: &Route,
        params: &RouteParams,
        body: Option<Value>,
    ) -> RequestResult<QueueableFuture<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let compiled = route.compile(params)?;
        let inner = self.inner.clone();

        self.queue.submit(task_fn(move || {
            let text = inner.runtime.block_on(inner.send(&compiled, body.as_ref()))?;
            decode_body(&text)
        }))
    }

    /// Fetches the gateway URL and recommended shard count.
    pub fn get_gateway_bot(&self) -> RequestResult<QueueableFuture<GatewayBot>> {
        self.request(&Route::GET_GATEWAY_BOT, &RouteParams::new(), None)
    }

    /// Fetches the bot's own user.
    pub fn current_user(&self) -> RequestResult<QueueableFuture<User>> {
        self.request(&Route::GET_CURRENT_USER, &RouteParams::new(), None)
    }

    /// Fetches a guild.
    pub fn get_guild(&self, guild_id: GuildId) -> RequestResult<QueueableFuture<Guild>> {
        self.request(&Route::GET_GUILD, &RouteParams::new().guild(guild_id), None)
    }

    /// Fetches a channel.
    pub fn get_channel(&self, channel_id: ChannelId) -> RequestResult<QueueableFuture<Channel>> {
        self.request(&Route::GET_CHANNEL, &RouteParams::new().channel(channel_id), None)
    }

    /// Posts a plain text message to a channel.
    pub fn create_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> RequestResult<QueueableFuture<Message>> {
        self.request(
            &Route::CREATE_MESSAGE,
            &RouteParams::new().channel(channel_id),
            Some(json!({ "content": content })),
        )
    }

    /// Replaces the text of a message sent by the bot.
    pub fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> RequestResult<QueueableFuture<Message>> {
        self.request(
            &Route::EDIT_MESSAGE,
            &RouteParams::new().channel(channel_id).message(message_id),
            Some(json!({ "content": content })),
        )
    }

    /// Deletes a message.
    pub fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> RequestResult<QueueableFuture<()>> {
        self.request(
            &Route::DELETE_MESSAGE,
            &RouteParams::new().channel(channel_id).message(message_id),
            None,
        )
    }

    /// Gives a role to a guild member.
    pub fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> RequestResult<QueueableFuture<()>> {
        self.request(
            &Route::ADD_MEMBER_ROLE,
            &RouteParams::new().guild(guild_id).user(user_id).role(role_id),
            None,
        )
    }

    /// Takes a role from a guild member.
    pub fn remove_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> RequestResult<QueueableFuture<()>> {
        self.request(
            &Route::REMOVE_MEMBER_ROLE,
            &RouteParams::new().guild(guild_id).user(user_id).role(role_id),
            None,
        )
    }
}

impl HttpInner {
    #[instrument(skip(self, route, body), fields(route = %route.bucket_key))]
    async fn send(&self, route: &CompiledRoute, body: Option<&Value>) -> RequestResult<String> {
        if let Some(delay) = self.limits.delay_for(&route.bucket_key, Instant::now()) {
            debug!("Waiting {:?} for rate limit bucket.", delay);
            sleep(delay).await;
        }

        let mut request = self
            .client
            .request(route.method.clone(), format!("{}{}", self.api_base, route.path))
            .header(AUTHORIZATION, &self.authorization);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        self.limits.update(
            &route.bucket_key,
            &RateLimitHeaders::parse(&headers),
            Instant::now(),
        );

        let text = response.text().await?;

        if status.as_u16() == 429 {
            let (retry_after, global) = parse_429(&headers, &text);
            warn!("Rate limited for {:?} (global: {}).", retry_after, global);

            if global {
                self.limits.set_global(retry_after, Instant::now());
            }

            return Err(RequestError::RateLimited { retry_after, global });
        }

        if !status.is_success() {
            debug!("Request failed with {}: {}", status, text);
            return Err(RequestError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

/// Decodes a response body. Empty bodies, as sent with `204 No Content`,
/// decode as JSON `null`.
fn decode_body<T: DeserializeOwned>(text: &str) -> RequestResult<T> {
    if text.trim().is_empty() {
        Ok(T::from_data(Value::Null)?)
    } else {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::FutureState;
    use std::{
        io::{Read, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
        time::Duration,
    };

    /// Serves one canned response per connection, reporting each request's
    /// head back to the test.
    fn serve(responses: Vec<String>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];

                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }

                tx.send(String::from_utf8_lossy(&head).into_owned()).unwrap();
                stream.write_all(response.as_bytes()).unwrap();
            }
        });

        (format!("http://{}", addr), rx)
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn client(api_base: String) -> HttpClient {
        let config = Config::new("secret").api_base(api_base);
        let queue = Arc::new(RequestQueue::with_limits(2, Duration::from_millis(10)));

        HttpClient::new(&config, queue, Handle::current()).unwrap()
    }

    #[test]
    fn empty_body_decodes_as_unit() {
        let out: () = decode_body("").unwrap();
        assert_eq!(out, ());

        let user: User = decode_body(r#"{"id":"7","username":"courier","bot":true}"#).unwrap();
        assert_eq!(user.id, UserId(7));
        assert!(user.bot);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_param_fails_before_queueing() {
        let http = client("http://127.0.0.1:9".into());
        let route = Route::new(reqwest::Method::GET, "/guilds/{guild.id}/roles");

        let res = http.request::<Value>(&route, &RouteParams::new(), None);

        assert!(matches!(res, Err(RequestError::MissingRouteParam(_))));
        assert!(http.queue().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rate_limited_request_is_retried() {
        let (base, heads) = serve(vec![
            response(
                "429 Too Many Requests",
                r#"{"message":"You are being rate limited.","retry_after":0.01,"global":false}"#,
            ),
            response("200 OK", r#"{"id":"42","username":"courier","bot":true}"#),
        ]);
        let http = client(base);

        let fut = http.current_user().unwrap();
        let user = tokio::task::spawn_blocking(move || fut.get()).await.unwrap().unwrap();

        assert_eq!(user.id, UserId(42));

        for _ in 0..2 {
            let head = heads.recv_timeout(Duration::from_secs(1)).unwrap();
            assert!(head.starts_with("GET /users/@me"));
            assert!(head.to_ascii_lowercase().contains("authorization: bot secret"));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_status_is_reported() {
        let (base, _heads) = serve(vec![response(
            "403 Forbidden",
            r#"{"message":"Missing Access","code":50001}"#,
        )]);
        let http = client(base);

        let fut = http.get_guild(GuildId(1)).unwrap();
        let waiter = fut.clone();
        let res = tokio::task::spawn_blocking(move || waiter.get()).await.unwrap();

        assert!(matches!(res, Err(RequestError::Status { status: 403, .. })));
        assert_eq!(fut.state(), FutureState::CompletedError);
    }
}
