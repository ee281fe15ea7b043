use super::{
    retry::Retry,
    session::{CloseAction, HeartbeatTick, Session, SessionState, SessionUpdate},
    ws::{Error as WsError, WsStream},
    GatewayCommand,
    GatewayStatus,
};
use crate::{
    dispatch::Dispatcher,
    error::{GatewayError, GatewayResult},
    events::{Event, EventTransmitter},
    model::{FromData, GatewayCloseStatusCode, GatewayPayload, Hello, OpCode, ReceivedPayload},
};
use flume::Receiver;
use parking_lot::Mutex;
use rand::{random, Rng};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::Duration,
};
use tokio::{
    select,
    time::{sleep_until, Instant},
};
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

/// Close code used when we drop a connection but intend to resume it.
const RESUME_CLOSE_CODE: u16 = 4000;
/// Close code used for a clean shutdown, which invalidates the session.
const NORMAL_CLOSE_CODE: u16 = 1000;

/// Number of gateway commands which may be sent per window.
pub(crate) const SEND_BUDGET: usize = 120;
/// Length of the gateway's send rate-limit window.
pub(crate) const SEND_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter for outbound gateway frames.
///
/// Every frame is recorded, but only commands are held back: part of the
/// budget is reserved so that heartbeats and the handshake always fit.
#[derive(Debug)]
pub(crate) struct SendRateLimiter {
    sent: VecDeque<Instant>,
    budget: usize,
    reserved: usize,
    window: Duration,
}

impl SendRateLimiter {
    pub(crate) fn new(budget: usize, window: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(budget),
            budget,
            reserved: 0,
            window,
        }
    }

    /// Sets aside room for `frames` control frames per window.
    pub(crate) fn reserve(&mut self, frames: usize) {
        self.reserved = frames.min(self.budget.saturating_sub(1));
    }

    /// Returns how long a command must wait before it may be sent.
    pub(crate) fn delay(&mut self, now: Instant) -> Option<Duration> {
        while let Some(oldest) = self.sent.front() {
            if now.duration_since(*oldest) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        let limit = self.budget - self.reserved;
        if self.sent.len() < limit {
            None
        } else {
            self.sent
                .get(self.sent.len() - limit)
                .map(|frame| (*frame + self.window).saturating_duration_since(now))
        }
    }

    pub(crate) fn record(&mut self, now: Instant) {
        self.sent.push_back(now);
    }
}

/// Control frames needed per window: one heartbeat per `interval`, plus the
/// `IDENTIFY` or `RESUME`.
pub(crate) fn control_frames(interval: Duration, window: Duration) -> usize {
    let interval = interval.as_millis().max(1);
    let beats = (window.as_millis() + interval - 1) / interval;

    usize::try_from(beats).unwrap_or(usize::MAX).saturating_add(1)
}

/// When the heartbeat after one sent at `from` is due. `None` if the
/// interval is zero or out of range.
pub(crate) fn heartbeat_deadline(from: Instant, interval: Duration) -> Option<Instant> {
    if interval.is_zero() {
        None
    } else {
        from.checked_add(interval)
    }
}

/// How a single connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// The user asked the gateway to stop.
    Shutdown,
    /// Discord refused the session.
    Fatal(GatewayCloseStatusCode),
    /// The connection was lost or dropped, and should be reopened.
    Reconnect {
        code: Option<GatewayCloseStatusCode>,
        delay: Option<Duration>,
    },
}

pub(crate) struct Runner {
    url: Url,
    retry: Retry,
    session: Session,
    dispatcher: Arc<Dispatcher>,
    transmitter: Arc<EventTransmitter>,
    rx: Receiver<GatewayCommand>,
    status: Arc<Mutex<GatewayStatus>>,
    limiter: SendRateLimiter,
    outbox: VecDeque<GatewayPayload>,
    flush_at: Option<Instant>,
    attempts: usize,
}

impl Runner {
    pub(crate) fn new(
        url: Url,
        retry: Retry,
        session: Session,
        dispatcher: Arc<Dispatcher>,
        transmitter: Arc<EventTransmitter>,
        rx: Receiver<GatewayCommand>,
        status: Arc<Mutex<GatewayStatus>>,
    ) -> Self {
        Self {
            url,
            retry,
            session,
            dispatcher,
            transmitter,
            rx,
            status,
            limiter: SendRateLimiter::new(SEND_BUDGET, SEND_WINDOW),
            outbox: VecDeque::new(),
            flush_at: None,
            attempts: 0,
        }
    }

    #[instrument(skip(self))]
    pub(crate) async fn run(mut self) -> GatewayResult<()> {
        let mut last_wait = None;

        loop {
            self.session.connecting();
            self.publish();

            let url = self.connect_url();
            debug!("Connecting to {}.", url);

            let end = match WsStream::connect(url).await {
                Ok(ws) => self.run_connection(ws).await,
                Err(e) => {
                    warn!("Failed to connect to gateway: {}", e);
                    ConnectionEnd::Reconnect {
                        code: None,
                        delay: None,
                    }
                },
            };

            match end {
                ConnectionEnd::Shutdown => {
                    info!("Gateway shut down.");
                    self.session.on_shutdown();
                    self.publish();
                    return Ok(());
                },
                ConnectionEnd::Fatal(code) => {
                    error!("Gateway session closed permanently: {}.", code);
                    self.publish();
                    self.fire(Event::Disconnected {
                        code: Some(code),
                        reconnecting: false,
                    });
                    return Err(GatewayError::Fatal(code));
                },
                ConnectionEnd::Reconnect { code, delay } => {
                    self.attempts += 1;
                    if self.attempts == 1 {
                        last_wait = None;
                    }

                    let wait = match delay {
                        Some(delay) => Some(delay),
                        None => self.retry.retry_in(last_wait, self.attempts),
                    };

                    self.publish();
                    self.fire(Event::Disconnected {
                        code,
                        reconnecting: wait.is_some(),
                    });

                    let wait = match wait {
                        Some(wait) => wait,
                        None => {
                            warn!("Gateway reconnect limit reached.");
                            return Err(GatewayError::RetriesExhausted);
                        },
                    };

                    if delay.is_none() {
                        last_wait = Some(wait);
                    }

                    debug!("Reconnecting in {:?} (attempt {}).", wait, self.attempts);
                    if self.sleep_or_shutdown(wait).await {
                        self.session.on_shutdown();
                        self.publish();
                        return Ok(());
                    }
                },
            }
        }
    }

    fn connect_url(&self) -> Url {
        let base = if self.session.can_resume() {
            self.session
                .resume_url()
                .and_then(|u| Url::parse(u).ok())
                .unwrap_or_else(|| self.url.clone())
        } else {
            self.url.clone()
        };

        with_gateway_query(base)
    }

    /// Waits out a reconnect delay. Returns `true` if shutdown was requested.
    async fn sleep_or_shutdown(&mut self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;

        loop {
            select! {
                () = sleep_until(deadline) => return false,
                cmd = self.rx.recv_async() => match cmd {
                    Ok(GatewayCommand::Send(payload)) => self.outbox.push_back(payload),
                    Ok(GatewayCommand::Shutdown) | Err(_) => return true,
                },
            }
        }
    }

    async fn run_connection(&mut self, mut ws: WsStream) -> ConnectionEnd {
        let interval = loop {
            select! {
                msg = ws.recv_json() => match msg {
                    Ok(Some(p)) if p.opcode() == OpCode::Hello => {
                        match p.data().cloned().map(Hello::from_data) {
                            Some(Ok(hello)) => break Duration::from_millis(hello.heartbeat_interval),
                            _ => {
                                warn!("Malformed HELLO, reconnecting.");
                                let _ = ws.close(RESUME_CLOSE_CODE).await;
                                return self.closed(None);
                            },
                        }
                    },
                    Ok(Some(other)) => trace!("Ignoring {} before HELLO.", other.opcode()),
                    Ok(None) | Err(WsError::Json(_)) => {},
                    Err(e) => return self.ws_failed(e),
                },
                cmd = self.rx.recv_async() => match cmd {
                    Ok(GatewayCommand::Send(payload)) => self.outbox.push_back(payload),
                    Ok(GatewayCommand::Shutdown) | Err(_) => {
                        let _ = ws.close(NORMAL_CLOSE_CODE).await;
                        return ConnectionEnd::Shutdown;
                    },
                },
            }
        };

        if heartbeat_deadline(Instant::now(), interval).is_none() {
            warn!("HELLO heartbeat interval {:?} out of range, reconnecting.", interval);
            let _ = ws.close(RESUME_CLOSE_CODE).await;
            return self.closed(None);
        }

        self.limiter = SendRateLimiter::new(SEND_BUDGET, SEND_WINDOW);
        self.limiter.reserve(control_frames(interval, SEND_WINDOW));
        self.flush_at = None;

        let handshake = self.session.on_hello(interval);
        self.publish();
        if let Err(e) = self.send_control(&mut ws, &handshake).await {
            return self.ws_failed(e);
        }
        self.fire(Event::Connected);

        // First beat is jittered, so that many clients do not beat in step.
        let mut next_heartbeat = Instant::now() + interval.mul_f64(random::<f64>());

        loop {
            let flush_at = self.flush_at;

            select! {
                () = sleep_until(next_heartbeat) => {
                    next_heartbeat = match heartbeat_deadline(Instant::now(), interval) {
                        Some(deadline) => deadline,
                        None => {
                            let _ = ws.close(RESUME_CLOSE_CODE).await;
                            return self.closed(None);
                        },
                    };
                    match self.session.heartbeat_tick() {
                        HeartbeatTick::Send(hb) => {
                            trace!("Sending heartbeat.");
                            if let Err(e) = self.send_control(&mut ws, &hb).await {
                                return self.ws_failed(e);
                            }
                        },
                        HeartbeatTick::Zombied => {
                            let _ = ws.close(RESUME_CLOSE_CODE).await;
                            return self.closed(Some(RESUME_CLOSE_CODE));
                        },
                    }
                }
                msg = ws.recv_json() => match msg {
                    Ok(Some(payload)) => {
                        if let Some(end) = self.process(&mut ws, payload).await {
                            return end;
                        }
                    },
                    Ok(None) => {},
                    Err(WsError::Json(e)) => warn!("Dropping malformed payload: {}", e),
                    Err(e) => return self.ws_failed(e),
                },
                () = sleep_until(flush_at.unwrap_or(next_heartbeat)), if flush_at.is_some() => {
                    if let Err(e) = self.flush_outbox(&mut ws).await {
                        return self.ws_failed(e);
                    }
                },
                cmd = self.rx.recv_async() => match cmd {
                    Ok(GatewayCommand::Send(payload)) => {
                        self.outbox.push_back(payload);
                        if self.session.state() == SessionState::Connected {
                            if let Err(e) = self.flush_outbox(&mut ws).await {
                                return self.ws_failed(e);
                            }
                        }
                    },
                    Ok(GatewayCommand::Shutdown) | Err(_) => {
                        let _ = ws.close(NORMAL_CLOSE_CODE).await;
                        return ConnectionEnd::Shutdown;
                    },
                },
            }
        }
    }

    async fn process(&mut self, ws: &mut WsStream, payload: GatewayPayload) -> Option<ConnectionEnd> {
        match payload.opcode() {
            OpCode::Dispatch => {
                match self.session.on_dispatch(&payload) {
                    Ok(Some(update)) => {
                        if let SessionUpdate::Ready(guilds) = update {
                            self.dispatcher.gate().expect_guilds(guilds);
                        }

                        self.attempts = 0;
                        self.publish();

                        if let Err(e) = self.flush_outbox(ws).await {
                            return Some(self.ws_failed(e));
                        }
                    },
                    Ok(None) => {},
                    Err(e) => warn!("Failed to read session from {:?}: {}", payload.event_type(), e),
                }

                self.dispatcher.push(ReceivedPayload::new(payload));
            },
            OpCode::Heartbeat => {
                trace!("Heartbeat requested by gateway.");
                let hb = self.session.heartbeat_payload();
                if let Err(e) = self.send_control(ws, &hb).await {
                    return Some(self.ws_failed(e));
                }
            },
            OpCode::HeartbeatAck => {
                self.session.on_heartbeat_ack();
                trace!("Heartbeat ACK received, latency {:?}.", self.session.latency());
                self.publish();
            },
            OpCode::Reconnect => {
                info!("Gateway requested reconnect.");
                self.session.on_reconnect_request();
                let _ = ws.close(RESUME_CLOSE_CODE).await;

                return Some(ConnectionEnd::Reconnect {
                    code: None,
                    delay: Some(Duration::ZERO),
                });
            },
            OpCode::InvalidSession => {
                let resumable = payload.data().and_then(|d| d.as_bool()).unwrap_or(false);
                warn!("Session invalidated (resumable: {}).", resumable);
                self.session.on_invalid_session(resumable);

                let code = if resumable {
                    RESUME_CLOSE_CODE
                } else {
                    NORMAL_CLOSE_CODE
                };
                let _ = ws.close(code).await;

                return Some(ConnectionEnd::Reconnect {
                    code: None,
                    delay: Some(invalid_session_delay()),
                });
            },
            OpCode::Hello => debug!("Ignoring repeated HELLO."),
            other => debug!("Ignoring unexpected opcode {}.", other),
        }

        None
    }

    /// Sends a heartbeat or handshake frame, which is never held back.
    async fn send_control(&mut self, ws: &mut WsStream, payload: &GatewayPayload) -> Result<(), WsError> {
        ws.send_json(payload).await?;
        self.limiter.record(Instant::now());

        Ok(())
    }

    /// Sends queued commands in order until the outbox is empty, or the
    /// command budget runs out. In the latter case a flush is scheduled.
    async fn flush_outbox(&mut self, ws: &mut WsStream) -> Result<(), WsError> {
        self.flush_at = None;

        while let Some(payload) = self.outbox.front() {
            let now = Instant::now();
            if let Some(delay) = self.limiter.delay(now) {
                debug!(
                    "Gateway send budget exhausted, deferring {} commands for {:?}.",
                    self.outbox.len(),
                    delay
                );
                self.flush_at = Some(now + delay);
                return Ok(());
            }

            ws.send_json(payload).await?;
            self.limiter.record(Instant::now());
            self.outbox.pop_front();
        }

        Ok(())
    }

    fn ws_failed(&mut self, e: WsError) -> ConnectionEnd {
        debug!("Gateway socket ended: {}", e);
        self.closed(e.close_code())
    }

    fn closed(&mut self, code: Option<u16>) -> ConnectionEnd {
        match self.session.on_close(code) {
            CloseAction::Fatal(code) => ConnectionEnd::Fatal(code),
            action => {
                debug!("Close handled as {:?}.", action);
                ConnectionEnd::Reconnect {
                    code: code.map(GatewayCloseStatusCode::from_int),
                    delay: None,
                }
            },
        }
    }

    fn fire(&self, event: Event) {
        self.transmitter.fire(&event);
    }

    fn publish(&self) {
        let mut status = self.status.lock();
        status.state = self.session.state();
        status.latency = self.session.latency();
        status.session_id = self.session.session_id().map(str::to_string);
    }
}

/// Appends the API version and encoding the gateway expects.
pub(crate) fn with_gateway_query(mut url: Url) -> Url {
    url.query_pairs_mut()
        .clear()
        .append_pair("v", &crate::constants::API_VERSION.to_string())
        .append_pair("encoding", "json");

    url
}

/// Discord asks for a random 1-5s wait before identifying again.
fn invalid_session_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(1_000..=5_000))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn limiter_blocks_after_budget() {
        let start = Instant::now();
        let mut limiter = SendRateLimiter::new(2, Duration::from_secs(60));

        assert_eq!(limiter.delay(start), None);
        limiter.record(start);
        limiter.record(start + Duration::from_secs(10));

        assert_eq!(
            limiter.delay(start + Duration::from_secs(20)),
            Some(Duration::from_secs(40))
        );
        assert_eq!(limiter.delay(start + Duration::from_secs(60)), None);
    }

    #[test]
    fn commands_leave_room_for_heartbeats() {
        let start = Instant::now();
        let mut limiter = SendRateLimiter::new(SEND_BUDGET, SEND_WINDOW);
        let reserved = control_frames(Duration::from_millis(41_250), SEND_WINDOW);
        assert_eq!(reserved, 3);
        limiter.reserve(reserved);

        for i in 0..(SEND_BUDGET - reserved) {
            assert_eq!(limiter.delay(start), None, "command {} held back", i);
            limiter.record(start);
        }
        assert_eq!(limiter.delay(start), Some(SEND_WINDOW));

        // Heartbeats still fit, and push later commands further back.
        limiter.record(start + Duration::from_secs(30));
        assert_eq!(
            limiter.delay(start + Duration::from_secs(30)),
            Some(Duration::from_secs(30))
        );
        assert_eq!(limiter.delay(start + SEND_WINDOW), None);
    }

    #[test]
    fn reserve_never_takes_the_whole_budget() {
        let start = Instant::now();
        let mut limiter = SendRateLimiter::new(4, SEND_WINDOW);
        limiter.reserve(control_frames(Duration::from_millis(1), SEND_WINDOW));

        assert_eq!(limiter.delay(start), None);
        limiter.record(start);
        assert!(limiter.delay(start).is_some());
    }

    #[test]
    fn heartbeat_deadline_rejects_unusable_intervals() {
        let now = Instant::now();

        assert_eq!(heartbeat_deadline(now, Duration::ZERO), None);
        assert_eq!(heartbeat_deadline(now, Duration::MAX), None);
        assert_eq!(
            heartbeat_deadline(now, Duration::from_secs(1)),
            Some(now + Duration::from_secs(1))
        );
    }

    #[test]
    fn gateway_query_is_set() {
        let url = with_gateway_query(Url::parse("wss://gateway.discord.gg/?v=6").unwrap());

        assert_eq!(url.as_str(), "wss://gateway.discord.gg/?v=10&encoding=json");
    }

    #[test]
    fn invalid_session_waits_between_one_and_five_seconds() {
        for _ in 0..32 {
            let delay = invalid_session_delay();
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(5));
        }
    }
}
