use crate::{
    dispatch::{DispatchHandler, Dispatcher},
    error::{ClientError, GatewayError, GatewayResult},
    events::EventTransmitter,
    gateway::{Gateway, SessionState},
    http::HttpClient,
    request::{RequestQueue, RequestResult, ShutdownOption},
    Config,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// A bot client: a gateway session, its dispatch threads, and a REST client
/// which share one configuration.
///
/// The client owns a background tokio runtime for its sockets, so its
/// blocking methods must not be called from within an async context.
#[derive(Debug)]
pub struct Client {
    config: Config,
    runtime: Runtime,
    transmitter: Arc<EventTransmitter>,
    dispatcher: Arc<Dispatcher>,
    http: HttpClient,
    gateway: Mutex<Option<Arc<Gateway>>>,
}

impl Client {
    /// Builds a client, starting its runtime, dispatch and request threads.
    ///
    /// No connection is made until [`connect`] is called, so listeners
    /// should be registered on [`transmitter`] first.
    ///
    /// [`connect`]: Client::connect
    /// [`transmitter`]: Client::transmitter
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let runtime = Builder::new_multi_thread()
            .thread_name("courier-runtime")
            .enable_all()
            .build()?;

        let transmitter = Arc::new(EventTransmitter::new());
        let handler: Arc<dyn DispatchHandler> = transmitter.clone();
        let dispatcher = Arc::new(Dispatcher::new(&config, handler));

        let queue = Arc::new(RequestQueue::new(&config));
        let http = HttpClient::new(&config, queue, runtime.handle().clone())?;

        Ok(Self {
            config,
            runtime,
            transmitter,
            dispatcher,
            http,
            gateway: Mutex::new(None),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry of event listeners.
    pub fn transmitter(&self) -> &Arc<EventTransmitter> {
        &self.transmitter
    }

    /// REST client, sharing this client's request queue.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The gateway session, once [`connect`] has been called.
    ///
    /// [`connect`]: Client::connect
    pub fn gateway(&self) -> Option<Arc<Gateway>> {
        self.gateway.lock().clone()
    }

    /// Opens the gateway session in the background.
    ///
    /// Calling this while a session is running has no effect.
    pub fn connect(&self) -> GatewayResult<()> {
        let mut slot = self.gateway.lock();

        if let Some(gateway) = slot.as_ref() {
            if !matches!(gateway.state(), SessionState::Disconnected | SessionState::Fatal) {
                debug!("Gateway already running.");
                return Ok(());
            }
        }

        info!("Connecting to gateway.");
        let gateway = Gateway::start(
            &self.config,
            self.dispatcher.clone(),
            self.transmitter.clone(),
            self.runtime.handle(),
        )?;
        *slot = Some(Arc::new(gateway));

        Ok(())
    }

    /// Blocks until every guild listed in `READY` has been created, or until
    /// `timeout` elapses. Returns whether the guilds are ready.
    ///
    /// Before `READY` arrives there are no guilds to wait for, so this
    /// returns immediately.
    pub fn wait_for_guilds(&self, timeout: Option<Duration>) -> bool {
        let awaiter = self.dispatcher.gate().awaiter();

        match timeout {
            Some(timeout) => awaiter.wait_timeout(timeout),
            None => {
                awaiter.wait();
                true
            },
        }
    }

    /// Blocks until the gateway session ends.
    ///
    /// Returns an error if the session ended for any reason other than
    /// [`shutdown`], or if it was never started.
    ///
    /// [`shutdown`]: Client::shutdown
    pub fn wait(&self) -> GatewayResult<()> {
        let gateway = self.gateway().ok_or(GatewayError::Closed)?;

        self.runtime.block_on(gateway.wait())
    }

    /// Closes the gateway session, stops dispatch, then shuts down the
    /// request queue under `options`.
    ///
    /// Listeners receive no events after this returns, though queued
    /// requests may still complete if `options` allows it.
    pub fn shutdown(&self, options: ShutdownOption) -> RequestResult<()> {
        let options = options.validate()?;

        if let Some(gateway) = self.gateway() {
            gateway.shutdown();
            if let Err(e) = self.runtime.block_on(gateway.wait()) {
                debug!("Gateway ended with error during shutdown: {}", e);
            }
        }

        self.dispatcher.shutdown();
        self.http.queue().shutdown(options)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::RequestError;

    #[test]
    fn unconnected_client_shuts_down() {
        let client = Client::new(Config::new("token")).unwrap();

        assert!(client.gateway().is_none());
        assert!(matches!(client.wait(), Err(GatewayError::Closed)));
        assert!(client.wait_for_guilds(Some(Duration::from_millis(10))));

        client.shutdown(ShutdownOption::QUEUE_STOP_IMMEDIATELY).unwrap();
        client.http().queue().join();

        assert!(client.http().queue().is_halted());
        assert!(matches!(
            client.http().current_user(),
            Err(RequestError::ShuttingDown)
        ));
    }

    #[test]
    fn conflicting_shutdown_options_are_rejected() {
        let client = Client::new(Config::new("token")).unwrap();

        let res = client.shutdown(
            ShutdownOption::QUEUE_STOP_IF_EMPTY | ShutdownOption::QUEUE_STOP_IMMEDIATELY,
        );

        assert!(matches!(res, Err(RequestError::InvalidShutdownOptions(_))));
    }
}
