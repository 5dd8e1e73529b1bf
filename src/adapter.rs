use std::sync::Arc;

use futures_lite::{future, StreamExt};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::bus::Connector;
use crate::context::{AdapterStateCallback, Context, ErrorCallback, PacketReceivedCallback, Role};
use crate::error::ErrorKind;
use crate::event_loop::{EventLoop, Quit};
use crate::peripheral::Peripheral;
use crate::{central, client, server, AdapterState, Config, Error, Result};

/// The LE transport adapter.
///
/// Owns the transport [`Context`] and drives both GATT roles. [`start`][LeAdapter::start] must be called before
/// either role is started.
#[derive(Debug)]
pub struct LeAdapter {
    context: Arc<Context>,
    connector: Arc<dyn Connector>,
    peripheral: Peripheral,
}

impl LeAdapter {
    /// Creates an adapter talking to BlueZ on the system bus.
    #[cfg(target_os = "linux")]
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(crate::bluez::SystemBus))
    }

    /// Creates an adapter reaching BlueZ through `connector`.
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        LeAdapter {
            context: Context::new(config),
            connector,
            peripheral: Peripheral::new(),
        }
    }

    /// The transport context.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// The GATT server role.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Returns `true` if the adapter is started.
    pub fn is_started(&self) -> bool {
        self.context.lock().event_loop.is_some()
    }

    /// Connects to BlueZ and waits for a local Bluetooth adapter to show up.
    ///
    /// The connection is served by a task spawned on the client runtime until [`stop`][LeAdapter::stop] is called.
    pub async fn start(&self) -> Result<()> {
        let runtime = self.context.runtime(Role::Client)?;

        {
            let mut state = self.context.lock();
            if state.event_loop.is_some() {
                return Err(ErrorKind::AlreadyStarted.into());
            }

            let context = self.context.clone();
            let connector = self.connector.clone();
            state.event_loop = Some(EventLoop::spawn(&runtime, move |quit| {
                run_event_loop(context, connector, quit)
            }));
        }

        let config = self.context.config();
        let found = self
            .context
            .wait_for(config.startup_retries, config.startup_timeout, |state| {
                !state.adapters.is_empty()
            })
            .await;

        if found {
            info!("LE adapter started");
            return Ok(());
        }

        let err = if self.context.is_attached() {
            warn!("No bluetooth hardware found.");
            Error::with_message(ErrorKind::NoHardware, "no bluetooth hardware found")
        } else {
            Error::with_message(ErrorKind::AdapterNotEnabled, "could not connect to BlueZ")
        };
        if let Err(err) = self.stop().await {
            debug!("stopping after a failed start: {:?}", err);
        }
        Err(err)
    }

    /// Stops both GATT roles, stops serving the BlueZ connection and forgets every proxy and peer.
    ///
    /// The adapter is stopped even if a role fails to stop cleanly. The first such failure is returned.
    pub async fn stop(&self) -> Result<()> {
        let event_loop = self.context.lock().event_loop.take();
        let Some(event_loop) = event_loop else {
            return Err(Error::with_message(ErrorKind::AdapterNotEnabled, "LE adapter not started"));
        };

        shut_down(&self.context, &self.peripheral, event_loop).await
    }

    /// Stops the adapter and both roles, then drops every callback and runtime.
    pub async fn terminate(&self) {
        debug!("terminating LE adapter");

        if self.is_started() {
            if let Err(err) = self.stop().await {
                warn!("failed to stop the LE adapter: {:?}", err);
            }
        } else if let Err(err) = self.peripheral.stop(&self.context).await {
            warn!("failed to stop the GATT server: {:?}", err);
        }

        let mut state = self.context.lock();
        state.callbacks = Default::default();
        state.client_runtime = None;
        state.server_runtime = None;
    }

    /// The address of the local Bluetooth adapter.
    ///
    /// With several local adapters, this is the address of the first one found.
    pub async fn address(&self) -> Result<String> {
        if !self.is_started() {
            return Err(ErrorKind::AdapterNotEnabled.into());
        }

        let adapter = self
            .context
            .adapters()
            .into_iter()
            .next()
            .ok_or_else(|| Error::with_message(ErrorKind::NoHardware, "no bluetooth hardware found"))?;
        adapter.address().await
    }

    /// Whether a local Bluetooth adapter is powered.
    pub async fn state(&self) -> Result<AdapterState> {
        if !self.is_started() {
            return Err(ErrorKind::AdapterNotEnabled.into());
        }

        for adapter in self.context.adapters() {
            if adapter.is_powered().await? {
                return Ok(AdapterState::Enabled);
            }
        }
        Ok(AdapterState::Disabled)
    }

    /// Starts the GATT server role.
    pub async fn start_gatt_server(&self) -> Result<()> {
        self.peripheral.start(&self.context).await
    }

    /// Stops the GATT server role along with the adapter.
    pub async fn stop_gatt_server(&self) -> Result<()> {
        self.stop().await
    }

    /// Starts the GATT client role.
    pub async fn start_gatt_client(&self) -> Result<()> {
        central::start(&self.context).await
    }

    /// Stops the GATT client role along with the adapter.
    pub async fn stop_gatt_client(&self) -> Result<()> {
        self.stop().await
    }

    /// Writes `data` to the GATT server `peer`.
    pub async fn send_to_gatt_server(&self, peer: &str, data: &[u8]) -> Result<()> {
        client::send_data(&self.context, peer, data).await
    }

    /// Writes `data` to every GATT server publishing the transport service.
    ///
    /// If none was discovered yet, discovery runs until one shows up or the discovery wait budget runs out.
    /// Discovery is then stopped so the local adapter can connect to every discovered server.
    pub async fn send_to_all_gatt_servers(&self, data: &[u8]) -> Result<()> {
        let context = &self.context;
        if context.devices().is_empty() {
            central::start_discovery(context).await?;

            let config = context.config();
            let found = context
                .wait_for(config.discovery_retries, config.discovery_timeout, |state| {
                    !state.devices.is_empty()
                })
                .await;
            if !found {
                return Err(Error::with_message(ErrorKind::NotFound, "no GATT server discovered"));
            }
        }

        central::stop_discovery(context).await?;
        central::connect_to_all(context).await?;
        client::send_data_to_all(context, data).await
    }

    /// Notifies `data` to the GATT client `peer`.
    pub async fn send_to_gatt_client(&self, peer: &str, data: &[u8]) -> Result<()> {
        server::send_response(&self.context, peer, data).await
    }

    /// Notifies `data` to every subscribed GATT client.
    pub async fn send_to_all_gatt_clients(&self, data: &[u8]) -> Result<()> {
        server::send_response_to_all(&self.context, data).await
    }

    /// Sets the callback receiving fragments written by GATT clients.
    ///
    /// Clients already subscribed keep the callback set when they subscribed.
    pub fn set_server_packet_received_callback(&self, callback: Option<PacketReceivedCallback>) {
        self.context.set_callbacks(|x| x.server_packet_received = callback);
    }

    /// Sets the callback receiving fragments notified by GATT servers.
    pub fn set_client_packet_received_callback(&self, callback: Option<PacketReceivedCallback>) {
        self.context.set_callbacks(|x| x.client_packet_received = callback);
    }

    /// Sets the callback receiving local adapter power state changes.
    pub fn set_adapter_state_callback(&self, callback: AdapterStateCallback) {
        self.context.set_callbacks(|x| x.adapter_state_changed = Some(callback));
    }

    /// Removes the callback receiving local adapter power state changes.
    pub fn unset_adapter_state_callback(&self) {
        self.context.set_callbacks(|x| x.adapter_state_changed = None);
    }

    /// Sets the callback receiving failed request writes.
    pub fn set_client_error_callback(&self, callback: Option<ErrorCallback>) {
        self.context.set_callbacks(|x| x.client_error = callback);
    }

    /// Sets the callback receiving failed response notifications.
    pub fn set_server_error_callback(&self, callback: Option<ErrorCallback>) {
        self.context.set_callbacks(|x| x.server_error = callback);
    }

    /// Sets the runtime the GATT client role and the BlueZ connection run on.
    pub fn set_client_runtime(&self, runtime: Handle) {
        self.context.set_runtime(Role::Client, runtime);
    }

    /// Sets the runtime the GATT server role runs on.
    pub fn set_server_runtime(&self, runtime: Handle) {
        self.context.set_runtime(Role::Server, runtime);
    }
}

impl Drop for LeAdapter {
    fn drop(&mut self) {
        let Ok(runtime) = self.context.runtime(Role::Client) else {
            return;
        };
        let event_loop = self.context.lock().event_loop.take();
        let Some(event_loop) = event_loop else {
            return;
        };

        debug!("LE adapter dropped while started");
        let context = self.context.clone();
        let peripheral = self.peripheral.clone();
        runtime.spawn(async move {
            if let Err(err) = shut_down(&context, &peripheral, event_loop).await {
                warn!("failed to stop the dropped LE adapter: {:?}", err);
            }
        });
    }
}

/// Stops both roles while the bus is still attached, then quits the base event loop and detaches the context.
async fn shut_down(context: &Arc<Context>, peripheral: &Peripheral, event_loop: EventLoop) -> Result<()> {
    let mut res = peripheral.stop(context).await;
    if let Err(err) = central::stop(context).await {
        warn!("failed to stop the GATT client: {:?}", err);
        res = res.and(Err(err));
    }

    event_loop.quit().await;
    if context.detach().is_some() {
        info!("LE adapter stopped");
    }
    res
}

async fn run_event_loop(context: Arc<Context>, connector: Arc<dyn Connector>, quit: Quit) {
    let events = match connector.connect().await {
        Ok(bus) => context.attach(bus).await,
        Err(err) => Err(err),
    };

    let mut events = match events {
        Ok(events) => events,
        Err(err) => {
            error!("failed to set up the BlueZ connection: {:?}", err);
            context.notify_changed();
            quit.requested().await;
            return;
        }
    };

    loop {
        let stop = async {
            quit.requested().await;
            None
        };
        let next = async { Some(events.next().await) };

        match future::or(stop, next).await {
            None => break,
            Some(Some(event)) => context.handle_event(event).await,
            Some(None) => {
                warn!("BlueZ signal stream ended");
                quit.requested().await;
                break;
            }
        }
    }

    debug!("event loop finished");
}
