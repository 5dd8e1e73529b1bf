//! The GATT server role: exporting the transport service and advertising it.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::advertisement::Advertisement;
use crate::bus::{AdvertisingManagerProxy, Bus};
use crate::context::{Context, Role};
use crate::error::ErrorKind;
use crate::event_loop::EventLoop;
use crate::gatt::GattService;
use crate::{Error, Result};

#[derive(Debug, Default)]
struct State {
    event_loop: Option<EventLoop>,
    /// Outcome of the setup done by the event loop, once it has finished.
    setup: Option<Result<()>>,
    name_owned: bool,
    services: Vec<Arc<GattService>>,
    registered: Vec<Arc<GattService>>,
    advertisement: Option<Arc<Advertisement>>,
    advertising_managers: Vec<Arc<dyn AdvertisingManagerProxy>>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    ready: Notify,
}

/// Manages the GATT server role.
#[derive(Debug, Clone, Default)]
pub struct Peripheral {
    inner: Arc<Inner>,
}

impl Peripheral {
    /// Creates a stopped GATT server role.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns `true` if the role is started.
    pub fn is_started(&self) -> bool {
        self.inner.state.lock().event_loop.is_some()
    }

    /// The services exported for the local adapters.
    pub fn services(&self) -> Vec<Arc<GattService>> {
        self.inner.state.lock().services.clone()
    }

    /// The advertising managers which accepted the advertisement.
    pub fn advertising_managers(&self) -> Vec<Arc<dyn AdvertisingManagerProxy>> {
        self.inner.state.lock().advertising_managers.clone()
    }

    /// Starts the GATT server role.
    ///
    /// Exports one transport service per local adapter and registers it with BlueZ, then advertises the service
    /// through every advertising manager willing to, and finally makes every local adapter discoverable. Managers
    /// rejecting the advertisement are dropped, but at least one must accept it. Any other failure undoes the steps
    /// completed so far.
    pub async fn start(&self, context: &Arc<Context>) -> Result<()> {
        if self.is_started() {
            return Err(ErrorKind::AlreadyStarted.into());
        }

        if context.adapters().is_empty() {
            warn!("No bluetooth hardware found.");
            return Err(Error::with_message(ErrorKind::NoHardware, "no bluetooth hardware found"));
        }

        let bus = context.bus()?;
        let runtime = context.runtime(Role::Server)?;

        {
            let mut state = self.inner.state.lock();
            if state.event_loop.is_some() {
                return Err(ErrorKind::AlreadyStarted.into());
            }

            let inner = self.inner.clone();
            let context = context.clone();
            let bus = bus.clone();
            state.setup = None;
            state.event_loop = Some(EventLoop::spawn(&runtime, move |quit| async move {
                let res = setup(&inner, &context, &*bus).await;
                if let Err(err) = &res {
                    error!("GATT server setup failed: {:?}", err);
                }
                inner.state.lock().setup = Some(res);
                inner.ready.notify_waiters();

                quit.requested().await;
                debug!("GATT server event loop finished");
            }));
        }

        let res = self.complete_start(context).await;
        if res.is_err() {
            if let Err(err) = self.stop(context).await {
                warn!("failed to roll back the GATT server start: {:?}", err);
            }
        }
        res
    }

    async fn complete_start(&self, context: &Context) -> Result<()> {
        let config = context.config();
        let mut setup = None;
        for _ in 0..config.peripheral_retries {
            let ready = self.inner.ready.notified();
            setup = self.inner.state.lock().setup.take();
            if setup.is_some() {
                break;
            }
            let _ = tokio::time::timeout(config.peripheral_timeout, ready).await;
        }
        if setup.is_none() {
            setup = self.inner.state.lock().setup.take();
        }

        match setup {
            Some(res) => res?,
            None => {
                return Err(Error::with_message(
                    ErrorKind::Timeout,
                    "timed out waiting for the GATT server setup",
                ))
            }
        }

        // Services must be accepted before they are advertised.
        for service in self.services() {
            let Some(manager) = service.gatt_manager() else {
                continue;
            };
            manager.register_service(service.object_path()).await?;
            info!("registered {} with {}", service.object_path(), manager.object_path());
            self.inner.state.lock().registered.push(service.clone());
        }

        self.register_advertisement().await?;

        for adapter in context.adapters() {
            adapter.set_powered(true).await?;
            adapter.set_discoverable(true).await?;
            debug!("{} is discoverable", adapter.name());
        }

        Ok(())
    }

    async fn register_advertisement(&self) -> Result<()> {
        let (advertisement, managers) = {
            let state = self.inner.state.lock();
            (state.advertisement.clone(), state.advertising_managers.clone())
        };
        let advertisement =
            advertisement.ok_or_else(|| Error::with_message(ErrorKind::Internal, "advertisement not exported"))?;

        let mut accepted = Vec::with_capacity(managers.len());
        for manager in managers {
            match manager.register_advertisement(advertisement.object_path()).await {
                Ok(()) => {
                    info!("advertising through {}", manager.object_path());
                    accepted.push(manager);
                }
                Err(err) => warn!(
                    "dropping advertising manager {} which rejected the advertisement: {:?}",
                    manager.object_path(),
                    err
                ),
            }
        }

        let empty = accepted.is_empty();
        self.inner.state.lock().advertising_managers = accepted;
        if empty {
            Err(Error::with_message(
                ErrorKind::Other,
                "no advertising manager accepted the advertisement",
            ))
        } else {
            Ok(())
        }
    }

    /// Stops the GATT server role.
    ///
    /// Local adapters stay powered but stop being discoverable. Stopping a role which is not started succeeds.
    pub async fn stop(&self, context: &Context) -> Result<()> {
        let (event_loop, name_owned, services, registered, advertisement, managers) = {
            let mut state = self.inner.state.lock();
            state.setup = None;
            (
                state.event_loop.take(),
                mem::take(&mut state.name_owned),
                mem::take(&mut state.services),
                mem::take(&mut state.registered),
                state.advertisement.take(),
                mem::take(&mut state.advertising_managers),
            )
        };

        let Some(event_loop) = event_loop else {
            return Ok(());
        };

        let mut res = Ok(());
        for adapter in context.adapters() {
            if let Err(err) = adapter.set_discoverable(false).await {
                warn!("failed to make {} undiscoverable: {:?}", adapter.name(), err);
                if res.is_ok() {
                    res = Err(err);
                }
            }
        }

        event_loop.quit().await;

        // Setup may have completed after the state was taken above.
        let (late_name_owned, late_services, late_advertisement) = {
            let mut state = self.inner.state.lock();
            (
                mem::take(&mut state.name_owned),
                mem::take(&mut state.services),
                state.advertisement.take(),
            )
        };
        let name_owned = name_owned || late_name_owned;
        let services: Vec<_> = services.into_iter().chain(late_services).collect();
        let advertisement = advertisement.or(late_advertisement);

        let bus = match context.bus() {
            Ok(bus) => bus,
            Err(err) => {
                warn!("GATT server stopped without a bus: {:?}", err);
                for service in &services {
                    service.release();
                }
                return res;
            }
        };

        if let Some(advertisement) = advertisement {
            for manager in managers {
                if let Err(err) = manager.unregister_advertisement(advertisement.object_path()).await {
                    warn!("failed to unregister the advertisement from {}: {:?}", manager.object_path(), err);
                }
            }
            if let Err(err) = bus.unexport_advertisement(&advertisement).await {
                warn!("failed to unexport the advertisement: {:?}", err);
            }
        }

        for service in registered {
            if let Some(manager) = service.gatt_manager() {
                if let Err(err) = manager.unregister_service(service.object_path()).await {
                    warn!("failed to unregister {}: {:?}", service.object_path(), err);
                }
            }
        }

        for service in services {
            if service.response().is_notifying() {
                service.release();
            }
            if let Err(err) = bus.unexport_service(&service).await {
                warn!("failed to unexport {}: {:?}", service.object_path(), err);
            }
        }

        if name_owned {
            let name = &context.config().bus_name;
            match bus.release_name(name).await {
                Ok(()) => info!("released D-Bus name {}", name),
                Err(err) => warn!("failed to release D-Bus name {}: {:?}", name, err),
            }
        }

        info!("GATT server stopped");
        res
    }
}

async fn setup(inner: &Inner, context: &Arc<Context>, bus: &dyn Bus) -> Result<()> {
    let config = context.config();

    match bus.request_name(&config.bus_name).await {
        Ok(()) => {
            info!("acquired D-Bus name {}", config.bus_name);
            inner.state.lock().name_owned = true;
        }
        Err(err) => warn!("lost D-Bus name {}: {:?}", config.bus_name, err),
    }

    let advertising_managers = bus.advertising_managers().await?;
    let gatt_managers = bus.gatt_managers().await?;
    debug!(
        "found {} GATT manager(s) and {} advertising manager(s)",
        gatt_managers.len(),
        advertising_managers.len()
    );

    for manager in gatt_managers {
        let hci = manager.object_path().rsplit('/').next().unwrap_or_default();
        let service = GattService::new(context, hci, Some(manager.clone()))?;
        bus.export_service(&service).await?;
        inner.state.lock().services.push(service);
    }

    let advertisement = Arc::new(Advertisement::new(config));
    bus.export_advertisement(&advertisement).await?;

    let mut state = inner.state.lock();
    state.advertisement = Some(advertisement);
    state.advertising_managers = advertising_managers;
    Ok(())
}
