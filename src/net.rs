//! Wi-Fi command channel
//!
//! embassy-net sockets need an async task of their own, but commands must be
//! applied from the scheduler loop. The listener task therefore only moves
//! bytes: it accepts a client, collects one request, hands it over through
//! [`REQUESTS`] and writes back whatever arrives on [`REPLIES`].
//! [`ChannelLink`] is the scheduler's end of that pair.

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_net::{tcp::TcpSocket, Config as NetConfig, DhcpConfig, Stack, StackResources};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, signal::Signal};
use embassy_time::{Duration, Timer};
use esp_hal::{peripherals::WIFI, rng::Rng};
use esp_radio::wifi::{self, ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};
use heapless::Vec;
use log::{debug, info, warn};
use static_cell::StaticCell;

use crate::protocol::{self, MAX_REQUEST};
use crate::server::{CommandConn, CommandLink, LinkError};

/// Largest reply the listener will write back
pub const MAX_REPLY: usize = 256;

/// How long a client waits for the scheduler; covers a full gate pulse
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub type Request = Vec<u8, MAX_REQUEST>;
pub type Reply = Vec<u8, MAX_REPLY>;

/// Requests from the listener task to the scheduler
pub static REQUESTS: Channel<CriticalSectionRawMutex, Request, 1> = Channel::new();

/// Reply to the request in flight; `None` closes without answering
pub static REPLIES: Signal<CriticalSectionRawMutex, Option<Reply>> = Signal::new();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    #[error("radio init failed")]
    Radio,
    #[error("wifi driver init failed")]
    Wifi,
}

/// Brings up the station interface and spawns the network tasks
pub fn start(
    spawner: &Spawner,
    wifi_peripheral: WIFI<'static>,
    ssid: &'static str,
    password: &'static str,
    port: u16,
    read_timeout: Duration,
) -> Result<(), NetError> {
    let radio = esp_radio::init().map_err(|e| {
        warn!("radio init: {:?}", e);
        NetError::Radio
    })?;
    let radio = RADIO.init(radio);

    let (controller, interfaces) = wifi::new(radio, wifi_peripheral, Default::default()).map_err(|e| {
        warn!("wifi init: {:?}", e);
        NetError::Wifi
    })?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let resources = NET_RESOURCES.init(StackResources::new());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(DhcpConfig::default()),
        resources,
        seed,
    );

    spawner.must_spawn(net_task(runner));
    spawner.must_spawn(wifi_task(controller, ssid, password));
    spawner.must_spawn(listener_task(stack, port, read_timeout));
    Ok(())
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// Keeps the station associated, reconnecting after every drop
#[embassy_executor::task]
async fn wifi_task(mut controller: WifiController<'static>, ssid: &'static str, password: &'static str) {
    loop {
        if !matches!(controller.is_started(), Ok(true)) {
            let config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(ssid.into())
                    .with_password(password.into()),
            );
            if let Err(e) = controller.set_config(&config) {
                warn!("wifi config: {:?}", e);
                Timer::after(Duration::from_secs(10)).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                warn!("wifi start: {:?}", e);
                Timer::after(Duration::from_secs(10)).await;
                continue;
            }
        }

        info!("connecting to {}", ssid);
        match controller.connect_async().await {
            Ok(()) => {
                info!("wifi connected");
                controller.wait_for_event(WifiEvent::StaDisconnected).await;
                warn!("wifi disconnected");
                Timer::after(Duration::from_secs(5)).await;
            }
            Err(e) => {
                warn!("wifi connect: {:?}", e);
                Timer::after(Duration::from_secs(10)).await;
            }
        }
    }
}

#[embassy_executor::task]
async fn listener_task(stack: Stack<'static>, port: u16, read_timeout: Duration) {
    let mut rx_buf = [0u8; MAX_REQUEST];
    let mut tx_buf = [0u8; MAX_REPLY];

    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("command server on {}:{}", config.address.address(), port);
    }

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(read_timeout));

        match socket.accept(port).await {
            Ok(()) => match select(read_request(&mut socket), Timer::after(read_timeout)).await {
                Either::First(Some(request)) => relay(&mut socket, request).await,
                Either::First(None) => {}
                Either::Second(()) => debug!("request not complete in time"),
            },
            Err(e) => {
                warn!("accept: {:?}", e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }

        socket.close();
        let _ = socket.flush().await;
        socket.abort();
    }
}

/// Collects bytes until they form a command, the peer closes or the
/// buffer is full
async fn read_request(socket: &mut TcpSocket<'_>) -> Option<Request> {
    let mut buf = [0u8; MAX_REQUEST];
    let mut len = 0;
    while len < MAX_REQUEST {
        match socket.read(&mut buf[len..]).await {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(e) => {
                debug!("read: {:?}", e);
                break;
            }
        }
        match protocol::parse(&buf[..len]) {
            Err(e) if e.is_incomplete() => continue,
            _ => break,
        }
    }
    if len == 0 {
        return None;
    }
    Vec::from_slice(&buf[..len]).ok()
}

async fn relay(socket: &mut TcpSocket<'_>, request: Request) {
    REPLIES.reset();
    REQUESTS.send(request).await;
    match select(REPLIES.wait(), Timer::after(REPLY_TIMEOUT)).await {
        Either::First(Some(reply)) => {
            if let Err(e) = socket.write(&reply).await {
                warn!("reply: {:?}", e);
            }
        }
        Either::First(None) => {}
        Either::Second(()) => warn!("no reply from the controller"),
    }
}

/// Scheduler side of the command channel
pub struct ChannelLink;

impl CommandLink for ChannelLink {
    type Conn<'a> = ChannelConn;

    fn try_accept(&mut self) -> Result<Option<ChannelConn>, LinkError> {
        Ok(REQUESTS.try_receive().ok().map(|request| ChannelConn {
            request: Some(request),
            answered: false,
        }))
    }
}

/// A relayed request; dropping it unanswered releases the client
pub struct ChannelConn {
    request: Option<Request>,
    answered: bool,
}

impl CommandConn for ChannelConn {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let Some(request) = self.request.take() else {
            return Ok(0);
        };
        let n = request.len().min(buf.len());
        buf[..n].copy_from_slice(&request[..n]);
        Ok(n)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let reply = Vec::from_slice(bytes).map_err(|_| LinkError::Send)?;
        REPLIES.signal(Some(reply));
        self.answered = true;
        Ok(())
    }
}

impl Drop for ChannelConn {
    fn drop(&mut self) {
        if !self.answered {
            REPLIES.signal(None);
        }
    }
}
