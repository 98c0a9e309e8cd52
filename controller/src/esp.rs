use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{Headers, Method as HttpMethod},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer},
    log::EspLogger,
    mdns::EspMdns,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use garage_common::{
    caller_from_peer, collect_args, connect_with_retry, DeviceControlService, DispatchObserver,
    Method, NetworkConfig, PeerFamily, Request, Response, RuntimeConfig, ROUTE_HEATER,
};

use crate::board::{RelayPin, StatusLed, ThermistorAdc, ADC_FULL_SCALE};

const MAX_HTTP_BODY: usize = 4096;
const STATUS_LED_PIN: i32 = 2;

type EspService = DeviceControlService<ThermistorAdc, RelayPin>;
type HttpRequest<'r, 'c> = esp_idf_svc::http::server::Request<&'r mut EspHttpConnection<'c>>;

struct RequestLog;

impl DispatchObserver for RequestLog {
    fn after_dispatch(&mut self, request: &Request, response: &Response) {
        if response.status_code >= 500 {
            warn!(
                "{} {} failed with {}: {}",
                request.method.as_str(),
                request.path,
                response.status_code,
                response.body
            );
        } else if request.path == ROUTE_HEATER && response.status_code == 204 {
            info!("heater command accepted: {:?}", request.arg(0));
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    ensure_device_defaults(&mut runtime);
    runtime.sanitize();
    runtime.validate().context("invalid runtime config")?;

    info!(
        "config loaded: ssid=`{}`, hostname=`{}`, guard={}",
        runtime.network.wifi_ssid,
        runtime.network.hostname,
        runtime.access.allowed_caller.as_deref().unwrap_or("open"),
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;

    let relay = RelayPin::new(runtime.heater.output_pin)
        .with_context(|| format!("failed to claim relay GPIO{}", runtime.heater.output_pin))?;
    let adc = ThermistorAdc::new(peripherals.adc1, peripherals.pins.gpio34)
        .context("failed to initialize thermistor ADC")?;

    let mut service = DeviceControlService::new(&runtime, adc, relay).with_observer(RequestLog);
    if let Some(led) = StatusLed::new(STATUS_LED_PIN) {
        service = service.with_observer(led);
    }
    // Relay must sit at OFF before the network comes up.
    if let Err(err) = service.initialize_output() {
        warn!("failed to drive heater output to OFF at startup: {err}");
    }

    let wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    let _mdns = match register_mdns(&runtime.network) {
        Ok(mdns) => {
            info!("mDNS responder started as {}.local", runtime.network.hostname);
            Some(mdns)
        }
        Err(err) => {
            warn!("mDNS registration failed: {err:#}");
            None
        }
    };

    let service = Arc::new(Mutex::new(service));
    let server = create_http_server(service, runtime.network.http_port)?;
    info!("HTTP server started on port {}", runtime.network.http_port);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_device_defaults(runtime: &mut RuntimeConfig) {
    if let Some(ssid) = option_env!("WIFI_SSID") {
        runtime.network.wifi_ssid = ssid.to_string();
    }
    if let Some(pass) = option_env!("WIFI_PASS") {
        runtime.network.wifi_pass = pass.to_string();
    }
    if let Some(caller) = option_env!("GARAGE_ALLOWED_CALLER") {
        runtime.access.allowed_caller = Some(caller.to_string());
    }
    if let Some(pin) = option_env!("GARAGE_RELAY_PIN").and_then(|value| value.parse().ok()) {
        runtime.heater.output_pin = pin;
    }
    runtime.thermistor.adc_resolution_steps = ADC_FULL_SCALE;
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if network.wifi_ssid.trim().is_empty() {
        return Err(anyhow!("wifi credentials missing; build with WIFI_SSID set"));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    connect_with_retry(
        network,
        |attempt| {
            info!(
                "wifi connect attempt {attempt}/{}",
                network.connect_attempts
            );
            let result = wifi.connect().and_then(|()| wifi.wait_netif_up());
            if let Err(err) = &result {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                let _ = wifi.disconnect();
            }
            result
        },
        thread::sleep,
    )?;

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!("connected to `{}`, IP address: {}", network.wifi_ssid, ip_info.ip);

    drop(wifi);
    Ok(esp_wifi)
}

fn register_mdns(network: &NetworkConfig) -> anyhow::Result<EspMdns> {
    let mut mdns = EspMdns::take()?;
    mdns.set_hostname(&network.hostname)?;
    mdns.set_instance_name(&network.hostname)?;
    mdns.add_service(None, "_http", "_tcp", network.http_port, &[])?;
    Ok(mdns)
}

fn create_http_server(
    service: Arc<Mutex<EspService>>,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 16 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    // One catch-all per verb; route matching happens in the control service.
    for method in [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Post,
        HttpMethod::Delete,
    ] {
        let service = service.clone();
        server.fn_handler::<anyhow::Error, _>("/*", method, move |mut req| {
            let request = decode_request(&mut req, method)?;
            let response = service
                .lock()
                .map_err(|_| anyhow!("control service lock poisoned"))?
                .handle(&request);
            write_response(req, &response)
        })?;
    }

    Ok(server)
}

fn decode_request(req: &mut HttpRequest<'_, '_>, method: HttpMethod) -> anyhow::Result<Request> {
    let uri = req.uri().to_string();
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (uri, None),
    };
    let content_type = req.content_type().map(str::to_string);
    let body = read_request_body(req)?;
    let caller = peer_address(req);

    Ok(Request::new(to_method(method), path)
        .with_args(collect_args(query.as_deref(), content_type.as_deref(), &body))
        .with_caller(caller))
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::Get,
        HttpMethod::Put => Method::Put,
        HttpMethod::Patch => Method::Patch,
        HttpMethod::Post => Method::Post,
        HttpMethod::Delete => Method::Delete,
        other => Method::Other(format!("{other:?}").to_ascii_uppercase()),
    }
}

fn read_request_body(req: &mut HttpRequest<'_, '_>) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

/// Remote address of the socket behind this request. The httpd listens on a
/// dual-stack socket, so IPv4 peers normally arrive as mapped IPv6 addresses.
fn peer_address(req: &mut HttpRequest<'_, '_>) -> Option<String> {
    use esp_idf_svc::sys::{
        httpd_req_to_sockfd, lwip_getpeername, sockaddr, sockaddr_in, sockaddr_in6, socklen_t,
        AF_INET, AF_INET6,
    };

    let raw = req.connection().raw_connection().ok()?;
    let fd = unsafe { httpd_req_to_sockfd(raw.handle()) };
    if fd < 0 {
        return None;
    }

    let mut addr: sockaddr_in6 = unsafe { core::mem::zeroed() };
    let mut len = core::mem::size_of::<sockaddr_in6>() as socklen_t;
    let rc = unsafe {
        lwip_getpeername(
            fd,
            &mut addr as *mut sockaddr_in6 as *mut sockaddr,
            &mut len,
        )
    };
    if rc != 0 {
        warn!("getpeername failed on socket {fd}");
        return None;
    }

    let (family, required) = match u32::from(addr.sin6_family) {
        family if family == AF_INET6 => (PeerFamily::Inet6, core::mem::size_of::<sockaddr_in6>()),
        family if family == AF_INET => (PeerFamily::Inet, core::mem::size_of::<sockaddr_in>()),
        family => (PeerFamily::Other(family), 0),
    };
    if (len as usize) < required {
        warn!("truncated peer address on socket {fd}: {len} bytes");
        return None;
    }

    let octets: Vec<u8> = match family {
        PeerFamily::Inet6 => unsafe { addr.sin6_addr.un.u8_addr }.to_vec(),
        PeerFamily::Inet => {
            let v4 = unsafe { &*(&addr as *const sockaddr_in6 as *const sockaddr_in) };
            v4.sin_addr.s_addr.to_ne_bytes().to_vec()
        }
        PeerFamily::Other(family) => {
            warn!("unexpected peer address family {family} on socket {fd}");
            return None;
        }
    };
    caller_from_peer(family, &octets)
}

fn write_response(req: HttpRequest<'_, '_>, response: &Response) -> anyhow::Result<()> {
    let mut headers = Vec::with_capacity(1);
    if let Some(content_type) = response.content_type {
        headers.push(("Content-Type", content_type));
    }
    let mut writer = req.into_response(response.status_code, None, &headers)?;
    if !response.body.is_empty() {
        writer.write_all(response.body.as_bytes())?;
    }
    Ok(())
}
