use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Router,
};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, trace, warn};

use garage_common::{
    caller_from_socket, collect_args, connect_with_retry_async, ActuatorError, AnalogInput,
    DeviceControlService, DispatchObserver, HeaterOutput, Method, OutputLevel, Request,
    Response, RuntimeConfig, SampleError, ROUTE_HEATER,
};

const MAX_HTTP_BODY: usize = 4096;
const HOST_DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_CONFIG_PATH: &str = "./garage.json";
const DEFAULT_SIMULATED_SAMPLE: u32 = 512;

type HostService =
    DeviceControlService<Box<dyn AnalogInput + Send>, Box<dyn HeaterOutput + Send>>;

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<HostService>>,
}

/// Stands in for the thermistor divider: a base sample with a small drift so
/// repeated reads are distinguishable.
struct SimulatedAdc {
    base: u32,
    resolution: u32,
    tick: u32,
}

impl AnalogInput for SimulatedAdc {
    fn sample(&mut self) -> Result<u32, SampleError> {
        self.tick = self.tick.wrapping_add(1);
        let sample = self.base.saturating_add(self.tick % 8);
        Ok(sample.min(self.resolution))
    }
}

struct SimulatedRelay {
    pin: i32,
}

impl HeaterOutput for SimulatedRelay {
    fn drive(&mut self, level: OutputLevel) -> Result<(), ActuatorError> {
        info!("relay GPIO{} driven {level:?}", self.pin);
        Ok(())
    }
}

/// Logs each dispatch and stands in for the board's status LED.
struct RequestTrace;

impl DispatchObserver for RequestTrace {
    fn before_dispatch(&mut self, request: &Request) {
        trace!("indicator on: {} {}", request.method.as_str(), request.path);
    }

    fn after_dispatch(&mut self, request: &Request, response: &Response) {
        trace!("indicator off");
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
        } else {
            debug!(
                "{} {} -> {}",
                request.method.as_str(),
                request.path,
                response.status_code
            );
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config().await?;
    info!(
        "config loaded: port={}, guard={}, polarity={:?}",
        runtime.network.http_port,
        runtime
            .access
            .allowed_caller
            .as_deref()
            .unwrap_or("open"),
        runtime.heater.polarity,
    );

    let addr: SocketAddr = ([0, 0, 0, 0], runtime.network.http_port).into();
    let max_attempts = runtime.network.connect_attempts;
    let listener = connect_with_retry_async(
        &runtime.network,
        |attempt| async move {
            TcpListener::bind(addr).await.inspect_err(|err| {
                warn!("bind attempt {attempt}/{max_attempts} failed: {err}")
            })
        },
        tokio::time::sleep,
    )
    .await
    .with_context(|| format!("failed to bind controller server at {addr}"))?;

    // mDNS needs the device network stack; on the host we only report the name.
    info!(
        "service discovery not registered on host; device advertises {}.local",
        runtime.network.hostname
    );

    let sample = std::env::var("GARAGE_ADC_SAMPLE")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_SIMULATED_SAMPLE);
    let analog: Box<dyn AnalogInput + Send> = Box::new(SimulatedAdc {
        base: sample,
        resolution: runtime.thermistor.adc_resolution_steps,
        tick: 0,
    });
    let relay: Box<dyn HeaterOutput + Send> = Box::new(SimulatedRelay {
        pin: runtime.heater.output_pin,
    });

    let mut service =
        DeviceControlService::new(&runtime, analog, relay).with_observer(RequestTrace);
    if let Err(err) = service.initialize_output() {
        warn!("failed to drive heater output to OFF at startup: {err}");
    }

    let app = build_router(AppState {
        service: Arc::new(Mutex::new(service)),
    });

    info!("controller listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let explicit = std::env::var("GARAGE_CONFIG").ok().map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut runtime = match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?,
        Err(err) if explicit.is_some() => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
        Err(_) => {
            debug!("no config at {}; using defaults", path.display());
            let mut runtime = RuntimeConfig::default();
            runtime.network.http_port = HOST_DEFAULT_HTTP_PORT;
            runtime
        }
    };

    apply_env_overrides(&mut runtime);
    runtime.sanitize();
    runtime.validate().context("invalid runtime config")?;
    Ok(runtime)
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Some(port) = std::env::var("GARAGE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.network.http_port = port;
    }
    if let Ok(caller) = std::env::var("GARAGE_ALLOWED_CALLER") {
        runtime.access.allowed_caller = Some(caller);
    }
}

fn build_router(state: AppState) -> Router {
    // The control service owns routing; axum only decodes and encodes.
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn handle_request(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let caller = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| caller_from_socket(addr));
    let method = Method::parse(request.method().as_str());
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let body = match axum::body::to_bytes(request.into_body(), MAX_HTTP_BODY).await {
        Ok(body) => body,
        Err(err) => {
            warn!("rejecting request body for {path}: {err}");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let request = Request::new(method, path)
        .with_args(collect_args(query.as_deref(), content_type.as_deref(), &body))
        .with_caller(caller);

    let response = {
        let mut service = state.service.lock().await;
        service.handle(&request)
    };
    into_http_response(response)
}

fn into_http_response(response: Response) -> axum::response::Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match response.content_type {
        Some(content_type) => {
            (status, [(header::CONTENT_TYPE, content_type)], response.body).into_response()
        }
        None if response.body.is_empty() => status.into_response(),
        None => (status, response.body).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use garage_common::{AccessConfig, FixedSample, RecordingOutput, GREETING};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;

    fn app(runtime: &RuntimeConfig, sample: u32) -> Router {
        let analog: Box<dyn AnalogInput + Send> = Box::new(FixedSample(sample));
        let relay: Box<dyn HeaterOutput + Send> = Box::new(RecordingOutput::default());
        build_router(AppState {
            service: Arc::new(Mutex::new(DeviceControlService::new(runtime, analog, relay))),
        })
    }

    fn request(method: &str, uri: &str, peer: &str) -> axum::http::Request<Body> {
        let mut request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), MAX_HTTP_BODY)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn heater_round_trip_over_http() {
        let app = app(&RuntimeConfig::default(), 512);

        let (status, body) =
            send(&app, request("PATCH", "/heater/?state=ON", "10.0.0.2:4000")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, "");

        let (status, body) =
            send(&app, request("GET", "/heater-status/", "10.0.0.2:4000")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"HeatingStatus":true}"#);
    }

    #[tokio::test]
    async fn root_greets_any_verb_and_method_case_matters() {
        let app = app(&RuntimeConfig::default(), 512);

        for method in ["POST", "PUT", "DELETE"] {
            let (status, body) = send(&app, request(method, "/", "10.0.0.2:4000")).await;
            assert_eq!(status, StatusCode::OK, "{method}");
            assert_eq!(body, GREETING);
        }

        let (status, _) =
            send(&app, request("patch", "/heater/?state=ON", "10.0.0.2:4000")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (_, body) = send(&app, request("GET", "/heater-status/", "10.0.0.2:4000")).await;
        assert_eq!(body, r#"{"HeatingStatus":false}"#);
    }

    #[tokio::test]
    async fn form_body_carries_heater_command() {
        let app = app(&RuntimeConfig::default(), 512);
        let mut patch = axum::http::Request::builder()
            .method("PATCH")
            .uri("/heater/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("state=ON"))
            .unwrap();
        patch
            .extensions_mut()
            .insert(ConnectInfo("10.0.0.2:4000".parse::<SocketAddr>().unwrap()));

        let (status, _) = send(&app, patch).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn temperature_is_json() {
        let app = app(&RuntimeConfig::default(), 512);
        let response = app
            .clone()
            .oneshot(request("GET", "/temperature/", "10.0.0.2:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn guarded_routes_use_peer_address() {
        let runtime = RuntimeConfig {
            access: AccessConfig {
                allowed_caller: Some("192.168.1.20".to_string()),
            },
            ..RuntimeConfig::default()
        };
        let app = app(&runtime, 512);

        let (status, body) =
            send(&app, request("GET", "/temperature/", "192.168.1.21:5000")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized");

        let (status, _) = send(&app, request("GET", "/temperature/", "192.168.1.20:5000")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, request("GET", "/", "192.168.1.21:5000")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_peer_address_is_refused_when_guarded() {
        let runtime = RuntimeConfig {
            access: AccessConfig {
                allowed_caller: Some("192.168.1.20".to_string()),
            },
            ..RuntimeConfig::default()
        };
        let app = app(&runtime, 512);
        let bare = axum::http::Request::builder()
            .uri("/heater-status/")
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(&app, bare).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_path_echoes_method_path_and_args() {
        let app = app(&RuntimeConfig::default(), 512);
        let (status, body) = send(&app, request("DELETE", "/foo/?x=1", "10.0.0.2:4000")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("URI: /foo/"), "{body}");
        assert!(body.contains("Method: DELETE"), "{body}");
        assert!(body.contains(" x: 1"), "{body}");
    }

    #[tokio::test]
    async fn sensor_fault_maps_to_service_unavailable() {
        let app = app(&RuntimeConfig::default(), 0);
        let (status, body) = send(&app, request("GET", "/temperature/", "10.0.0.2:4000")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.starts_with(r#"{"error":"#), "{body}");
    }

    #[test]
    fn env_overrides_replace_port_and_guard() {
        let mut runtime = RuntimeConfig::default();
        std::env::set_var("GARAGE_HTTP_PORT", "9090");
        std::env::set_var("GARAGE_ALLOWED_CALLER", "10.0.0.9");
        apply_env_overrides(&mut runtime);
        std::env::remove_var("GARAGE_HTTP_PORT");
        std::env::remove_var("GARAGE_ALLOWED_CALLER");

        assert_eq!(runtime.network.http_port, 9090);
        assert_eq!(runtime.access.allowed_caller.as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn simulated_adc_stays_within_resolution() {
        let mut adc = SimulatedAdc {
            base: 1020,
            resolution: 1023,
            tick: 0,
        };
        for _ in 0..16 {
            assert!(adc.sample().unwrap() <= 1023);
        }
    }
}
