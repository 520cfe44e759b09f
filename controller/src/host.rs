use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{error, info, warn};

use irclimate_common::{
    parse_command_topic, state_topic, ClimateConfig, EngineConfig, FanMode, HvacMode,
    RuntimeConfig, CMD_FAN, CMD_MODE, CMD_TARGET, TOPIC_PREFIX,
};

use crate::{
    runtime::ClimateRuntime,
    sensors::{SensorCache, SensorRoutes},
    store::{FileStore, SnapshotStore},
    transport::{build_transport, Dispatcher},
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

#[derive(Clone)]
struct AppState {
    climates: Arc<Vec<Arc<ClimateRuntime>>>,
    sensors: SensorCache,
    routes: Arc<SensorRoutes>,
    commands: mpsc::UnboundedSender<MqttCommand>,
}

impl AppState {
    fn climate(&self, name: &str) -> Option<Arc<ClimateRuntime>> {
        self.climates
            .iter()
            .find(|runtime| runtime.name() == name)
            .cloned()
    }
}

/// A command received on `irclimate/<climate>/cmnd/<command>`.
#[derive(Debug)]
struct MqttCommand {
    climate: String,
    command: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = FileStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    for err in runtime.sanitize() {
        warn!("skipping climate: {err}");
    }
    if runtime.climates.is_empty() {
        warn!("no climates configured");
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.network.client_id.clone(), mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let sensors = SensorCache::default();
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(store);
    let mut routes = SensorRoutes::default();
    let mut climates = Vec::with_capacity(runtime.climates.len());
    for config in runtime.climates {
        for binding in [&config.power_sensor, &config.temp_sensor]
            .into_iter()
            .flatten()
        {
            routes.add(&binding.state_topic, &binding.entity_id);
        }

        let name = config.name.clone();
        let dispatcher = Dispatcher::new(
            name.clone(),
            build_transport(&name, &config.transport, mqtt.clone()),
        );
        let climate = ClimateRuntime::start(
            config,
            runtime.engine.clone(),
            dispatcher,
            sensors.clone(),
            snapshots.clone(),
        )
        .await;
        info!("[{name}] climate started");
        climates.push(Arc::new(climate));
    }

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let app_state = AppState {
        climates: Arc::new(climates),
        sensors,
        routes: Arc::new(routes),
        commands: commands_tx,
    };

    spawn_mqtt_loop(app_state.clone(), mqtt.clone(), eventloop);
    spawn_command_worker(app_state.clone(), commands_rx);
    for climate in app_state.climates.iter() {
        spawn_state_publish_loop(
            climate.clone(),
            mqtt.clone(),
            runtime.engine.state_publish_interval_ms,
        );
    }

    let app = Router::new()
        .route("/api/climates", get(handle_list_climates))
        .route("/api/climates/{name}", get(handle_get_climate))
        .route("/api/climates/{name}/mode", post(handle_set_mode))
        .route("/api/climates/{name}/fan", post(handle_set_fan))
        .route("/api/climates/{name}/target", post(handle_set_target))
        .route("/api/climates/{name}/transport", get(handle_get_transport))
        .with_state(app_state.clone());

    let port = std::env::var("IRCLIMATE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state.climates.clone()))
        .await?;
    Ok(())
}

async fn shutdown_signal(climates: Arc<Vec<Arc<ClimateRuntime>>>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }

    info!("shutting down");
    for climate in climates.iter() {
        climate.shutdown().await;
    }
}

fn subscribe_topics(mqtt: &AsyncClient, routes: &SensorRoutes) {
    let command_filter = format!("{TOPIC_PREFIX}/+/cmnd/+");
    for topic in routes.topics().chain([command_filter.as_str()]) {
        if let Err(err) = mqtt.try_subscribe(topic, QoS::AtMostOnce) {
            warn!("failed to subscribe to {topic}: {err}");
        }
    }
}

fn spawn_mqtt_loop(app_state: AppState, mqtt: AsyncClient, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    subscribe_topics(&mqtt, &app_state.routes);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Applies MQTT commands off the event loop, in arrival order.
fn spawn_command_worker(app_state: AppState, mut commands: mpsc::UnboundedReceiver<MqttCommand>) {
    tokio::spawn(async move {
        while let Some(MqttCommand {
            climate,
            command,
            value,
        }) = commands.recv().await
        {
            let Some(runtime) = app_state.climate(&climate) else {
                warn!("command for unknown climate {climate}");
                continue;
            };
            if let Err(message) = apply_command(&runtime, &command, &value).await {
                warn!("[{climate}] rejected {command} command '{value}': {message}");
            }
        }
    });
}

fn spawn_state_publish_loop(runtime: Arc<ClimateRuntime>, mqtt: AsyncClient, interval_ms: u64) {
    tokio::spawn(async move {
        let topic = state_topic(runtime.name());
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1_000)));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = runtime.changed() => {}
            }

            match serde_json::to_vec(&runtime.state_payload().await) {
                Ok(body) => {
                    if let Err(err) = mqtt.publish(&topic, QoS::AtLeastOnce, true, body).await {
                        warn!("[{}] state publish failed: {err}", runtime.name());
                    }
                }
                Err(err) => warn!("[{}] state serialization failed: {err}", runtime.name()),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    let entities = app_state.routes.entities(&topic);
    if !entities.is_empty() {
        for entity_id in entities {
            if !app_state.sensors.update(entity_id, &message) {
                continue;
            }
            for runtime in app_state.climates.iter() {
                if runtime.watches_power(entity_id) {
                    runtime.handle_power_event().await;
                }
                if runtime.watches_temp(entity_id) {
                    runtime.handle_temperature_event();
                }
            }
        }
        return Ok(());
    }

    if let Some((climate, command)) = parse_command_topic(&topic) {
        app_state
            .commands
            .send(MqttCommand {
                climate: climate.to_string(),
                command: command.to_string(),
                value: message,
            })
            .context("command worker stopped")?;
    }

    Ok(())
}

async fn apply_command(
    runtime: &ClimateRuntime,
    command: &str,
    value: &str,
) -> Result<bool, &'static str> {
    let changed = match command {
        CMD_MODE => {
            let mode = parse_mode(&runtime.config().await, value)?;
            runtime.set_mode(mode).await
        }
        CMD_FAN => {
            let fan = parse_fan(&runtime.config().await, value)?;
            runtime.set_fan_mode(fan).await
        }
        CMD_TARGET => {
            let target = parse_target(&runtime.engine_config().await, value)?;
            runtime.set_target_temperature(target).await
        }
        _ => return Err("Unknown command"),
    };
    Ok(changed)
}

fn parse_mode(config: &ClimateConfig, value: &str) -> Result<HvacMode, &'static str> {
    let mode = value
        .parse::<HvacMode>()
        .map_err(|_| "Invalid mode value")?;
    if !config.supports_mode(mode) {
        return Err("Mode is not supported by this climate");
    }
    Ok(mode)
}

fn parse_fan(config: &ClimateConfig, value: &str) -> Result<FanMode, &'static str> {
    let wanted = value.trim();
    if wanted.is_empty() {
        return Err("Invalid fan value");
    }
    config
        .fan_modes
        .iter()
        .find(|fan| fan.as_str().eq_ignore_ascii_case(wanted))
        .cloned()
        .ok_or("Fan mode is not supported by this climate")
}

/// Fractional targets are truncated toward zero before the bounds check.
fn parse_target(config: &EngineConfig, value: &str) -> Result<i32, &'static str> {
    let Ok(target) = value.trim().parse::<f32>() else {
        return Err("Invalid temperature value");
    };
    if !target.is_finite() {
        return Err("Invalid temperature value");
    }
    let target = target.trunc() as i32;
    if !(config.min_temp_c..=config.max_temp_c).contains(&target) {
        return Err("Temperature is outside the supported range");
    }
    Ok(target)
}

async fn handle_list_climates(State(state): State<AppState>) -> impl IntoResponse {
    let mut statuses = Vec::with_capacity(state.climates.len());
    for climate in state.climates.iter() {
        statuses.push(climate.status().await);
    }
    Json(statuses)
}

async fn handle_get_climate(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.climate(&name) {
        Some(runtime) => Json(runtime.status().await).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown climate"),
    }
}

async fn handle_get_transport(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.climate(&name) {
        Some(runtime) => Json(runtime.diagnostics()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown climate"),
    }
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    handle_command(state, name, CMD_MODE, params).await
}

async fn handle_set_fan(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    handle_command(state, name, CMD_FAN, params).await
}

async fn handle_set_target(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    handle_command(state, name, CMD_TARGET, params).await
}

async fn handle_command(
    state: AppState,
    name: String,
    command: &'static str,
    params: HashMap<String, String>,
) -> Response {
    let Some(runtime) = state.climate(&name) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown climate");
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    match apply_command(&runtime, command, value).await {
        Ok(_) => Json(runtime.status().await).into_response(),
        Err(message) => error_response(StatusCode::BAD_REQUEST, message),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
