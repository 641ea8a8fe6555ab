use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        Path, Request, State,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use clap_dashboard::{
    push::{run_push_channel, PushExit},
    sources::SourceManager,
    view::{Control, RowKind},
    Action, Config, Dashboard, DashboardError, Document, HttpDetectionApi, ReconnectPolicy, View,
};
use common::sources::NewRtspSource;
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{net::TcpListener, task::JoinHandle, time::Duration};

#[derive(Default)]
struct MockServer {
    rtsp: Vec<Value>,
    running: bool,
    saved_settings: Option<Value>,
    paths: Vec<String>,
    request_ids: Vec<String>,
}

type Shared = Arc<Mutex<MockServer>>;

async fn record(State(server): State<Shared>, request: Request, next: Next) -> Response {
    {
        let mut server = server.lock().unwrap();
        server.paths.push(format!("{} {}", request.method(), request.uri().path()));
        if let Some(id) = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
        {
            server.request_ids.push(id.to_string());
        }
    }
    next.run(request).await
}

async fn audio_sources() -> Json<Value> {
    Json(json!([
        {"type": "microphone", "index": 0, "name": "Built-in"},
        {"type": "output", "index": 1, "name": "Speakers"}
    ]))
}

async fn microphone_webhook() -> Json<Value> {
    Json(json!({"webhook_url": "https://hooks.example.com/mic"}))
}

async fn microphone_enabled() -> Json<Value> {
    Json(json!({"enabled": true}))
}

async fn rtsp_streams(State(server): State<Shared>) -> Json<Value> {
    Json(json!({"streams": server.lock().unwrap().rtsp}))
}

async fn create_rtsp(State(server): State<Shared>, Json(body): Json<Value>) -> Response {
    if body["name"] == "Duplicate" {
        let error = json!({"success": false, "error": "stream name already used"});
        return (axum::http::StatusCode::BAD_REQUEST, Json(error)).into_response();
    }
    let mut server = server.lock().unwrap();
    let mut stream = body;
    stream["id"] = json!(server.rtsp.len() + 1);
    server.rtsp.push(stream.clone());
    Json(json!({"success": true, "stream": stream})).into_response()
}

async fn delete_rtsp(State(server): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    server
        .lock()
        .unwrap()
        .rtsp
        .retain(|stream| stream["id"].to_string() != id);
    Json(json!({"success": true}))
}

async fn vban_sources() -> Json<Value> {
    Json(json!({"sources": [
        {"name": "Desk", "ip": "10.0.0.4", "port": 6980, "stream_name": "Desk"}
    ]}))
}

async fn saved_vban_sources() -> Json<Value> {
    Json(json!([]))
}

async fn legacy_save(State(server): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    server.lock().unwrap().saved_settings = Some(body);
    Json(json!({"success": true}))
}

async fn start(State(server): State<Shared>) -> Json<Value> {
    server.lock().unwrap().running = true;
    Json(json!({"success": true}))
}

async fn stop(State(server): State<Shared>) -> Json<Value> {
    server.lock().unwrap().running = false;
    Json(json!({"success": true}))
}

async fn status(State(server): State<Shared>) -> Json<Value> {
    Json(json!({"running": server.lock().unwrap().running}))
}

async fn push(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket| async move {
        let frames = [
            json!({"event": "labels", "data": {"detected": [
                {"label": "Speech", "score": 0.2},
                {"label": "Clapping", "score": 0.9}
            ]}}),
            json!({"event": "clap", "data": {"source_id": "1"}}),
        ];
        for frame in frames {
            if socket.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = socket.recv().await {}
    })
}

fn router(server: Shared) -> Router {
    // no /api/settings/save: the client must fall back to /save_settings
    Router::new()
        .route("/api/audio-sources", get(audio_sources))
        .route("/api/microphone/webhook", get(microphone_webhook))
        .route("/api/microphone/enabled", get(microphone_enabled))
        .route("/api/rtsp/streams", get(rtsp_streams))
        .route("/api/rtsp/stream", post(create_rtsp))
        .route("/api/rtsp/stream/:id", delete(delete_rtsp))
        .route("/api/vban/sources", get(vban_sources))
        .route("/api/vban/saved-sources", get(saved_vban_sources))
        .route("/save_settings", post(legacy_save))
        .route("/api/detection/start", post(start))
        .route("/api/detection/stop", post(stop))
        .route("/status", get(status))
        .route("/ws", get(push))
        .layer(middleware::from_fn_with_state(server.clone(), record))
        .with_state(server)
}

async fn spawn_router(router: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("server failed");
    });
    Ok((addr, handle))
}

async fn start_dashboard() -> Result<(Dashboard, Arc<Document>, Shared, JoinHandle<()>)> {
    let _ = tracing_subscriber::fmt::try_init();

    let server = Shared::default();
    let (addr, task) = spawn_router(router(server.clone())).await?;
    let config = Config::for_server(&format!("http://{addr}"))?;
    let api = Arc::new(HttpDetectionApi::new(
        config.server_url.clone(),
        config.http_timeout,
    )?);
    let document = Arc::new(Document::dashboard());
    let dashboard = Dashboard::new(config, api, document.clone());

    dashboard
        .initialize(&json!({"global": {"threshold": 0.6, "delay": 1}}))
        .await?;
    Ok((dashboard, document, server, task))
}

#[tokio::test]
async fn dashboard_loads_from_http_server() -> Result<()> {
    let (dashboard, document, server, task) = start_dashboard().await?;

    let options = document.rows(&Control::MicroSource);
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].key, "0|Built-in");
    assert_eq!(document.checked(&Control::MicWebhookEnabled), Some(true));
    assert_eq!(
        document.rows(&Control::RtspList)[0].kind,
        RowKind::Placeholder
    );
    assert_eq!(dashboard.vban().cache().len(), 1);
    assert!(!dashboard.session().is_detecting());

    let server = server.lock().unwrap();
    assert!(server.paths.contains(&"GET /status".to_string()));
    assert!(!server.request_ids.is_empty());
    let mut ids = server.request_ids.clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), server.request_ids.len(), "request ids must be unique");

    task.abort();
    Ok(())
}

#[tokio::test]
async fn rtsp_sources_round_trip_through_server() -> Result<()> {
    let (dashboard, document, server, task) = start_dashboard().await?;

    dashboard
        .dispatch(Action::AddRtsp(NewRtspSource {
            name: "Door".into(),
            url: "rtsp://cam.local/stream1".into(),
            webhook_url: String::new(),
            enabled: false,
        }))
        .await?;
    assert!(dashboard.rtsp().cache().get("1").is_some());
    assert_eq!(document.rows(&Control::RtspList)[0].key, "1");

    let rejected = dashboard
        .dispatch(Action::AddRtsp(NewRtspSource {
            name: "Duplicate".into(),
            url: "rtsp://cam.local/stream2".into(),
            webhook_url: String::new(),
            enabled: false,
        }))
        .await;
    assert!(matches!(rejected, Err(DashboardError::Server(ref m)) if m == "stream name already used"));
    assert_eq!(dashboard.rtsp().cache().len(), 1);

    dashboard.dispatch(Action::DeleteRtsp("1".into())).await?;
    assert!(server.lock().unwrap().rtsp.is_empty());
    assert_eq!(
        document.rows(&Control::RtspList)[0].kind,
        RowKind::Placeholder
    );

    dashboard
        .dispatch(Action::AddRtsp(NewRtspSource {
            name: "Yard".into(),
            url: "rtsp://cam.local/stream3".into(),
            webhook_url: String::new(),
            enabled: true,
        }))
        .await?;
    dashboard.dispatch(Action::SaveSettings).await?;
    {
        let server = server.lock().unwrap();
        let saved = server.saved_settings.as_ref().expect("settings saved");
        let names: Vec<&Value> = saved["rtsp_sources"]
            .as_array()
            .expect("rtsp_sources is a list")
            .iter()
            .map(|source| &source["name"])
            .collect();
        assert_eq!(names, vec![&json!("Yard")]);
    }

    task.abort();
    Ok(())
}

#[tokio::test]
async fn start_saves_through_legacy_endpoint() -> Result<()> {
    let (dashboard, _document, server, task) = start_dashboard().await?;

    dashboard.dispatch(Action::StartDetection).await?;
    assert!(dashboard.session().is_detecting());
    {
        let server = server.lock().unwrap();
        assert!(server.running);
        let saved = server.saved_settings.as_ref().expect("settings saved");
        assert_eq!(saved["global"]["threshold"], json!(0.6));
        let save = server
            .paths
            .iter()
            .position(|p| p == "POST /save_settings")
            .expect("legacy save called");
        let start = server
            .paths
            .iter()
            .position(|p| p == "POST /api/detection/start")
            .expect("start called");
        assert!(save < start);
    }

    dashboard.dispatch(Action::StopDetection).await?;
    assert!(!server.lock().unwrap().running);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn push_channel_updates_view() -> Result<()> {
    let (dashboard, document, _server, task) = start_dashboard().await?;
    document.insert_control(Control::ClapIndicator("1".into()));

    let shutdown = tokio_util::sync::CancellationToken::new();
    let channel = tokio::spawn(run_push_channel(
        dashboard.config().push_url.clone(),
        ReconnectPolicy::default(),
        Arc::clone(dashboard.push_handler()),
        shutdown.clone(),
    ));

    let indicator = Control::ClapIndicator("1".into());
    let mut flashed = false;
    for _ in 0..100 {
        if document.is_active(&indicator) {
            flashed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(flashed, "clap event did not reach the indicator");

    let labels = document.rows(&Control::DetectedLabels);
    assert_eq!(labels[0].text, "Clapping (90%)");
    assert!(document.is_visible(&Control::DetectedLabels));

    shutdown.cancel();
    assert_eq!(channel.await?, PushExit::Shutdown);
    task.abort();
    Ok(())
}
