//! Tool server running commands in a local shell.
//!
//! Run with: cargo run -p gateway-server
//!
//! Then open http://localhost:3000 for a small console, or connect a tool
//! client to ws://localhost:3000/ws.
//!
//! Secrets are read from `GATEWAY_SECRET_<NAME>` variables (prefix set by
//! `GATEWAY_SECRET_PREFIX`); anything missing is asked for on this terminal.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{Router, response::Html, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vm_gateway_core::{GatewayConfig, VmSession};
use vm_gateway_session::{
    Gateway,
    secrets::{EnvSecretStore, PromptSecretStore},
};
use vm_gateway_shell::LocalShellSession;
use vm_gateway_transport::websocket::create_ws_router;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_SECRET_PREFIX: &str = "GATEWAY_SECRET_";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            let level = std::env::var("GATEWAY_LOG_LEVEL").ok()?;
            tracing_subscriber::EnvFilter::try_new(level).ok()
        })
        .unwrap_or_else(|| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let config = GatewayConfig::from_env().context("Invalid gateway configuration")?;
    tracing::info!(?config, "Loaded configuration");

    let prefix =
        std::env::var("GATEWAY_SECRET_PREFIX").unwrap_or_else(|_| DEFAULT_SECRET_PREFIX.into());
    let secrets = EnvSecretStore::new(prefix).with_fallback(Arc::new(PromptSecretStore::stdio()));

    let mut session = LocalShellSession::new();
    if let Ok(dir) = std::env::current_dir() {
        session = session.with_cwd(dir);
    }
    let gateway = Arc::new(Gateway::new(config, Arc::new(secrets)));
    gateway.register(Some(Arc::new(session) as Arc<dyn VmSession>));

    // Build router
    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(gateway))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr: SocketAddr = std::env::var("GATEWAY_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.into())
        .parse()
        .context("Invalid GATEWAY_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>VM Gateway - Console</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        #log {
            font-family: Menlo, Monaco, "Courier New", monospace;
            white-space: pre-wrap;
            height: calc(100vh - 160px);
            overflow-y: auto;
            background: #111;
            padding: 10px;
        }
        input { width: 70%; font-family: monospace; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>VM Gateway Console</h1>
    <div class="status" id="status">Connecting...</div>
    <div id="log"></div>
    <form id="form">
        <input id="command" placeholder="command, or a reply while a prompt is waiting" autofocus />
        <label><input type="checkbox" id="stream" checked /> stream</label>
    </form>

    <script>
        const log = document.getElementById('log');
        const status = document.getElementById('status');
        let ws;
        let seq = 0;
        let waiting = null;

        function write(text) {
            log.textContent += text;
            log.scrollTop = log.scrollHeight;
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                status.textContent = 'Connected';
                status.className = 'status connected';
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.type === 'output') {
                    write(msg.text + '\n');
                } else if (msg.type === 'chunk') {
                    write(msg.text);
                } else if (msg.type === 'awaiting_input') {
                    waiting = msg.id;
                } else if (msg.type === 'stream_ended') {
                    waiting = null;
                    if (msg.error) write(`\n[${msg.error}]\n`);
                } else if (msg.type === 'error') {
                    write(`[Error: ${msg.message}]\n`);
                }
            };
        }

        document.getElementById('form').addEventListener('submit', (e) => {
            e.preventDefault();
            const input = document.getElementById('command');
            const text = input.value;
            input.value = '';
            if (waiting) {
                ws.send(JSON.stringify({ type: 'input', id: waiting, text }));
                waiting = null;
                return;
            }
            const id = String(++seq);
            const type = document.getElementById('stream').checked ? 'stream' : 'execute';
            write(`$ ${text}\n`);
            ws.send(JSON.stringify({ type, id, command: text }));
        });

        connect();
    </script>
</body>
</html>
"#;
