//! Browser Python playground served over a WebSocket.
//!
//! Run with: cargo run -p pytecode-web-server
//!
//! Then open http://localhost:3000 in your browser.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use axum::{Router, response::Html, routing::get};
use pytecode_executor::{PythonBackend, PythonConfig};
use pytecode_session::{ExecutionSession, storage::JsonFileStore};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = PythonConfig::from_env();
    tracing::info!(
        interpreter = %config.interpreter,
        working_dir = %config.working_dir.display(),
        "Using Python configuration"
    );

    let store = JsonFileStore::in_data_dir().context("locating settings file")?;
    tracing::info!(path = %store.path().display(), "Persisting settings");

    let session = ExecutionSession::open(PythonBackend::new(config), store)
        .await
        .context("restoring saved settings")?;
    let session = Arc::new(session);

    // Load the runtime in the background so the page is served right away
    let init_session = Arc::clone(&session);
    tokio::spawn(async move {
        if let Err(e) = init_session.start().await {
            tracing::error!("Initial environment load failed: {e}");
        }
    });

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(pytecode_transport::create_router(session))
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = std::env::var("PYTECODE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("parsing PYTECODE_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
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
    <title>PyteCode</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            font-family: system-ui, sans-serif;
            background: #fafafa;
            color: #222;
        }
        body.dark { background: #1e1e1e; color: #d4d4d4; }
        h1 { margin: 0 0 10px; }
        .toolbar { display: flex; gap: 8px; align-items: center; margin-bottom: 10px; flex-wrap: wrap; }
        .panes { display: flex; gap: 12px; height: calc(100vh - 160px); }
        #editor, #output {
            flex: 1;
            font-family: Menlo, Monaco, "Courier New", monospace;
            font-size: 14px;
            padding: 8px;
            border: 1px solid #888;
            background: inherit;
            color: inherit;
        }
        #output { overflow: auto; white-space: pre-wrap; margin: 0; }
        #graphics { flex: 1; overflow: auto; display: none; }
        #graphics img { max-width: 100%; display: block; margin-bottom: 8px; }
        .stderr { color: #c33; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
    </style>
</head>
<body>
    <h1>PyteCode</h1>
    <div class="status" id="status">Connecting...</div>
    <div class="toolbar">
        <button id="run" disabled>Run (Shift+Enter)</button>
        <button id="reset">Reset (Alt+R)</button>
        <button id="clear">Clear All (Ctrl+L)</button>
        <button id="save">Save (Ctrl+S)</button>
        <button id="console-view">Console</button>
        <button id="graphics-view" disabled>Graphics</button>
        <span id="libraries"></span>
        <select id="theme">
            <option value="system">System</option>
            <option value="light">Light</option>
            <option value="dark">Dark</option>
        </select>
    </div>
    <div class="panes">
        <textarea id="editor" spellcheck="false"></textarea>
        <pre id="output"></pre>
        <div id="graphics"></div>
    </div>

    <script>
        const LIBRARIES = ['numpy', 'pandas', 'matplotlib', 'scipy', 'scikit-learn'];
        const $ = (id) => document.getElementById(id);
        const editor = $('editor');
        const output = $('output');
        const graphics = $('graphics');
        const status = $('status');
        let ws;
        let backendReady = false;
        let running = false;

        for (const lib of LIBRARIES) {
            const label = document.createElement('label');
            label.innerHTML = `<input type="checkbox" value="${lib}"> ${lib}`;
            $('libraries').appendChild(label);
        }

        function send(msg) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify(msg));
            }
        }

        function refreshButtons() {
            $('run').disabled = !backendReady || running;
        }

        function selectedLibraries() {
            return [...document.querySelectorAll('#libraries input:checked')].map((el) => el.value);
        }

        function showView(mode) {
            output.style.display = mode === 'console' ? 'block' : 'none';
            graphics.style.display = mode === 'graphics' ? 'block' : 'none';
        }

        function applyTheme(theme) {
            $('theme').value = theme;
            const dark = theme === 'dark'
                || (theme === 'system' && window.matchMedia('(prefers-color-scheme: dark)').matches);
            document.body.classList.toggle('dark', dark);
        }

        function applySnapshot(snap) {
            backendReady = snap.backend_state === 'ready';
            running = snap.run_state === 'running';
            for (const el of document.querySelectorAll('#libraries input')) {
                el.checked = snap.library_selection.includes(el.value);
            }
            $('graphics-view').disabled = snap.image_count === 0;
            showView(snap.view_mode);
            status.textContent = snap.last_error ? `Error: ${snap.last_error}` : snap.backend_state;
            refreshButtons();
        }

        function download(fileName, contents) {
            const url = URL.createObjectURL(new Blob([contents], { type: 'text/x-python' }));
            const a = document.createElement('a');
            a.href = url;
            a.download = fileName;
            a.click();
            URL.revokeObjectURL(url);
        }

        function handle(msg) {
            switch (msg.type) {
                case 'output': {
                    const line = document.createElement('div');
                    line.textContent = msg.text;
                    if (msg.error) line.className = 'stderr';
                    output.appendChild(line);
                    break;
                }
                case 'image': {
                    const img = document.createElement('img');
                    img.src = `data:image/png;base64,${msg.data}`;
                    graphics.appendChild(img);
                    $('graphics-view').disabled = false;
                    break;
                }
                case 'cleared':
                    output.textContent = '';
                    graphics.textContent = '';
                    $('graphics-view').disabled = true;
                    break;
                case 'progress':
                    status.textContent = msg.message;
                    break;
                case 'backend_state':
                    backendReady = msg.state === 'ready';
                    status.textContent = msg.error ? `Failed: ${msg.error}` : msg.state;
                    refreshButtons();
                    break;
                case 'run_state':
                    running = msg.state === 'running';
                    refreshButtons();
                    break;
                case 'view_mode':
                    showView(msg.mode);
                    break;
                case 'source':
                    editor.value = msg.source;
                    break;
                case 'export':
                    download(msg.file_name, msg.contents);
                    break;
                case 'theme':
                    applyTheme(msg.theme);
                    break;
                case 'snapshot':
                    applySnapshot(msg.snapshot);
                    break;
                case 'error':
                    status.textContent = msg.message;
                    break;
            }
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
            ws.onopen = () => { status.textContent = 'Connected'; };
            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                backendReady = false;
                refreshButtons();
                setTimeout(connect, 2000);
            };
            ws.onmessage = (event) => {
                try {
                    handle(JSON.parse(event.data));
                } catch (e) {
                    console.error('Failed to parse message:', e);
                }
            };
        }

        const run = () => send({ type: 'run', source: editor.value });
        const save = () => send({ type: 'save' });
        $('run').onclick = run;
        $('reset').onclick = () => send({ type: 'reset' });
        $('clear').onclick = () => send({ type: 'clear' });
        $('save').onclick = save;
        $('console-view').onclick = () => send({ type: 'set_view_mode', mode: 'console' });
        $('graphics-view').onclick = () => send({ type: 'set_view_mode', mode: 'graphics' });
        $('theme').onchange = (e) => send({ type: 'set_theme', theme: e.target.value });
        $('libraries').onchange = () => send({ type: 'set_libraries', libraries: selectedLibraries() });
        editor.oninput = () => send({ type: 'update_source', source: editor.value });

        document.addEventListener('keydown', (e) => {
            if (e.key === 'Enter' && e.shiftKey) {
                e.preventDefault();
                if (!$('run').disabled) run();
            } else if (e.altKey && e.key.toLowerCase() === 'r') {
                e.preventDefault();
                send({ type: 'reset' });
            } else if (e.ctrlKey && e.key.toLowerCase() === 'l') {
                e.preventDefault();
                send({ type: 'clear' });
            } else if (e.ctrlKey && e.key.toLowerCase() === 's') {
                e.preventDefault();
                save();
            }
        });

        connect();
    </script>
</body>
</html>
"#;
