#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Json, Router, body::Body, http::Response, routing::post};
use push2live::config::parse_config;
use push2live::error::StepError;
use push2live::notify::{CallbackNotifier, SlackResponse};
use push2live::runner::{CommandRunner, PipelineStep};
use push2live::{AppState, SharedState, api};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, mpsc};

pub const GITHUB_SECRET: &str = "gh-secret";
pub const SLACK_TOKEN: &str = "s3cret";

pub const CONFIG: &str = r#"
[github]
secret = "gh-secret"

[slack]
token = "s3cret"
allowed_origins = ["acmeC024BE91L", "acmeC999"]

[[target]]
name = "site"
repo_path = "/srv/site"
repository = "acme/site"
channel_id = "C024BE91L"
restart_command = "sudo ./restart.sh"
restart_dir = "/srv/compose"

[[target]]
name = "docs"
repo_path = "/srv/docs"
branch = "main"
repository = "acme/docs"
on_push = "release"
restart_command = "systemctl restart docs"
"#;

/// Records steps; fails the first one whose command line contains `fail_on`.
/// Every step waits on `gate`, which starts open unless built with `gated`;
/// a single `open` then lets all remaining steps through.
pub struct FakeRunner {
    pub calls: Mutex<Vec<PipelineStep>>,
    pub describe: String,
    pub fail_on: Option<String>,
    pub gate: Semaphore,
}

impl FakeRunner {
    pub fn new(describe: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            describe: describe.to_string(),
            fail_on: None,
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }

    pub fn failing_on(describe: &str, fail_on: &str) -> Self {
        Self {
            fail_on: Some(fail_on.to_string()),
            ..Self::new(describe)
        }
    }

    pub fn gated(describe: &str) -> Self {
        Self {
            gate: Semaphore::new(0),
            ..Self::new(describe)
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.command_line())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, step: &PipelineStep) -> Result<String, StepError> {
        drop(self.gate.acquire().await.unwrap());
        self.calls.lock().unwrap().push(step.clone());
        let line = step.command_line();
        if let Some(fail_on) = &self.fail_on {
            if line.contains(fail_on.as_str()) {
                return Err(StepError {
                    label: step.failure_label.clone(),
                    output: String::new(),
                    reason: "exit status 128".to_string(),
                });
            }
        }
        if line.starts_with("git describe") {
            Ok(format!("{}\n", self.describe))
        } else {
            Ok(String::new())
        }
    }
}

pub fn state(runner: Arc<dyn CommandRunner>) -> SharedState {
    let config = parse_config(CONFIG).unwrap();
    config.validate().unwrap();
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    Arc::new(AppState::new(
        config,
        runner,
        Arc::new(CallbackNotifier::new(client)),
    ))
}

pub fn app(state: SharedState) -> Router {
    api::router(state)
}

/// Serve the application on a local port for tests that need a real connection.
pub async fn serve(state: SharedState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Local endpoint standing in for Slack's `response_url`
pub async fn callback_server() -> (String, mpsc::UnboundedReceiver<SlackResponse>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/cb",
        post(move |Json(body): Json<SlackResponse>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                "ok"
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/cb", addr), rx)
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
