//! Shared test utilities for integration tests
//!
//! A scripted transport that hands every issued request to the test, plus
//! request builders and XDG isolation for config loading.

#![allow(dead_code)]

use futures::channel::mpsc as stream_mpsc;
use futures::StreamExt;
use graphcache::document::{
    Document, Field, InputValue, OperationDefinition, OperationKind, Selection, SelectionSet,
};
use graphcache::error::LinkError;
use graphcache::link::{Link, ResponseStream};
use graphcache::operation::{GraphqlError, OperationRequest, OperationResponse};
use graphcache::types::DataSource;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A request that reached the transport, with the handle to answer it.
pub struct Issued {
    pub request: OperationRequest,
    responder: stream_mpsc::UnboundedSender<Result<OperationResponse, LinkError>>,
}

impl Issued {
    pub fn id(&self) -> &str {
        self.request.request_id.as_str()
    }

    pub fn respond(&self, item: Result<OperationResponse, LinkError>) {
        let _ = self.responder.unbounded_send(item);
    }

    pub fn respond_ok(&self) {
        self.respond(Ok(network_ok(&self.request)));
    }

    pub fn respond_errors(&self, message: &str) {
        self.respond(Ok(network_error(&self.request, message)));
    }

    /// End the response stream without answering.
    pub fn hang_up(self) {}
}

/// Transport double: every request is handed to the test through `issued`.
pub struct ScriptedLink {
    issued: mpsc::UnboundedSender<Issued>,
}

impl ScriptedLink {
    pub fn new() -> (Self, IssuedRequests) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { issued: tx }, IssuedRequests { rx })
    }
}

impl Link for ScriptedLink {
    fn request(&self, request: OperationRequest) -> ResponseStream {
        let (responder, responses) = stream_mpsc::unbounded();
        let _ = self.issued.send(Issued { request, responder });
        responses.boxed()
    }
}

pub struct IssuedRequests {
    rx: mpsc::UnboundedReceiver<Issued>,
}

impl IssuedRequests {
    /// Wait for the next request to reach the transport.
    pub async fn next(&mut self) -> Issued {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for an issued request")
            .expect("transport dropped")
    }

    /// Assert nothing reaches the transport for a short while.
    pub async fn assert_idle(&mut self) {
        let waited = tokio::time::timeout(Duration::from_millis(50), self.rx.recv()).await;
        if let Ok(Some(issued)) = waited {
            panic!("unexpected request issued: {}", issued.id());
        }
    }
}

fn todo_selection() -> SelectionSet {
    SelectionSet::new(vec![
        Selection::Field(Field::leaf("id")),
        Selection::Field(Field::leaf("title")),
    ])
}

pub fn mutation(id: &str) -> OperationRequest {
    let document = Document::new(OperationDefinition {
        kind: OperationKind::Mutation,
        name: Some("AddTodo".to_string()),
        selection_set: SelectionSet::new(vec![Selection::Field(
            Field::object("addTodo", todo_selection())
                .with_argument("title", InputValue::Variable("title".to_string())),
        )]),
    });
    let mut variables = serde_json::Map::new();
    variables.insert("title".to_string(), json!(format!("todo {}", id)));
    OperationRequest::new(id, document).with_variables(variables)
}

pub fn query(id: &str) -> OperationRequest {
    OperationRequest::new(
        id,
        Document::new(OperationDefinition {
            kind: OperationKind::Query,
            name: Some("Todos".to_string()),
            selection_set: SelectionSet::new(vec![Selection::Field(Field::object(
                "todos",
                todo_selection(),
            ))]),
        }),
    )
}

pub fn network_ok(request: &OperationRequest) -> OperationResponse {
    let data: Value = json!({
        "addTodo": { "id": request.request_id.as_str(), "title": "saved" }
    });
    OperationResponse::new(request.clone(), DataSource::Network, Some(data))
}

pub fn network_error(request: &OperationRequest, message: &str) -> OperationResponse {
    OperationResponse::new(request.clone(), DataSource::Network, None)
        .with_errors(vec![GraphqlError::new(message)])
}

/// Global mutex to serialize XDG environment variable access across all tests
static XDG_ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: [&str; 3] = ["HOME", "XDG_CONFIG_HOME", "GRAPHCACHE__QUEUE__DEQUEUE_ON_ERROR"];

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`.
///
/// Returns the config home so callers can place a global config file.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    let config_home = test_dir.path().join("config");
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&config_home).unwrap();
    std::fs::create_dir_all(&home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    std::env::remove_var("GRAPHCACHE__QUEUE__DEQUEUE_ON_ERROR");

    let result = f(&config_home);

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }
    result
}
