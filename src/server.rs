use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::document_store::DocumentStore;
use crate::domain::Document;
use crate::error::EtlError;
use crate::query::{QueryError, QueryService};

pub fn router<D: DocumentStore + 'static>(service: Arc<QueryService<D>>) -> Router {
    Router::new()
        .route(
            "/gene_expression",
            get(gene_expression_handler::<D>).options(preflight_handler),
        )
        .layer(middleware::map_response(allow_any_origin))
        .with_state(service)
}

pub async fn serve<D: DocumentStore + 'static>(
    bind: SocketAddr,
    service: QueryService<D>,
) -> Result<(), EtlError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| EtlError::Server(format!("bind {bind}: {err}")))?;
    serve_on(listener, service).await
}

/// Serves lookups on an already bound listener until the process stops.
pub async fn serve_on<D: DocumentStore + 'static>(
    listener: TcpListener,
    service: QueryService<D>,
) -> Result<(), EtlError> {
    let addr = listener
        .local_addr()
        .map_err(|err| EtlError::Server(err.to_string()))?;
    info!("query server listening on {addr}");
    axum::serve(listener, router(Arc::new(service)))
        .await
        .map_err(|err| EtlError::Server(err.to_string()))
}

async fn gene_expression_handler<D: DocumentStore + 'static>(
    State(service): State<Arc<QueryService<D>>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    let Query(pairs) = match query {
        Ok(query) => query,
        Err(rejection) => {
            let body = json!({ "error": rejection.body_text() });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };
    let patient_id = first_param(pairs, "patient_id");
    let outcome = tokio::task::spawn_blocking(move || service.lookup(patient_id.as_deref())).await;
    let (status, body) = match outcome {
        Ok(outcome) => lookup_response(outcome),
        Err(err) => {
            error!(error = %err, "lookup task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "lookup failed" }),
            )
        }
    };
    (status, Json(body)).into_response()
}

/// Repeated parameters resolve to their first occurrence.
fn first_param(pairs: Vec<(String, String)>, name: &str) -> Option<String> {
    pairs
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn allow_any_origin(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

/// Status code and JSON body for a lookup outcome.
pub fn lookup_response(outcome: Result<Document, QueryError>) -> (StatusCode, Value) {
    match outcome {
        Ok(document) => (StatusCode::OK, Value::Object(document)),
        Err(err @ QueryError::MissingPatientId) => {
            (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
        }
        Err(err @ QueryError::NotFound) => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        Err(QueryError::Store(err)) => {
            error!(error = %err, "gene expression lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            )
        }
    }
}
