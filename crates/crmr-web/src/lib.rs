//! Axum JSON API over the CRMR report engine.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use crmr_core::{
    schema_for, ColumnDef, ConfigValidationError, DataSource, ReportConfig, ReportConfigRequest,
};
use crmr_engine::{EngineConfig, ReportEngine, ReportError, ReportTemplate, TemplateError};
use crmr_storage::QueryError;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "crmr-web";

#[derive(Clone)]
pub struct AppState {
    pub engine: ReportEngine,
}

impl AppState {
    pub fn new(engine: ReportEngine) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Deserialize)]
struct RunReportBody {
    config: ReportConfigRequest,
    #[serde(default)]
    tenant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateBody {
    config: ReportConfigRequest,
}

#[derive(Debug, Deserialize)]
struct TenantQuery {
    tenant: Option<String>,
}

#[derive(Debug, Serialize)]
struct DataSourceRow {
    data_source: DataSource,
    table: &'static str,
    tenant_column: &'static str,
    columns: &'static [ColumnDef],
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// [`ReportError`] rendered as a JSON error response.
struct ApiError(ReportError);

impl<E: Into<ReportError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            ReportError::Config(_) => (StatusCode::BAD_REQUEST, "config_validation"),
            ReportError::Query(QueryError::UnknownField { .. }) => {
                (StatusCode::BAD_REQUEST, "unknown_field")
            }
            ReportError::Query(_) => (StatusCode::BAD_GATEWAY, "query_failed"),
            ReportError::Template(TemplateError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "template_not_found")
            }
            ReportError::Template(TemplateError::Invalid { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "template_invalid")
            }
        };
        if status.is_server_error() {
            error!(error = %self.0, "report request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: kind,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/data-sources", get(data_sources_handler))
        .route("/templates", get(templates_handler))
        .route("/templates/{id}", get(template_handler))
        .route("/templates/{id}/run", post(run_template_handler))
        .route("/reports/run", post(run_report_handler))
        .route("/reports/validate", post(validate_report_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: &EngineConfig) -> anyhow::Result<()> {
    let engine = crmr_engine::engine_from_config(config).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
    info!(port = config.web_port, store = engine.store_name(), "serving report API");
    axum::serve(listener, app(AppState::new(engine))).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(&EngineConfig::from_env()).await
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.engine.store_name(),
    }))
}

async fn data_sources_handler() -> Json<Vec<DataSourceRow>> {
    Json(
        DataSource::ALL
            .into_iter()
            .map(|ds| {
                let schema = schema_for(ds);
                DataSourceRow {
                    data_source: ds,
                    table: schema.table,
                    tenant_column: schema.tenant_column,
                    columns: schema.columns,
                }
            })
            .collect(),
    )
}

async fn templates_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ReportTemplate>> {
    Json(state.engine.templates().list().to_vec())
}

async fn template_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ReportTemplate>, ApiError> {
    state
        .engine
        .templates()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| TemplateError::NotFound(id).into())
}

async fn run_template_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Response, ApiError> {
    let run = state.engine.run_template(&id, query.tenant.as_deref()).await?;
    Ok(Json(run).into_response())
}

/// Decode a JSON body, reporting rejections as malformed configs.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => Err(ConfigValidationError::Malformed(rejection.body_text()).into()),
    }
}

async fn run_report_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunReportBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(payload)?;
    let run = state
        .engine
        .execute_report(&body.config, body.tenant.as_deref())
        .await?;
    Ok(Json(run).into_response())
}

async fn validate_report_handler(
    payload: Result<Json<ValidateBody>, JsonRejection>,
) -> Result<Json<ReportConfig>, ApiError> {
    let body = json_body(payload)?;
    Ok(Json(body.config.validate()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use crmr_storage::MemoryStore;
    use http_body_util::BodyExt;
    use serde_json::{json, Value as JsonValue};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let rows = json!([
            {"company_id": "acme", "invoice_number": "INV-1", "status": "paid", "total_amount": "100"},
            {"company_id": "acme", "invoice_number": "INV-2", "status": "paid", "total_amount": "50"},
            {"company_id": "acme", "invoice_number": "INV-3", "status": "sent", "total_amount": 75},
            {"company_id": "other", "invoice_number": "INV-9", "status": "paid", "total_amount": 1000}
        ]);
        let rows = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        let store = MemoryStore::new().with_rows(DataSource::Invoices, rows);
        app(AppState::new(ReportEngine::new(Arc::new(store))))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_and_catalog_endpoints() {
        let app = test_app();
        let (status, body) = send(app.clone(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "memory");

        let (status, body) = send(app.clone(), "GET", "/data-sources", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), DataSource::ALL.len());
        assert_eq!(body[6]["data_source"], "invoices");

        let (status, body) = send(app.clone(), "GET", "/templates/paid-invoices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["data_source"], "invoices");

        let (status, body) = send(app, "GET", "/templates/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "template_not_found");
    }

    #[tokio::test]
    async fn run_report_returns_grouped_values() {
        let (status, body) = send(
            test_app(),
            "POST",
            "/reports/run",
            Some(json!({
                "tenant": "acme",
                "config": {
                    "data_source": "invoices",
                    "selected_fields": ["status", "total_amount"],
                    "grouping": {"field": "status", "aggregation_type": "sum"}
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["row_count"], 3);
        assert_eq!(body["output"]["kind"], "grouped");
        assert_eq!(
            body["output"]["groups"],
            json!([
                {"group_key": "paid", "value": 150.0},
                {"group_key": "sent", "value": 75.0}
            ])
        );
    }

    #[tokio::test]
    async fn invalid_configs_are_bad_requests() {
        let (status, body) = send(
            test_app(),
            "POST",
            "/reports/run",
            Some(json!({"config": {"data_source": "invoices", "selected_fields": []}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "config_validation");

        let (status, body) = send(
            test_app(),
            "POST",
            "/reports/run",
            Some(json!({
                "config": {
                    "data_source": "invoices",
                    "selected_fields": ["status"],
                    "filters": [{"field": "owner", "operator": "equals", "value": "x"}]
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown_field");
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_bad_requests() {
        for uri in ["/reports/run", "/reports/validate"] {
            let (status, body) = send(
                test_app(),
                "POST",
                uri,
                Some(json!({"config": {"selected_fields": ["id"]}})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "config_validation");
            assert!(body["message"].as_str().unwrap().starts_with("malformed report config"));
        }

        let (status, body) = send(
            test_app(),
            "POST",
            "/reports/run",
            Some(json!({
                "config": {
                    "data_source": "invoices",
                    "selected_fields": ["id"],
                    "filters": [{"field": "status", "operator": 5, "value": "x"}]
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "config_validation");

        let (status, body) = send(test_app(), "POST", "/reports/run", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "config_validation");
    }

    #[tokio::test]
    async fn validate_returns_normalized_config() {
        let (status, body) = send(
            test_app(),
            "POST",
            "/reports/validate",
            Some(json!({"config": {"data_source": "Invoices", "selected_fields": ["status", "status"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data_source"], "invoices");
        assert_eq!(body["selected_fields"], json!(["status"]));
    }

    #[tokio::test]
    async fn template_run_is_scoped_by_query_tenant() {
        let (status, body) = send(test_app(), "POST", "/templates/paid-invoices/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["row_count"], 3);

        let (status, body) =
            send(test_app(), "POST", "/templates/paid-invoices/run?tenant=acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["row_count"], 2);
        assert_eq!(body["output"]["kind"], "rows");
    }
}
