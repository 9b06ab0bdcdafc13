#![cfg(feature = "web")]
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tower_http::services::ServeDir;

use crate::classifier::Sentiment;
use crate::config::{AppConfig, ConfigError};
use crate::downloader::{self, DOWNLOAD_FILE_NAME, ExportError, XLSX_FILE_NAME};
use crate::graph::{self, ChartError, GraphOptions};
use crate::loader::{self, InputError};
use crate::login::{self, AuthGate, CredentialStore, CurrentSession, SessionRegistry};
use crate::pipeline::{
    BatchOutcome, BatchPipeline, DropCounters, FreeTextOutcome, LabeledRecord, detect_text_column,
    filter_by_sentiment,
};
use crate::report::{Insight, Report, aggregate};
use crate::topics::{
    DEFAULT_WORD_LIMIT, LdaTopicExtractor, TermFrequency, Topic, TopicExtractor, word_frequencies,
};

// How often expired sessions are swept from the registry
const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Shared server state
///
/// Credentials and collaborators are fixed at startup; only the session
/// registry changes while the server runs.
pub struct AppState {
    pub config: AppConfig,
    pub credentials: Arc<CredentialStore>,
    pub sessions: SessionRegistry,
    pub pipeline: Arc<BatchPipeline>,
    pub topics: Arc<dyn TopicExtractor>,
}

impl AppState {
    /// State with the built-in normalizer, classifier and topic extractor
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let pipeline = Arc::new(BatchPipeline::with_defaults(config.pipeline.clone()));
        let topics = Arc::new(LdaTopicExtractor::new(config.topics.clone()));
        Self::with_components(config, pipeline, topics)
    }

    pub fn with_components(
        config: AppConfig,
        pipeline: Arc<BatchPipeline>,
        topics: Arc<dyn TopicExtractor>,
    ) -> Result<Self, ConfigError> {
        let credentials = Arc::new(config.credential_store()?);
        Ok(Self {
            config,
            credentials,
            sessions: SessionRegistry::new(),
            pipeline,
            topics,
        })
    }

    /// A fresh, unauthenticated gate over the configured users
    pub fn new_gate(&self) -> AuthGate {
        AuthGate::new(self.credentials.clone()).with_session_ttl(self.config.session_ttl_secs)
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Errors returned by the JSON API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(e) => {
                log::error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        match e {
            InputError::Io { .. } => ApiError::Internal(e.to_string()),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<ChartError> for ApiError {
    fn from(e: ChartError) -> Self {
        match e {
            ChartError::NoData => ApiError::NotFound("No results to plot".to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid upload: {}", e))
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        ApiError::Internal(format!("Analysis task failed: {}", e))
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(serve_index))
        .route("/api/columns", post(list_columns))
        .route("/api/analyze/file", post(analyze_file))
        .route("/api/analyze/text", post(analyze_text))
        .route("/api/results", get(get_results))
        .route("/api/results.csv", get(download_csv))
        .route("/api/results.xlsx", get(download_xlsx))
        .route("/api/chart.png", get(get_chart))
        .route("/api/words.png", get(get_word_chart))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .route("/logout", post(login::handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}

/// Start the web server and block until it stops
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config)?);

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sweeper.sessions.purge_expired();
            if purged > 0 {
                log::info!("Purged {} expired sessions", purged);
            }
        }
    });

    let app = router(state);

    let listener = TcpListener::bind(&bind).await?;
    log::info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_index(Extension(session): Extension<CurrentSession>) -> Html<String> {
    Html(include_str!("./static/index.html").replace("{{username}}", &escape_html(&session.username)))
}

/// Fields of an analysis upload
#[derive(Debug, Default)]
struct Upload {
    file_name: String,
    bytes: Bytes,
    column: Option<String>,
    topics: Option<usize>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                upload.file_name = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await?;
            }
            "column" => {
                let column = field.text().await?;
                if !column.trim().is_empty() {
                    upload.column = Some(column.trim().to_string());
                }
            }
            "topics" => {
                let topics = field.text().await?;
                if !topics.trim().is_empty() {
                    let n = topics.trim().parse().map_err(|_| {
                        ApiError::BadRequest("Number of topics must be a whole number".to_string())
                    })?;
                    upload.topics = Some(n);
                }
            }
            other => log::debug!("Ignoring upload field '{}'", other),
        }
    }

    if upload.bytes.is_empty() {
        return Err(ApiError::BadRequest("No file uploaded".to_string()));
    }

    Ok(upload)
}

#[derive(Serialize)]
struct ColumnsResponse {
    status: &'static str,
    columns: Vec<String>,
    detected: Option<String>,
    rows: usize,
}

/// List the columns of an uploaded file and the one picked by default
async fn list_columns(multipart: Multipart) -> Result<Json<ColumnsResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let dataset = tokio::task::spawn_blocking(move || {
        loader::load_dataset(&upload.file_name, &upload.bytes)
    })
    .await??;

    let detected = detect_text_column(&dataset.headers).map(|i| dataset.headers[i].clone());
    Ok(Json(ColumnsResponse {
        status: "ok",
        rows: dataset.len(),
        detected,
        columns: dataset.headers,
    }))
}

/// One row of the results table
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    row: usize,
    text: &'a str,
    normalized_text: &'a str,
    sentiment: Sentiment,
}

impl<'a> From<&'a LabeledRecord> for ResultRow<'a> {
    fn from(record: &'a LabeledRecord) -> Self {
        Self {
            row: record.record.row,
            text: &record.record.raw_text,
            normalized_text: &record.normalized_text,
            sentiment: record.sentiment,
        }
    }
}

#[derive(Serialize)]
struct AnalysisResponse<'a> {
    status: &'static str,
    file_name: &'a str,
    text_column: &'a str,
    input_len: usize,
    analyzed: usize,
    counters: DropCounters,
    report: Report,
    insight: Insight,
    insight_message: &'static str,
    topics: Vec<Topic>,
    words: Vec<TermFrequency>,
    preview: Vec<ResultRow<'a>>,
}

/// Analysis of an upload, computed off the async runtime
struct Analysis {
    outcome: BatchOutcome,
    report: Report,
    topics: Vec<Topic>,
    words: Vec<TermFrequency>,
}

fn analyze_upload(state: &AppState, upload: &Upload) -> Result<Analysis, ApiError> {
    let dataset = loader::load_dataset(&upload.file_name, &upload.bytes)?;

    let column = match &upload.column {
        Some(column) => column.clone(),
        None => detect_text_column(&dataset.headers)
            .map(|i| dataset.headers[i].clone())
            .ok_or(InputError::Empty)?,
    };

    let outcome = state.pipeline.run_dataset(&dataset, &column)?;
    let report = aggregate(&outcome.records);

    let texts: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r.normalized_text.as_str())
        .collect();
    let n_topics = upload.topics.unwrap_or(state.config.topics.n_topics);
    let topics = state.topics.extract(&texts, n_topics);
    let words = word_frequencies(&texts, DEFAULT_WORD_LIMIT);

    Ok(Analysis {
        outcome,
        report,
        topics,
        words,
    })
}

/// Run the batch pipeline over an uploaded file
///
/// The outcome is kept in the session for the download and chart endpoints.
async fn analyze_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    log::info!(
        "User '{}' uploaded '{}' ({} bytes)",
        session.username,
        upload.file_name,
        upload.bytes.len()
    );

    let worker = state.clone();
    let (upload, analysis) = tokio::task::spawn_blocking(move || {
        let analysis = analyze_upload(&worker, &upload);
        (upload, analysis)
    })
    .await?;
    let Analysis {
        outcome,
        report,
        topics,
        words,
    } = analysis?;

    let outcome = Arc::new(outcome);
    state.sessions.store_outcome(&session.token, outcome.clone());

    let insight = report.insight();
    let response = AnalysisResponse {
        status: "ok",
        file_name: &upload.file_name,
        text_column: &outcome.text_column,
        input_len: outcome.input_len,
        analyzed: outcome.records.len(),
        counters: outcome.counters,
        report,
        insight,
        insight_message: insight.message(),
        topics,
        words,
        preview: outcome
            .records
            .iter()
            .take(state.config.preview_rows)
            .map(ResultRow::from)
            .collect(),
    };

    Ok(Json(response).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Serialize)]
struct TextResponse {
    status: &'static str,
    result: FreeTextOutcome,
    message: String,
}

fn describe(outcome: &FreeTextOutcome) -> String {
    match outcome {
        FreeTextOutcome::EmptyAfterNormalize => {
            "Nothing left to analyse after preprocessing".to_string()
        }
        FreeTextOutcome::Labeled {
            sentiment: Sentiment::Error,
            ..
        } => "Could not analyse the sentiment".to_string(),
        FreeTextOutcome::Labeled { sentiment, .. } => format!("Sentiment: {}", sentiment),
    }
}

/// Classify a single text typed by the user
async fn analyze_text(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextRequest>,
) -> Result<Json<TextResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Please type a text to analyse".to_string(),
        ));
    }

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.analyze_text(&request.text)).await?;

    Ok(Json(TextResponse {
        status: "ok",
        message: describe(&result),
        result,
    }))
}

fn last_outcome(state: &AppState, session: &CurrentSession) -> Result<Arc<BatchOutcome>, ApiError> {
    state
        .sessions
        .last_outcome(&session.token)
        .ok_or_else(|| ApiError::NotFound("No analysis results yet".to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    /// Comma separated labels to keep
    pub sentiment: Option<String>,
}

impl ResultsQuery {
    fn labels(&self) -> Result<Vec<Sentiment>, ApiError> {
        match self.sentiment.as_deref().map(str::trim) {
            None | Some("") => Ok(Sentiment::SCORED.to_vec()),
            Some(list) => list
                .split(',')
                .map(|label| {
                    label
                        .parse::<Sentiment>()
                        .map_err(|e| ApiError::BadRequest(e.to_string()))
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ResultsResponse<'a> {
    status: &'static str,
    total: usize,
    records: Vec<ResultRow<'a>>,
}

/// Latest results of the session, filtered by sentiment
async fn get_results(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Query(query): Query<ResultsQuery>,
) -> Result<Response, ApiError> {
    let outcome = last_outcome(&state, &session)?;
    let labels = query.labels()?;

    let filtered = filter_by_sentiment(&outcome.records, &labels);
    let response = ResultsResponse {
        status: "ok",
        total: filtered.len(),
        records: filtered.into_iter().map(ResultRow::from).collect(),
    };

    Ok(Json(response).into_response())
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

async fn download_csv(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let outcome = last_outcome(&state, &session)?;
    let csv = downloader::to_csv(&outcome)?;
    Ok(attachment("text/csv; charset=utf-8", DOWNLOAD_FILE_NAME, csv.into_bytes()))
}

async fn download_xlsx(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let outcome = last_outcome(&state, &session)?;
    let xlsx = tokio::task::spawn_blocking(move || downloader::to_xlsx(&outcome)).await??;
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        XLSX_FILE_NAME,
        xlsx,
    ))
}

async fn get_chart(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let outcome = last_outcome(&state, &session)?;
    let png = tokio::task::spawn_blocking(move || {
        let report = aggregate(&outcome.records);
        graph::sentiment_chart(&report, &GraphOptions::default())
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn get_word_chart(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let outcome = last_outcome(&state, &session)?;
    let png = tokio::task::spawn_blocking(move || {
        let texts: Vec<&str> = outcome
            .records
            .iter()
            .map(|r| r.normalized_text.as_str())
            .collect();
        let words = word_frequencies(&texts, DEFAULT_WORD_LIMIT);
        graph::word_chart(&words, &GraphOptions::words())
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
