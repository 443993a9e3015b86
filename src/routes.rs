//! This module is about the REST surface of the proxy: mapping routes to query documents, and query results to JSON envelopes.

use crate::error::ApiError;
use crate::query::{self, DataType, QueryDocument, ReportRequest, ServerEntity};
use crate::timeline;
use crate::wcl::{QueryExecutor, QueryResult};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<QueryExecutor>,
    /// Whether failure envelopes include error internals.
    pub diagnostics: bool,
}

impl AppState {
    fn respond(&self, outcome: Result<Envelope, ApiError>) -> Response {
        match outcome {
            Ok(envelope) => Json(envelope).into_response(),
            Err(e) => e.into_response_with(self.diagnostics),
        }
    }

    async fn run(&self, document: &QueryDocument) -> Result<Envelope, ApiError> {
        let result = self.executor.execute(document).await?;
        Ok(Envelope::from(result))
    }
}

/// The body of every successful response.
#[derive(Debug, Serialize)]
pub struct Envelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<graphql_client::Error>>,
}

impl Envelope {
    fn data(data: Value) -> Self {
        Self { success: true, data: Some(data), errors: None }
    }
}

impl From<QueryResult> for Envelope {
    fn from(result: QueryResult) -> Self {
        Self { success: true, data: result.data, errors: result.errors }
    }
}

/// Create the router serving every endpoint of the proxy.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/token", delete(clear_token))
        .route("/custom", post(custom))
        .route("/report/{code}", get(report))
        .route("/report/{code}/fights/{fight_ids}", get(fight_details))
        .route("/report/{code}/table/{data_type}", get(table))
        .route("/report/{code}/events/damage/{fight_id}", get(damage_events))
        .route("/report/{code}/events/healing/{fight_id}", get(healing_events))
        .route("/report/{code}/deaths/{fight_id}", get(deaths))
        .route("/report/{code}/skills/{fight_id}", get(skills))
        .route("/character/{region}/{server}/{name}", get(character))
        .route("/guild/{region}/{server}/{name}", get(guild))
        .method_not_allowed_fallback(not_found);

    Router::new()
        .route("/", get(index))
        .method_not_allowed_fallback(not_found)
        .nest("/api", api)
        .fallback(not_found)
        .with_state(state)
}

fn parse_id(name: &str, value: &str) -> Result<i64, ApiError> {
    value.trim().parse().map_err(|_| ApiError::BadRequest(format!("{name} must be a number, got {value:?}")))
}

fn parse_id_list(name: &str, value: &str) -> Result<Vec<i64>, ApiError> {
    value.split(',').filter(|id| !id.trim().is_empty()).map(|id| parse_id(name, id)).collect()
}

fn parse_optional_id(name: &str, value: Option<&str>) -> Result<Option<i64>, ApiError> {
    value.map(|value| parse_id(name, value)).transpose()
}

fn path<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(value)| value).map_err(|e| ApiError::BadRequest(e.body_text()))
}

type Pairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Query string pairs in request order, so that repeated keys are kept.
struct Params(Vec<(String, String)>);

impl Params {
    fn extract(pairs: Pairs) -> Result<Self, ApiError> {
        let Query(pairs) = pairs.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(pairs))
    }

    /// The first value given for `name`.
    fn first(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Every id given for `name`, either as repeated keys or as comma separated lists, or [None] if the key is absent.
    fn id_list(&self, name: &str) -> Result<Option<Vec<i64>>, ApiError> {
        let mut ids: Option<Vec<i64>> = None;
        for (_, value) in self.0.iter().filter(|(key, _)| key == name) {
            ids.get_or_insert_with(Vec::new).extend(parse_id_list(name, value)?);
        }
        Ok(ids)
    }
}

async fn index() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "WCL Query Maker API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/health",
            "clearToken": "DELETE /api/token",
            "customQuery": "POST /api/custom",
            "report": "GET /api/report/:code",
            "fightDetails": "GET /api/report/:code/fights/:fightIDs",
            "tableData": "GET /api/report/:code/table/:dataType?fightIDs=1,2",
            "damageEvents": "GET /api/report/:code/events/damage/:fightID",
            "healingEvents": "GET /api/report/:code/events/healing/:fightID",
            "deaths": "GET /api/report/:code/deaths/:fightID",
            "skillTimeline": "GET /api/report/:code/skills/:fightID",
            "character": "GET /api/character/:region/:server/:name",
            "guild": "GET /api/guild/:region/:server/:name",
        },
    }))
}

async fn health(State(state): State<AppState>) -> Response {
    let status = match state.executor.test_connection().await {
        true => "connected",
        false => "disconnected",
    };
    let token = state.executor.tokens().current_token().await.map(|token| {
        json!({
            "tokenType": token.token_type,
            "expiresAt": token.expires_at.to_rfc3339(),
        })
    });
    state.respond(Ok(Envelope::data(json!({
        "status": status,
        "apiUrl": state.executor.api_url(),
        "token": token,
    }))))
}

async fn clear_token(State(state): State<AppState>) -> Response {
    state.executor.tokens().clear_token().await;
    state.respond(Ok(Envelope::data(json!({"cleared": true}))))
}

#[derive(Deserialize)]
struct CustomBody {
    query: Option<String>,
    variables: Option<Value>,
}

async fn custom(State(state): State<AppState>, body: Result<Json<CustomBody>, JsonRejection>) -> Response {
    let outcome = async {
        let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let document = query::custom(body.query.unwrap_or_default(), body.variables)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn report(State(state): State<AppState>, code: Result<Path<String>, PathRejection>, pairs: Pairs) -> Response {
    let outcome = async {
        let params = Params::extract(pairs)?;
        let mut request = ReportRequest::new(path(code)?);
        if let Some(fight_ids) = params.id_list("fightIDs")? {
            request = request.fights(fight_ids);
        }
        // A lone bound is ignored.
        if let (Some(start), Some(end)) = (params.first("startTime"), params.first("endTime")) {
            request = request.window(parse_id("startTime", start)?, parse_id("endTime", end)?);
        }
        let document = query::report(&request)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn fight_details(State(state): State<AppState>, segments: Result<Path<(String, String)>, PathRejection>) -> Response {
    let outcome = async {
        let (code, fight_ids) = path(segments)?;
        let fight_ids = parse_id_list("fightIDs", &fight_ids)?;
        let document = query::fight_details(&code, &fight_ids)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn table(State(state): State<AppState>, segments: Result<Path<(String, String)>, PathRejection>, pairs: Pairs) -> Response {
    let outcome = async {
        let (code, data_type) = path(segments)?;
        let fight_ids = Params::extract(pairs)?
            .id_list("fightIDs")?
            .ok_or_else(|| ApiError::BadRequest("fightIDs query parameter is required".to_string()))?;
        let data_type: DataType = data_type.parse()?;
        let document = query::table(&code, &fight_ids, data_type)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn damage_events(State(state): State<AppState>, segments: Result<Path<(String, String)>, PathRejection>, pairs: Pairs) -> Response {
    let outcome = async {
        let (code, fight_id) = path(segments)?;
        let params = Params::extract(pairs)?;
        let fight_id = parse_id("fightID", &fight_id)?;
        let source_id = parse_optional_id("sourceID", params.first("sourceID"))?;
        let document = query::damage_events(&code, fight_id, source_id)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn healing_events(State(state): State<AppState>, segments: Result<Path<(String, String)>, PathRejection>, pairs: Pairs) -> Response {
    let outcome = async {
        let (code, fight_id) = path(segments)?;
        let params = Params::extract(pairs)?;
        let fight_id = parse_id("fightID", &fight_id)?;
        let source_id = parse_optional_id("sourceID", params.first("sourceID"))?;
        let document = query::healing_events(&code, fight_id, source_id)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn deaths(State(state): State<AppState>, segments: Result<Path<(String, String)>, PathRejection>) -> Response {
    let outcome = async {
        let (code, fight_id) = path(segments)?;
        let fight_id = parse_id("fightID", &fight_id)?;
        let document = query::deaths(&code, fight_id)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

/// All casts of a fight are fetched, and the requested abilities are picked out here, so several abilities can be asked for at once.
async fn skills(State(state): State<AppState>, segments: Result<Path<(String, String)>, PathRejection>, pairs: Pairs) -> Response {
    let outcome = async {
        let (code, fight_id) = path(segments)?;
        let params = Params::extract(pairs)?;
        let fight_id = parse_id("fightID", &fight_id)?;
        let source_id = parse_optional_id("sourceID", params.first("sourceID"))?;
        let abilities = params
            .first("abilityID")
            .map(timeline::parse_ability_ids)
            .transpose()
            .map_err(|_| ApiError::BadRequest("abilityID must be a comma separated list of numbers".to_string()))?;

        let document = query::skill_timeline(&code, fight_id, None, source_id)?;
        let result = state.executor.execute(&document).await?;

        let events = result
            .data
            .as_ref()
            .and_then(|data| data.pointer("/reportData/report/events/data"))
            .and_then(Value::as_array);
        let events = match events {
            Some(events) => events,
            None => {
                debug!("No cast events in the response, passing it through");
                return Ok(Envelope::from(result))
            }
        };

        trace!("Deriving skill timeline from {} events...", events.len());
        let skill_timeline = timeline::skill_timeline(events, abilities.as_ref());
        let data = json!({
            "fightID": fight_id,
            "requestedAbilityIDs": abilities,
            "skillTimeline": skill_timeline,
            "rawEvents": events,
        });
        Ok(Envelope { success: true, data: Some(data), errors: result.errors.clone() })
    };
    state.respond(outcome.await)
}

async fn character(State(state): State<AppState>, segments: Result<Path<(String, String, String)>, PathRejection>) -> Response {
    let outcome = async {
        let (region, server, name) = path(segments)?;
        let entity = ServerEntity { name, server_slug: server, server_region: region };
        let document = query::character(&entity)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

async fn guild(State(state): State<AppState>, segments: Result<Path<(String, String, String)>, PathRejection>) -> Response {
    let outcome = async {
        let (region, server, name) = path(segments)?;
        let entity = ServerEntity { name, server_slug: server, server_region: region };
        let document = query::guild(&entity)?;
        state.run(&document).await
    };
    state.respond(outcome.await)
}

/// Unknown paths, and known paths asked with the wrong method.
async fn not_found(State(state): State<AppState>, method: Method, OriginalUri(uri): OriginalUri) -> Response {
    let error = ApiError::NotFound { method: method.to_string(), path: uri.path().to_string() };
    state.respond(Err(error))
}
