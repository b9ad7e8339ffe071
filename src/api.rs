//! HTTP surface of the challenge service.
//!
//! Every route is a thin wrapper over [`ChallengeManager`]; the manager re-checks every guard,
//! so handlers only authenticate, parse and translate errors.

use std::convert::Infallible;
use std::time::Duration;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response, sse::{Event as SseEvent, KeepAlive, Sse}},
    routing::{delete, get, post},
};
use futures_util::stream::Stream;
use serde::{Serialize, Deserialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use crate::acceptance::AcceptanceRequest;
use crate::challenge::{ChallengeTransition, ChallengeView, NewChallenge};
use crate::challenge_manager::{ChallengeDetail, ChallengeManager, ManagerError};
use crate::listing::{ChallengeQuery, Paginated};
use crate::matches::Match;
use crate::permissions::PermissionSet;
use crate::result::{ErrorKind, ErrorResponse};
use crate::teams::{Team, User};

#[derive(Clone)]
pub struct AppState {
    pub manager: ChallengeManager,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let error = if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "internal server error");
            "Error: Internal server error.".to_string()
        } else {
            self.to_string()
        };
        (status_for(kind), Json(ErrorResponse { error, kind })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ManagerError>;

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ManagerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ManagerError::Unauthenticated)?;
        state.manager.authenticate(token).map(AuthUser)
    }
}

// ---- request bodies ----

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub sport: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub team_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestAcceptanceBody {
    pub accepting_team_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResultRequest {
    pub home_score: u32,
    pub away_score: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PermissionsQuery {
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

/// Build the service router.
pub fn router(manager: ChallengeManager) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/users", post(register_user))
        .route("/teams", post(create_team))
        .route("/teams/{id}", get(get_team))
        .route("/teams/{id}/members", post(add_member))
        .route("/teams/{id}/challenges/sent", get(sent_challenges))
        .route("/teams/{id}/challenges/received", get(received_challenges))
        .route("/challenges", get(list_challenges))
        .route("/challenges/team", post(create_challenge))
        .route("/challenges/{id}", get(get_challenge))
        .route("/challenges/{id}/permissions", get(get_permissions))
        .route("/challenges/{id}/accept", post(accept_challenge))
        .route("/challenges/{id}/decline", post(decline_challenge))
        .route("/challenges/{id}/withdraw", post(withdraw_challenge))
        .route("/challenges/{id}/expire", post(expire_challenge))
        .route(
            "/challenges/{id}/acceptance-requests",
            post(request_acceptance).get(list_requests),
        )
        .route(
            "/challenges/{id}/acceptance-requests/{req_id}/approve",
            post(approve_request),
        )
        .route("/acceptance-requests/{req_id}", delete(withdraw_request))
        .route("/challenges/{id}/events", get(challenge_events))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/result", post(record_result))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { manager })
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "matchday",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /users",
            "POST /teams",
            "GET /teams/{id}",
            "POST /teams/{id}/members",
            "GET /teams/{id}/challenges/sent",
            "GET /teams/{id}/challenges/received",
            "GET /challenges?sport&status&search&page&limit",
            "POST /challenges/team",
            "GET /challenges/{id}",
            "GET /challenges/{id}/permissions",
            "POST /challenges/{id}/accept",
            "POST /challenges/{id}/decline",
            "POST /challenges/{id}/withdraw",
            "POST /challenges/{id}/expire",
            "POST /challenges/{id}/acceptance-requests",
            "GET /challenges/{id}/acceptance-requests",
            "POST /challenges/{id}/acceptance-requests/{req_id}/approve",
            "DELETE /acceptance-requests/{req_id}",
            "GET /challenges/{id}/events",
            "GET /matches/{id}",
            "POST /matches/{id}/result",
        ],
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<RegisterUserResponse>), ManagerError> {
    let record = state.manager.register_user(&request.name)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterUserResponse { user: record.user, token: record.token }),
    ))
}

async fn create_team(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), ManagerError> {
    let team = state.manager.create_team(user_id, &request.name, &request.sport)?;
    Ok((StatusCode::CREATED, Json(team)))
}

async fn get_team(State(state): State<AppState>, Path(team_id): Path<Uuid>) -> ApiResult<Team> {
    state.manager.get_team(team_id).map(Json)
}

async fn add_member(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(team_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> ApiResult<Team> {
    state.manager.add_member(team_id, user_id, request.user_id).map(Json)
}

async fn sent_challenges(State(state): State<AppState>, Path(team_id): Path<Uuid>) -> ApiResult<Vec<ChallengeView>> {
    state.manager.sent_by(team_id).map(Json)
}

async fn received_challenges(State(state): State<AppState>, Path(team_id): Path<Uuid>) -> ApiResult<Vec<ChallengeView>> {
    state.manager.received_by(team_id).map(Json)
}

async fn list_challenges(
    State(state): State<AppState>,
    Query(query): Query<ChallengeQuery>,
) -> ApiResult<Paginated<ChallengeView>> {
    state.manager.list_challenges(&query).map(Json)
}

async fn create_challenge(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(draft): Json<NewChallenge>,
) -> Result<(StatusCode, Json<ChallengeView>), ManagerError> {
    let view = state.manager.create_challenge(user_id, draft)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_challenge(State(state): State<AppState>, Path(challenge_id): Path<Uuid>) -> ApiResult<ChallengeDetail> {
    state.manager.challenge_detail(challenge_id).map(Json)
}

async fn get_permissions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(challenge_id): Path<Uuid>,
    Query(query): Query<PermissionsQuery>,
) -> ApiResult<PermissionSet> {
    state.manager.permissions(challenge_id, user_id, query.request_id).map(Json)
}

fn apply(state: &AppState, challenge_id: Uuid, user_id: Uuid, transition: ChallengeTransition) -> ApiResult<ChallengeView> {
    state
        .manager
        .transition(challenge_id, user_id, transition)
        .map(|applied| Json(applied.challenge))
}

async fn accept_challenge(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(challenge_id): Path<Uuid>,
    Json(request): Json<AcceptRequest>,
) -> ApiResult<ChallengeView> {
    apply(&state, challenge_id, user_id, ChallengeTransition::Accept { team_id: request.team_id })
}

async fn decline_challenge(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(challenge_id): Path<Uuid>,
) -> ApiResult<ChallengeView> {
    apply(&state, challenge_id, user_id, ChallengeTransition::Decline)
}

async fn withdraw_challenge(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(challenge_id): Path<Uuid>,
) -> ApiResult<ChallengeView> {
    apply(&state, challenge_id, user_id, ChallengeTransition::Withdraw)
}

async fn expire_challenge(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(challenge_id): Path<Uuid>,
) -> ApiResult<ChallengeView> {
    apply(&state, challenge_id, user_id, ChallengeTransition::Expire)
}

async fn request_acceptance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(challenge_id): Path<Uuid>,
    Json(body): Json<RequestAcceptanceBody>,
) -> Result<(StatusCode, Json<AcceptanceRequest>), ManagerError> {
    let request = state.manager.request_acceptance(challenge_id, user_id, body.accepting_team_id)?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> ApiResult<Vec<AcceptanceRequest>> {
    state.manager.list_requests(challenge_id).map(Json)
}

async fn approve_request(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((challenge_id, request_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ChallengeView> {
    apply(&state, challenge_id, user_id, ChallengeTransition::ApproveRequest { request_id })
}

async fn withdraw_request(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<AcceptanceRequest> {
    state.manager.withdraw_request(request_id, user_id).map(Json)
}

async fn get_match(State(state): State<AppState>, Path(match_id): Path<Uuid>) -> ApiResult<Match> {
    state.manager.get_match(match_id).map(Json)
}

async fn record_result(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(match_id): Path<Uuid>,
    Json(request): Json<RecordResultRequest>,
) -> ApiResult<Match> {
    state
        .manager
        .record_result(match_id, user_id, request.home_score, request.away_score)
        .map(Json)
}

/// `GET /challenges/{id}/events`: SSE stream of changes to one challenge.
async fn challenge_events(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ManagerError> {
    let mut rx = state.manager.subscribe(challenge_id)?;
    tracing::debug!(challenge_id = %challenge_id, "event stream opened");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize challenge event");
                            continue;
                        }
                    };
                    yield Ok(SseEvent::default().event(event.name()).data(json));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(challenge_id = %challenge_id, skipped = n, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
