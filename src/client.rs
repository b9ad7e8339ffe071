//! Typed HTTP client for the challenge service.
//!
//! [`ApiClient::execute`] is the only path through which a [`ChallengeCommand`] reaches the
//! server. Its [`CommandOutcome`] is meant to be handed straight to
//! [`ChallengeCache::apply`](crate::cache::ChallengeCache::apply).

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use crate::acceptance::AcceptanceRequest;
use crate::challenge::{ChallengeView, NewChallenge};
use crate::command::{ChallengeCommand, CommandFailure, CommandOutcome, CommandResult, HttpMethod};
use crate::listing::{ChallengeQuery, Paginated};
use crate::matches::Match;
use crate::permissions::PermissionSet;
use crate::result::{ErrorKind, ErrorResponse};
use crate::session::Session;
use crate::teams::{Team, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Api(CommandFailure),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Http(_) => ErrorKind::Internal,
            ClientError::Api(failure) => failure.kind,
        }
    }

    fn into_failure(self) -> CommandFailure {
        match self {
            ClientError::Api(failure) => failure,
            ClientError::Http(e) => CommandFailure {
                kind: ErrorKind::Internal,
                message: format!("Error: Could not reach the server ({e})."),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        ApiClient {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn from_session(session: &Session) -> Self {
        let mut client = ApiClient::new(session.base_url.clone());
        client.token = session.token.clone();
        client
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let failure = match response.json::<ErrorResponse>().await {
            Ok(body) => CommandFailure { kind: body.kind, message: body.error },
            Err(_) => CommandFailure {
                kind: kind_for_status(status.as_u16()),
                message: format!("Error: Server responded with {status}."),
            },
        };
        tracing::debug!(%status, kind = ?failure.kind, "request rejected");
        Err(ClientError::Api(failure))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::parse(self.request(Method::GET, path).send().await?).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, ClientError> {
        Self::parse(self.request(Method::POST, path).json(body).send().await?).await
    }

    /// Register a user. The returned token is not stored; use [`with_token`](Self::with_token).
    pub async fn register_user(&self, name: &str) -> Result<UserRecord, ClientError> {
        self.post("/users", &serde_json::json!({ "name": name })).await
    }

    pub async fn create_team(&self, name: &str, sport: &str) -> Result<Team, ClientError> {
        self.post("/teams", &serde_json::json!({ "name": name, "sport": sport })).await
    }

    pub async fn get_team(&self, team_id: Uuid) -> Result<Team, ClientError> {
        self.get(&format!("/teams/{}", team_id)).await
    }

    pub async fn add_member(&self, team_id: Uuid, user_id: Uuid) -> Result<Team, ClientError> {
        self.post(&format!("/teams/{}/members", team_id), &serde_json::json!({ "user_id": user_id }))
            .await
    }

    pub async fn create_challenge(&self, draft: &NewChallenge) -> Result<ChallengeView, ClientError> {
        let body = serde_json::to_value(draft)
            .map_err(|e| ClientError::Api(CommandFailure { kind: ErrorKind::Validation, message: e.to_string() }))?;
        self.post("/challenges/team", &body).await
    }

    /// The `challenge` part of `GET /challenges/{id}`.
    pub async fn get_challenge(&self, challenge_id: Uuid) -> Result<ChallengeView, ClientError> {
        #[derive(serde::Deserialize)]
        struct Detail {
            challenge: ChallengeView,
        }
        let detail: Detail = self.get(&format!("/challenges/{}", challenge_id)).await?;
        Ok(detail.challenge)
    }

    pub async fn list_challenges(&self, query: &ChallengeQuery) -> Result<Paginated<ChallengeView>, ClientError> {
        let response = self.request(Method::GET, "/challenges").query(query).send().await?;
        Self::parse(response).await
    }

    pub async fn sent_challenges(&self, team_id: Uuid) -> Result<Vec<ChallengeView>, ClientError> {
        self.get(&format!("/teams/{}/challenges/sent", team_id)).await
    }

    pub async fn received_challenges(&self, team_id: Uuid) -> Result<Vec<ChallengeView>, ClientError> {
        self.get(&format!("/teams/{}/challenges/received", team_id)).await
    }

    /// `request_id` focuses one acceptance request, which is what `can_approve_request` is judged on.
    pub async fn permissions(&self, challenge_id: Uuid, request_id: Option<Uuid>) -> Result<PermissionSet, ClientError> {
        let mut builder = self.request(Method::GET, &format!("/challenges/{}/permissions", challenge_id));
        if let Some(request_id) = request_id {
            builder = builder.query(&[("request_id", request_id)]);
        }
        Self::parse(builder.send().await?).await
    }

    pub async fn list_requests(&self, challenge_id: Uuid) -> Result<Vec<AcceptanceRequest>, ClientError> {
        self.get(&format!("/challenges/{}/acceptance-requests", challenge_id)).await
    }

    pub async fn get_match(&self, match_id: Uuid) -> Result<Match, ClientError> {
        self.get(&format!("/matches/{}", match_id)).await
    }

    pub async fn record_result(&self, match_id: Uuid, home_score: u32, away_score: u32) -> Result<Match, ClientError> {
        self.post(
            &format!("/matches/{}/result", match_id),
            &serde_json::json!({ "home_score": home_score, "away_score": away_score }),
        )
        .await
    }

    /// Send a lifecycle command. Exactly one request is made; failures are returned, never retried.
    pub async fn execute(&self, command: &ChallengeCommand) -> CommandOutcome<CommandResult> {
        let endpoint = command.endpoint();
        let method = match endpoint.method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Delete => Method::DELETE,
        };
        let mut builder = self.request(method, &endpoint.path);
        if let Some(body) = &endpoint.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return CommandOutcome::Failure(ClientError::from(e).into_failure()),
        };

        let parsed = match command {
            ChallengeCommand::RequestAcceptance { .. } | ChallengeCommand::WithdrawRequest { .. } => {
                Self::parse::<AcceptanceRequest>(response).await.map(CommandResult::Request)
            }
            _ => Self::parse::<ChallengeView>(response).await.map(CommandResult::Challenge),
        };

        match parsed {
            Ok(result) => CommandOutcome::Success(result),
            Err(e) => CommandOutcome::Failure(e.into_failure()),
        }
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::Unauthenticated,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        400 | 422 => ErrorKind::Validation,
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::test_case;

    #[test_case(401, "unauthenticated")]
    #[test_case(403, "authorization")]
    #[test_case(404, "not_found")]
    #[test_case(409, "conflict")]
    #[test_case(422, "validation")]
    #[test_case(503, "internal")]
    fn status_maps_to_kind(status: u16, kind: &str) {
        let expected: ErrorKind = serde_json::from_value(serde_json::Value::String(kind.to_string())).unwrap();
        assert_eq!(kind_for_status(status), expected);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn from_session_copies_token() {
        let mut session = Session::new("http://localhost:3000");
        session.token = Some("abc".to_string());
        let client = ApiClient::from_session(&session);
        assert_eq!(client.token.as_deref(), Some("abc"));
    }
}
