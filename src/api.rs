//! HTTP API Server
//!
//! Thin JSON transport over the catalog, engagement ledger, resource
//! service and recommendation engine. The authenticated viewer arrives in
//! headers set by the identity gateway.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::catalog::{Catalog, ListResourcesRequest, ResourcePage};
use crate::config::{ApiConfig, CatalogConfig, RecommendationConfig, StorageConfig};
use crate::engagement::EngagementLedger;
use crate::error::{Error, Result};
use crate::models::{
    Rating, RatingSummary, Resource, ResourceType, Role, SharingScope, Viewer, Vote, VoteOutcome,
    VoteTally, VoteTarget,
};
use crate::observability;
use crate::recommendation::{RecommendationEngine, ScoredResource};
use crate::resources::{DownloadLink, PayloadLocator, ResourceService, ResourceView};
use crate::store::{EngagementStore, ResourceStore};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const UNIVERSITY_ID_HEADER: &str = "x-university-id";
pub const DEPARTMENT_ID_HEADER: &str = "x-department-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub catalog: Catalog,
    pub ledger: EngagementLedger,
    pub resources: ResourceService,
    pub recommendations: RecommendationEngine,
}

impl AppState {
    pub fn new<S>(
        store: Arc<S>,
        locator: Arc<dyn PayloadLocator>,
        catalog: CatalogConfig,
        recommendation: RecommendationConfig,
        storage: StorageConfig,
    ) -> Self
    where
        S: ResourceStore + EngagementStore + 'static,
    {
        let resource_store: Arc<dyn ResourceStore> = store.clone();
        let engagement_store: Arc<dyn EngagementStore> = store;
        let ledger = EngagementLedger::new(resource_store.clone(), engagement_store);

        Self {
            catalog: Catalog::new(resource_store.clone(), catalog),
            resources: ResourceService::new(
                resource_store.clone(),
                ledger.clone(),
                locator,
                storage,
            ),
            recommendations: RecommendationEngine::new(resource_store.clone(), recommendation),
            ledger,
            store: resource_store,
        }
    }
}

// ============================================================================
// Viewer extraction
// ============================================================================

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn header_uuid(headers: &HeaderMap, name: &'static str) -> Result<Option<Uuid>> {
    header_str(headers, name)
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| Error::unauthorized(format!("malformed {} header", name)))
        })
        .transpose()
}

/// `None` when no user id is present; malformed identity headers are
/// rejected rather than downgraded to anonymous
pub fn viewer_from_headers(headers: &HeaderMap) -> Result<Option<Viewer>> {
    let Some(id) = header_uuid(headers, USER_ID_HEADER)? else {
        return Ok(None);
    };
    let role = match header_str(headers, USER_ROLE_HEADER) {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|_| Error::unauthorized("malformed x-user-role header"))?,
        None => Role::Student,
    };
    Ok(Some(Viewer {
        id,
        university_id: header_uuid(headers, UNIVERSITY_ID_HEADER)?,
        department_id: header_uuid(headers, DEPARTMENT_ID_HEADER)?,
        role,
    }))
}

/// Viewer if authenticated, anonymous otherwise
pub struct MaybeViewer(pub Option<Viewer>);

/// Authenticated viewer; rejects anonymous requests with 401
pub struct RequireViewer(pub Viewer);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeViewer {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        viewer_from_headers(&parts.headers).map(MaybeViewer)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequireViewer {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        viewer_from_headers(&parts.headers)?
            .map(RequireViewer)
            .ok_or_else(|| Error::unauthorized("authentication required"))
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

/// `?limit=`; an unparseable value counts as absent
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    fn parsed(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub value: i32,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub is_upvote: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
}

/// Body for creating or updating a resource. Counters and approval are
/// not accepted from clients.
#[derive(Debug, Deserialize)]
pub struct SaveResourceRequest {
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub storage_key: String,
    pub university_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    #[serde(default)]
    pub sharing_scope: SharingScope,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SaveResourceRequest {
    fn into_resource(self, owner_id: Uuid) -> Resource {
        let mut resource = Resource::new(owner_id, self.title, self.resource_type);
        if let Some(id) = self.id {
            resource.id = id;
        }
        resource.description = self.description;
        resource.file_name = self.file_name;
        resource.file_size = self.file_size;
        resource.file_type = self.file_type;
        resource.storage_key = self.storage_key;
        resource.university_id = self.university_id;
        resource.department_id = self.department_id;
        resource.course_id = self.course_id;
        resource.sharing_scope = self.sharing_scope;
        resource.tags = self.tags;
        resource
    }
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub summary: RatingSummary,
    pub user_rating: Option<Rating>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub outcome: VoteOutcome,
    pub tally: VoteTally,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct VoteStatusResponse {
    pub user_vote: Option<Vote>,
    pub tally: VoteTally,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub items: Vec<ScoredResource>,
    pub total: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Build the application router with its middleware stack
pub fn build_router(state: Arc<AppState>, api: &ApiConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(api.request_timeout))
        .layer(ConcurrencyLimitLayer::new(api.concurrency_limit));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        // Catalog and resources
        .route("/api/v1/resources", get(list_resources).post(save_resource))
        .route(
            "/api/v1/resources/:id",
            get(get_resource).delete(delete_resource),
        )
        .route("/api/v1/resources/:id/download", get(download_resource))
        .route("/api/v1/resources/:id/approval", put(set_approval))
        .route(
            "/api/v1/resources/:id/rating",
            get(get_rating).post(rate_resource),
        )
        .route("/api/v1/resources/:id/similar", get(similar_resources))
        // Recommendations
        .route("/api/v1/recommendations", get(recommended_for_viewer))
        // Forum engagement
        .route(
            "/api/v1/forum/topics/:id/vote",
            get(topic_vote_status).post(vote_topic),
        )
        .route(
            "/api/v1/forum/replies/:id/vote",
            get(reply_vote_status).post(vote_reply),
        )
        .route("/api/v1/forum/topics/:id/view", post(view_topic))
        .layer(middleware)
        .layer(cors_layer(&api.cors_origins))
        .with_state(state)
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_server<F>(state: Arc<AppState>, api: &ApiConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, api);

    let addr = format!("{}:{}", api.host, api.port);
    info!("🚀 Starting Campus Share API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let (status_code, status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };
    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
        .into_response()
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_resources(
    State(state): State<Arc<AppState>>,
    MaybeViewer(viewer): MaybeViewer,
    Query(request): Query<ListResourcesRequest>,
) -> Result<Json<ResourcePage>> {
    let filter = request.into_filter();
    let page = state
        .catalog
        .list_resources(&filter, viewer.as_ref())
        .await?;
    Ok(Json(page))
}

async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResourceView>> {
    Ok(Json(state.resources.get_resource(id).await?))
}

async fn download_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadLink>> {
    Ok(Json(state.resources.download_resource(id).await?))
}

async fn save_resource(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Json(body): Json<SaveResourceRequest>,
) -> Result<Json<Resource>> {
    let resource = body.into_resource(viewer.id);
    Ok(Json(state.resources.save_resource(&viewer, resource).await?))
}

async fn delete_resource(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.resources.delete_resource(&viewer, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_approval(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Path(id): Path<Uuid>,
    Json(body): Json<ApprovalRequest>,
) -> Result<StatusCode> {
    state
        .resources
        .set_approval(&viewer, id, body.approved)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_rating(
    State(state): State<Arc<AppState>>,
    MaybeViewer(viewer): MaybeViewer,
    Path(id): Path<Uuid>,
) -> Result<Json<RatingResponse>> {
    let summary = state.ledger.rating_summary(id).await?;
    let user_rating = match viewer {
        Some(viewer) => state.ledger.user_rating(id, viewer.id).await?,
        None => None,
    };
    Ok(Json(RatingResponse {
        summary,
        user_rating,
    }))
}

async fn rate_resource(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Path(id): Path<Uuid>,
    Json(body): Json<RateRequest>,
) -> Result<Json<Rating>> {
    Ok(Json(state.ledger.rate(id, viewer.id, body.value).await?))
}

async fn similar_resources(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecommendationsResponse>> {
    let items = state.recommendations.similar_to(id, query.parsed()).await?;
    Ok(Json(RecommendationsResponse {
        total: items.len(),
        items,
    }))
}

async fn recommended_for_viewer(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecommendationsResponse>> {
    let items = state
        .recommendations
        .recommended_for(viewer.id, query.parsed())
        .await?;
    Ok(Json(RecommendationsResponse {
        total: items.len(),
        items,
    }))
}

async fn cast_vote(
    state: &AppState,
    target: VoteTarget,
    voter: &Viewer,
    is_upvote: bool,
) -> Result<Json<VoteResponse>> {
    let outcome = state.ledger.vote(target, voter.id, is_upvote).await?;
    let tally = state.ledger.tally(target).await?;
    Ok(Json(VoteResponse {
        outcome,
        score: tally.score(),
        tally,
    }))
}

async fn vote_status(
    state: &AppState,
    target: VoteTarget,
    viewer: Option<Viewer>,
) -> Result<Json<VoteStatusResponse>> {
    let tally = state.ledger.tally(target).await?;
    let user_vote = match viewer {
        Some(viewer) => state.ledger.user_vote(target, viewer.id).await?,
        None => None,
    };
    Ok(Json(VoteStatusResponse {
        user_vote,
        score: tally.score(),
        tally,
    }))
}

async fn vote_topic(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Path(id): Path<Uuid>,
    Json(body): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    cast_vote(&state, VoteTarget::Topic(id), &viewer, body.is_upvote).await
}

async fn vote_reply(
    State(state): State<Arc<AppState>>,
    RequireViewer(viewer): RequireViewer,
    Path(id): Path<Uuid>,
    Json(body): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    cast_vote(&state, VoteTarget::Reply(id), &viewer, body.is_upvote).await
}

async fn topic_vote_status(
    State(state): State<Arc<AppState>>,
    MaybeViewer(viewer): MaybeViewer,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteStatusResponse>> {
    vote_status(&state, VoteTarget::Topic(id), viewer).await
}

async fn reply_vote_status(
    State(state): State<Arc<AppState>>,
    MaybeViewer(viewer): MaybeViewer,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteStatusResponse>> {
    vote_status(&state, VoteTarget::Reply(id), viewer).await
}

async fn view_topic(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.ledger.increment_topic_view(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::BaseUrlLocator;
    use crate::store::InMemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app(store: &InMemoryStore) -> Router {
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(BaseUrlLocator::new("https://files.example.edu")),
            CatalogConfig::default(),
            RecommendationConfig::default(),
            StorageConfig::default(),
        );
        build_router(Arc::new(state), &ApiConfig::default())
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&body).expect("json")
    }

    fn post_json(uri: &str, user: Option<Uuid>, payload: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        builder
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let app = test_app(&InMemoryStore::new());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = body_json(response).await;
        assert_eq!(body["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn test_list_ignores_bad_params_and_hides_university_scope() {
        let store = InMemoryStore::new();
        let university = Uuid::new_v4();
        store
            .insert_resource(Resource::new(Uuid::new_v4(), "Open notes", ResourceType::Notes))
            .await;
        let mut campus = Resource::new(Uuid::new_v4(), "Campus notes", ResourceType::Notes);
        campus.sharing_scope = SharingScope::University;
        campus.university_id = Some(university);
        store.insert_resource(campus).await;
        let app = test_app(&store);

        let request = Request::builder()
            .uri("/api/v1/resources?page=abc&page_size=zz&university_id=nope&type=poster")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["page"], json!(1));
        assert_eq!(body["page_size"], json!(20));

        let request = Request::builder()
            .uri("/api/v1/resources")
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(UNIVERSITY_ID_HEADER, university.to_string())
            .body(Body::empty())
            .expect("request");
        let body = body_json(app.oneshot(request).await.expect("response")).await;
        assert_eq!(body["total"], json!(2));
        // Storage keys never leave the service
        assert!(body["items"][0].get("storage_key").is_none());
    }

    #[tokio::test]
    async fn test_huge_page_number_is_an_empty_page() {
        let store = InMemoryStore::new();
        store
            .insert_resource(Resource::new(Uuid::new_v4(), "Open notes", ResourceType::Notes))
            .await;
        let request = Request::builder()
            .uri("/api/v1/resources?page=9223372036854775807&page_size=0")
            .body(Body::empty())
            .expect("request");
        let response = test_app(&store).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["page_size"], json!(20));
    }

    #[tokio::test]
    async fn test_vote_requires_viewer() {
        let store = InMemoryStore::new();
        let topic = store.insert_topic().await;
        let response = test_app(&store)
            .oneshot(post_json(
                &format!("/api/v1/forum/topics/{topic}/vote"),
                None,
                json!({ "is_upvote": true }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn test_vote_flip_over_http() {
        let store = InMemoryStore::new();
        let reply = store.insert_reply().await;
        let app = test_app(&store);
        let voter = Uuid::new_v4();
        let uri = format!("/api/v1/forum/replies/{reply}/vote");

        let response = app
            .clone()
            .oneshot(post_json(&uri, Some(voter), json!({ "is_upvote": true })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"]["outcome"], json!("recorded"));

        let response = app
            .clone()
            .oneshot(post_json(&uri, Some(voter), json!({ "is_upvote": false })))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["outcome"]["outcome"], json!("flipped"));
        assert_eq!(body["tally"]["upvote_count"], json!(0));
        assert_eq!(body["tally"]["downvote_count"], json!(1));
        assert_eq!(body["score"], json!(-1));

        let request = Request::builder()
            .uri(&uri)
            .header(USER_ID_HEADER, voter.to_string())
            .body(Body::empty())
            .expect("request");
        let body = body_json(app.oneshot(request).await.expect("response")).await;
        assert_eq!(body["user_vote"]["is_upvote"], json!(false));
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_bad_request() {
        let store = InMemoryStore::new();
        let resource = Resource::new(Uuid::new_v4(), "Statistics notes", ResourceType::Notes);
        let id = resource.id;
        store.insert_resource(resource).await;

        let response = test_app(&store)
            .oneshot(post_json(
                &format!("/api/v1/resources/{id}/rating"),
                Some(Uuid::new_v4()),
                json!({ "value": 9 }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let request = Request::builder()
            .uri(format!("/api/v1/resources/{}", Uuid::new_v4()))
            .body(Body::empty())
            .expect("request");
        let response = test_app(&InMemoryStore::new())
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recommendations_require_viewer() {
        let request = Request::builder()
            .uri("/api/v1/recommendations")
            .body(Body::empty())
            .expect("request");
        let response = test_app(&InMemoryStore::new())
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_malformed_role_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, Uuid::new_v4().to_string().parse().unwrap());
        headers.insert(USER_ROLE_HEADER, "superuser".parse().unwrap());
        assert!(matches!(
            viewer_from_headers(&headers),
            Err(Error::Unauthorized { .. })
        ));

        headers.insert(USER_ROLE_HEADER, "moderator".parse().unwrap());
        let viewer = viewer_from_headers(&headers).unwrap().unwrap();
        assert!(viewer.can_moderate());
        assert!(viewer_from_headers(&HeaderMap::new()).unwrap().is_none());
    }
}
