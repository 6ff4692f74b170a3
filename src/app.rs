//! Application assembly and HTTP server startup.
//!
//! # Examples
//!
//! Info API.
//!
//! ```rust
//! # tokio_test::block_on(async {
//! # let url = lager_demo::app::spawn_app().await;
//! let response = reqwest::get(format!("{}/info", url)).await.unwrap();
//! assert_eq!(200, response.status());
//! # });
//! ```

use std::iter;
use std::time::Duration;

use crate::infra::config::Config;
use crate::infra::database::DbPool;
use crate::infra::error::{InternalError, PanicHandler};
use crate::infra::middleware::MakeRequestIdSpan;
use crate::infra::openapi::ApiDoc;
use crate::infra::state::AppState;
use axum::error_handling::HandleErrorLayer;
use axum::response::IntoResponse;
use axum::Router;
use http::header::AUTHORIZATION;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

/// Constructs the full axum application.
pub fn app(state: AppState) -> Router {
    // Fallible middleware from tower, mapped to infallible response with [`HandleErrorLayer`].
    let tower_middleware = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|e| async move {
            InternalError::Other(format!("Tower middleware failed: {e}")).into_response()
        }))
        .concurrency_limit(100);

    // The full application: API documentation and the REST API.
    Router::new()
        .merge(SwaggerUi::new("/api/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .merge(Redoc::with_url("/api/redoc", ApiDoc::openapi()))
        .merge(RapiDoc::new("/api/openapi.json").path("/api/rapidoc"))
        .nest("/api", crate::api::api(state))
        // Layers
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(MakeRequestIdSpan)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(()),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(SetSensitiveRequestHeadersLayer::new(iter::once(
            AUTHORIZATION,
        )))
        .layer(tower_middleware)
        .layer(CatchPanicLayer::custom(PanicHandler))
}

/// Starts the axum server.
pub async fn run_app(addr: TcpListener, db: DbPool, config: Config) -> Result<(), std::io::Error> {
    let state = AppState::new(db, config);
    let app = app(state).into_make_service();

    tracing::info!("Starting axum on {}", addr.local_addr()?);
    let exit_result = axum::serve(addr, app)
        .with_graceful_shutdown(crate::infra::shutdown::shutdown_signal())
        .await;

    match &exit_result {
        Ok(_) => tracing::info!("Successfully shut down"),
        Err(e) => tracing::error!("Shutdown failed: {}", e),
    }

    exit_result
}

/// Spawn a server on a random port.
pub async fn spawn_app() -> String {
    let config = crate::infra::config::load_config().unwrap();
    let db = crate::infra::database::init_db(&config.database);
    spawn_app_with_db(db).await
}

/// Spawn a server on a random port with a custom database.
pub async fn spawn_app_with_db(db: DbPool) -> String {
    let address = "127.0.0.1";
    let listener = TcpListener::bind(format!("{address}:0")).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = crate::infra::config::load_config().unwrap();
    tokio::spawn(run_app(listener, db, config));
    format!("http://{address}:{port}/api")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::item::item_repository::Item,
        infra::error::{ErrorBody, StatusBody},
    };
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app(db: DbPool) -> Router {
        let config = crate::infra::config::load_config().unwrap();
        let state = AppState::new(db, config);
        app(state)
    }

    async fn create(url: &str, name: &str, amount: i32, unit: &str) -> reqwest::Response {
        let client = reqwest::ClientBuilder::default().build().unwrap();
        client
            .post(format!("{url}/items"))
            .json(&json!({ "name": name, "amount": amount, "unit": unit }))
            .send()
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn info_oneshot(db: DbPool) {
        let app = test_app(db);
        let req = Request::get("/api/info").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::OK, res.status());
    }

    #[sqlx::test]
    async fn swagger_ui_oneshot(db: DbPool) {
        let app = test_app(db);
        let req = Request::get("/api/swagger-ui/index.html")
            .body(Body::empty())
            .unwrap();
        let result = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::OK, result.status())
    }

    #[sqlx::test]
    async fn redoc_oneshot(db: DbPool) {
        let app = test_app(db);
        let req = Request::get("/api/redoc").body(Body::empty()).unwrap();
        let result = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::OK, result.status())
    }

    #[sqlx::test]
    async fn create_item_returns_created_item(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let res = create(&url, "Bolt M6", 100, "st").await;

        assert_eq!(201, res.status());
        let location = res.headers()["location"].to_str().unwrap().to_string();
        let item: Item = res.json().await.unwrap();
        assert_eq!(format!("/api/items/{}", item.id), location);
        assert_eq!("Bolt M6", item.name);
        assert_eq!(100, item.amount);
        assert_eq!("st", item.unit);
    }

    #[sqlx::test]
    async fn duplicate_name_gives_409(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        assert_eq!(201, create(&url, "Bolt M6", 100, "st").await.status());

        let res = create(&url, "Bolt M6", 1, "fp").await;
        assert_eq!(409, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert_eq!("Item with the specified name already exists", body.message());
    }

    #[sqlx::test]
    async fn unknown_unit_on_create_gives_409(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let res = create(&url, "Bolt M6", 100, "stk").await;
        assert_eq!(409, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert_eq!("Unknown unit supplied", body.message());
    }

    #[sqlx::test]
    async fn blank_name_gives_400(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let res = create(&url, "   ", 100, "st").await;
        assert_eq!(400, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.message().contains("name"));
    }

    #[sqlx::test]
    async fn negative_amount_gives_400(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let res = create(&url, "Bolt M6", -1, "st").await;
        assert_eq!(400, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.message().contains("amount"));
    }

    #[sqlx::test]
    async fn blank_unit_gives_400(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let res = create(&url, "Bolt M6", 100, "  ").await;
        assert_eq!(400, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.message().contains("unit"));
    }

    #[sqlx::test]
    async fn missing_amount_gives_400(db: DbPool) {
        let app = test_app(db);
        let req = Request::post("/api/items")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"name": "Bolt M6", "unit": "st"}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, res.status());
    }

    #[sqlx::test]
    async fn get_missing_item_gives_empty_404(db: DbPool) {
        let app = test_app(db);
        let req = Request::get("/api/items/4242").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, res.status());
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[sqlx::test]
    async fn list_filters_by_case_insensitive_substring(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        create(&url, "Bolt M6", 100, "st").await;
        create(&url, "Nut M6", 50, "st").await;
        create(&url, "Tape", 3, "rullar").await;

        let items: Vec<Item> = reqwest::get(format!("{url}/items"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(3, items.len());

        let items: Vec<Item> = reqwest::get(format!("{url}/items?name=m6"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(2, items.len());

        // An empty search string matches every item.
        let items: Vec<Item> = reqwest::get(format!("{url}/items?name="))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(3, items.len());

        let items: Vec<Item> = reqwest::get(format!("{url}/items?name=screw"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[sqlx::test]
    async fn patch_updates_only_present_fields(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let created: Item = create(&url, "Bolt M6", 100, "st")
            .await
            .json()
            .await
            .unwrap();

        let client = reqwest::ClientBuilder::default().build().unwrap();
        let res = client
            .patch(format!("{url}/items/{}", created.id))
            .json(&json!({ "amount": 50 }))
            .send()
            .await
            .unwrap();

        // The published contract answers 201 with a location header here.
        assert_eq!(201, res.status());
        assert_eq!(
            format!("/api/items/{}", created.id),
            res.headers()["location"].to_str().unwrap()
        );
        let updated: Item = res.json().await.unwrap();
        assert_eq!(50, updated.amount);
        assert_eq!(created.name, updated.name);
        assert_eq!(created.unit, updated.unit);
        assert!(updated.last_updated >= created.last_updated);

        let fetched: Item = reqwest::get(format!("{url}/items/{}", created.id))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(50, fetched.amount);
    }

    #[sqlx::test]
    async fn patch_with_unknown_unit_persists_nothing(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let created: Item = create(&url, "Bolt M6", 100, "st")
            .await
            .json()
            .await
            .unwrap();

        let client = reqwest::ClientBuilder::default().build().unwrap();
        let res = client
            .patch(format!("{url}/items/{}", created.id))
            .json(&json!({ "amount": 1, "unit": "boxes" }))
            .send()
            .await
            .unwrap();
        assert_eq!(409, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert_eq!("Unknown unit supplied", body.message());

        let fetched: Item = reqwest::get(format!("{url}/items/{}", created.id))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(100, fetched.amount);
        assert_eq!("st", fetched.unit);
    }

    #[sqlx::test]
    async fn negative_amount_on_patch_gives_400_and_persists_nothing(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let created: Item = create(&url, "Bolt M6", 100, "st")
            .await
            .json()
            .await
            .unwrap();

        let client = reqwest::ClientBuilder::default().build().unwrap();
        let res = client
            .patch(format!("{url}/items/{}", created.id))
            .json(&json!({ "amount": -1, "name": "Nut M6" }))
            .send()
            .await
            .unwrap();
        assert_eq!(400, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.message().contains("amount"));

        // The rejection happened before any merge, so neither field stuck.
        let fetched: Item = reqwest::get(format!("{url}/items/{}", created.id))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(100, fetched.amount);
        assert_eq!("Bolt M6", fetched.name);
    }

    #[sqlx::test]
    async fn patch_of_missing_item_gives_409(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let client = reqwest::ClientBuilder::default().build().unwrap();
        let res = client
            .patch(format!("{url}/items/4242"))
            .json(&json!({ "amount": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(409, res.status());
        let body: ErrorBody = res.json().await.unwrap();
        assert_eq!("Item with specified id not found", body.message());
    }

    #[sqlx::test]
    async fn delete_reports_outcome_with_200(db: DbPool) {
        let url = spawn_app_with_db(db).await;
        let created: Item = create(&url, "Bolt M6", 100, "st")
            .await
            .json()
            .await
            .unwrap();

        let client = reqwest::ClientBuilder::default().build().unwrap();
        let res = client
            .delete(format!("{url}/items/{}", created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(200, res.status());
        let body: StatusBody = res.json().await.unwrap();
        assert!(body.success());

        // The item is gone.
        let res = reqwest::get(format!("{url}/items/{}", created.id))
            .await
            .unwrap();
        assert_eq!(404, res.status());

        // Deleting it again still answers 200, but reports failure.
        let res = client
            .delete(format!("{url}/items/{}", created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(200, res.status());
        let body: StatusBody = res.json().await.unwrap();
        assert!(!body.success());
        assert_eq!(Some("Item with specified id not found"), body.message());
    }
}
