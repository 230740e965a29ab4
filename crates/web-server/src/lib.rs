use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use configuration::{BootstrapSettings, CorsMode, ServerSettings, Settings};
use database::{DbError, DbRepository, UserStore};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod models;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

/// Assembles the routes and middleware around the given state.
pub fn build_router(state: Arc<AppState>, settings: &ServerSettings) -> Router {
    let mut routes = Router::new().route("/register", post(handlers::register));
    if settings.expose_healthcheck {
        routes = routes.route("/api/healthcheck", get(handlers::healthcheck));
    }

    routes
        .with_state(state)
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes))
        // Last line of defence: a panicking handler still yields a JSON 500.
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer(settings.cors))
        // This middleware will automatically log information about every incoming request.
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(mode: CorsMode) -> CorsLayer {
    match mode {
        CorsMode::Explicit => CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(false),
        CorsMode::Permissive => CorsLayer::permissive(),
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(details = %details, "Unhandled failure while processing a request.");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error::FALLBACK_ERROR, "details": details })),
    )
        .into_response()
}

/// Creates the `users` table, honouring `schema_failure_fatal`.
///
/// Returns an error only when the failure is configured as fatal.
pub async fn bootstrap_schema(
    repo: &DbRepository,
    settings: &BootstrapSettings,
) -> Result<(), DbError> {
    match repo.ensure_schema().await {
        Ok(()) => {
            tracing::info!("Users table created or already exists.");
            Ok(())
        }
        Err(e) if settings.schema_failure_fatal => {
            tracing::error!(error = %e, "Error creating users table.");
            Err(e)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error creating users table. Continuing startup.");
            Ok(())
        }
    }
}

/// Probes the database, then creates the schema.
///
/// An unreachable database is reported but is not an error on its own.
async fn startup_checks(repo: &DbRepository, settings: &BootstrapSettings) -> Result<(), DbError> {
    if repo.probe().await.is_err() {
        tracing::warn!("Running without a verified database connection.");
    }
    bootstrap_schema(repo, settings).await
}

/// The main function to configure and run the web server.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let repo = database::connect(&settings.database)?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if settings.bootstrap.schema_failure_fatal {
        startup_checks(&repo, &settings.bootstrap).await?;
    } else {
        // Advisory checks may wait on an unreachable server; do not hold the listener back.
        let repo = repo.clone();
        let bootstrap = settings.bootstrap.clone();
        tokio::spawn(async move {
            let _ = startup_checks(&repo, &bootstrap).await;
        });
    }

    let app_state = Arc::new(AppState::new(Arc::new(repo.clone())));
    let app = build_router(app_state, &settings.server);

    tracing::info!("Web server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    repo.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for CTRL-C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received. Draining in-flight requests.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use database::NewUser;
    use rstest::rstest;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Behaviour {
        Working,
        Unreachable,
        Saturated,
        Panicking,
    }

    /// An in-memory stand-in for the MySQL repository.
    struct MemoryStore {
        rows: Mutex<Vec<(u64, NewUser)>>,
        behaviour: Behaviour,
        connections: Semaphore,
    }

    impl MemoryStore {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(Vec::new()),
                behaviour,
                connections: Semaphore::new(10),
            })
        }

        fn rows(&self) -> Vec<(u64, NewUser)> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn insert_user(&self, user: &NewUser) -> Result<u64, DbError> {
            match self.behaviour {
                Behaviour::Unreachable => return Err(DbError::Query(sqlx::Error::PoolTimedOut)),
                Behaviour::Saturated => return Err(DbError::Saturated { admitted: 10 }),
                Behaviour::Panicking => panic!("insert exploded"),
                Behaviour::Working => {}
            }

            // Mimic a ten-connection pool whose callers wait for a free slot.
            let _connection = self.connections.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;

            let mut rows = self.rows.lock().unwrap();
            let id = rows.len() as u64 + 1;
            rows.push((id, user.clone()));
            Ok(id)
        }

        async fn ping(&self) -> Result<(), DbError> {
            match self.behaviour {
                Behaviour::Unreachable => Err(DbError::Query(sqlx::Error::PoolTimedOut)),
                _ => Ok(()),
            }
        }
    }

    fn app(store: Arc<MemoryStore>) -> Router {
        build_router(Arc::new(AppState::new(store)), &ServerSettings::default())
    }

    fn register_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn registration_returns_created_with_the_assigned_id() {
        let store = MemoryStore::new(Behaviour::Working);

        let (status, body) = send(
            app(store.clone()),
            register_request(r#"{"fullName":"Jane Doe","mobileNumber":"5551234"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Registration successful");
        assert!(body["userId"].is_u64());

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.full_name, "Jane Doe");
        assert_eq!(rows[0].1.mobile_number, "5551234");
    }

    #[rstest]
    #[case::empty_object("{}")]
    #[case::name_only(r#"{"fullName":"Jane Doe"}"#)]
    #[case::mobile_only(r#"{"mobileNumber":"5551234"}"#)]
    #[case::empty_strings(r#"{"fullName":"","mobileNumber":""}"#)]
    #[case::null_name(r#"{"fullName":null,"mobileNumber":"5551234"}"#)]
    #[tokio::test]
    async fn incomplete_registrations_are_rejected_without_storage(#[case] body: &str) {
        let store = MemoryStore::new(Behaviour::Working);

        let (status, response) = send(app(store.clone()), register_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "Full name and mobile number are required");
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn body_without_json_content_type_counts_as_missing_fields() {
        let store = MemoryStore::new(Behaviour::Working);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/register")
            .body(Body::from("fullName=Jane"))
            .unwrap();

        let (status, response) = send(app(store.clone()), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "Full name and mobile number are required");
        assert!(store.rows().is_empty());
    }

    #[rstest]
    #[case::not_json("{not json")]
    #[case::empty_body("")]
    #[case::wrong_field_type(r#"{"fullName":42,"mobileNumber":"5551234"}"#)]
    #[tokio::test]
    async fn unreadable_json_goes_to_the_fallback_handler(#[case] body: &str) {
        let store = MemoryStore::new(Behaviour::Working);

        let (status, response) = send(app(store.clone()), register_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response["error"], "Something broke!");
        assert!(!response["details"].as_str().unwrap().is_empty());
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_as_too_large() {
        let store = MemoryStore::new(Behaviour::Working);
        let padding = "x".repeat(ServerSettings::default().body_limit_bytes + 1);
        let body = format!(r#"{{"fullName":"{padding}","mobileNumber":"5551234"}}"#);

        let (status, response) = send(app(store.clone()), register_request(&body)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response["error"], "Something broke!");
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn client_supplied_id_is_ignored() {
        let store = MemoryStore::new(Behaviour::Working);

        let (status, body) = send(
            app(store.clone()),
            register_request(r#"{"id":4242,"fullName":"Jane Doe","mobileNumber":"5551234"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["userId"], 1);
        assert_eq!(store.rows()[0].0, 1);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_with_details() {
        let store = MemoryStore::new(Behaviour::Unreachable);

        let (status, body) = send(
            app(store),
            register_request(r#"{"fullName":"Jane Doe","mobileNumber":"5551234"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Registration failed");
        assert!(!body["details"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn saturated_pool_is_reported_as_unavailable() {
        let store = MemoryStore::new(Behaviour::Saturated);

        let (status, body) = send(
            app(store),
            register_request(r#"{"fullName":"Jane Doe","mobileNumber":"5551234"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Registration failed");
    }

    #[tokio::test]
    async fn panicking_handler_is_turned_into_a_json_500() {
        let store = MemoryStore::new(Behaviour::Panicking);

        let (status, body) = send(
            app(store),
            register_request(r#"{"fullName":"Jane Doe","mobileNumber":"5551234"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Something broke!");
        assert_eq!(body["details"], "insert exploded");
    }

    // Handler-level only: the double's semaphore stands in for the pool. The real
    // ten-connection bound is exercised by the live
    // `more_requests_than_connections_all_complete` test in the database crate.
    #[tokio::test]
    async fn registrations_beyond_store_capacity_queue_and_complete() {
        let store = MemoryStore::new(Behaviour::Working);
        let router = app(store.clone());

        let handles: Vec<_> = (0..11)
            .map(|i| {
                let router = router.clone();
                tokio::spawn(async move {
                    let body = format!(r#"{{"fullName":"User {i}","mobileNumber":"555{i:04}"}}"#);
                    send(router, register_request(&body)).await.0
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::CREATED);
        }
        assert_eq!(store.rows().len(), 11);
    }

    #[rstest]
    #[case(Behaviour::Working, StatusCode::OK, "healthy")]
    #[case(Behaviour::Unreachable, StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")]
    #[tokio::test]
    async fn healthcheck_reflects_storage_state(
        #[case] behaviour: Behaviour,
        #[case] expected_status: StatusCode,
        #[case] expected: &str,
    ) {
        let request = Request::get("/api/healthcheck").body(Body::empty()).unwrap();

        let (status, body) = send(app(MemoryStore::new(behaviour)), request).await;

        assert_eq!(status, expected_status);
        assert_eq!(body["status"], expected);
        assert_eq!(body.get("error").is_some(), behaviour == Behaviour::Unreachable);
    }

    #[tokio::test]
    async fn healthcheck_can_be_left_unmounted() {
        let settings = ServerSettings {
            expose_healthcheck: false,
            ..ServerSettings::default()
        };
        let router = build_router(
            Arc::new(AppState::new(MemoryStore::new(Behaviour::Working))),
            &settings,
        );
        let request = Request::get("/api/healthcheck").body(Body::empty()).unwrap();

        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// A repository whose every checkout fails within a second.
    fn unreachable_repository() -> DbRepository {
        database::connect(&configuration::DatabaseSettings {
            host: "127.0.0.1".to_string(),
            user: "app".to_string(),
            password: "secret".to_string(),
            name: "signup".to_string(),
            credential_encoding: configuration::CredentialEncoding::Plain,
            port: 1,
            max_connections: 10,
            acquire_timeout_secs: Some(1),
            max_waiting: None,
            tls: configuration::TlsMode::Disabled,
        })
        .unwrap()
    }

    #[rstest]
    #[case::advisory(false, true)]
    #[case::fatal(true, false)]
    #[tokio::test]
    async fn schema_bootstrap_failure_honours_the_fatal_flag(
        #[case] schema_failure_fatal: bool,
        #[case] startup_continues: bool,
    ) {
        let repo = unreachable_repository();
        let settings = BootstrapSettings {
            schema_failure_fatal,
        };

        let result = bootstrap_schema(&repo, &settings).await;

        assert_eq!(result.is_ok(), startup_continues);
        repo.close().await;
    }

    #[tokio::test]
    async fn explicit_cors_policy_answers_preflight() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/register")
            .header(header::ORIGIN, "https://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app(MemoryStore::new(Behaviour::Working))
            .oneshot(request)
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("DELETE"));
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("content-type"));
        assert!(allowed.contains("authorization"));
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    }
}
