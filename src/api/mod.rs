//! HTTP surface.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/images?page&limit` | [`routes::list_images`] |
//! | `POST` | `/images` | [`routes::create_image`] |
//! | `PUT` | `/images` | [`routes::update_image`] |
//! | `DELETE` | `/images` | [`routes::delete_image`] |
//! | `GET` | `/artifacts/{key}` | filesystem artifacts (when that backend is active) |
//! | `GET` | `/health/liveness` | always `ok` |
//! | `GET` | `/health/readiness` | `ready`, or 503 while the catalog is unreachable |

pub mod error;
pub mod pagination;
pub mod routes;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the router.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/images",
            get(routes::list_images)
                .post(routes::create_image)
                .put(routes::update_image)
                .delete(routes::delete_image),
        )
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if let Some(root) = &state.artifacts_root {
        router = router.nest_service("/artifacts", ServeDir::new(root));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.orchestrator.catalog().ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(error) => {
            tracing::warn!(%error, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "catalog unavailable")
        }
    }
}
