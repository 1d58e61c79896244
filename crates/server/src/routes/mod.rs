use axum::{Router, http::HeaderValue};
use deployment::Deployment;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::DeploymentImpl;

pub mod ai;
pub mod credits;
pub mod generate;
pub mod health;
pub mod payments;
pub mod projects;

fn cors(deployment: &DeploymentImpl) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match HeaderValue::from_str(&deployment.config().app_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, "APP_URL is not a valid origin; CORS disabled");
            layer
        }
    }
}

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(generate::router())
        .merge(credits::router())
        .merge(projects::router())
        .merge(ai::router())
        .merge(payments::router());

    Router::new()
        .nest("/api", api)
        .layer(cors(&deployment))
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
