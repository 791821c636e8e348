//! Portal front end.
//!
//! The assets are compiled into the binary. A configured static directory
//! replaces them, which is handy when working on the UI.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tower_http::services::{ServeDir, ServeFile};

use crate::config::StaticFilesConfig;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");
const APP_JS: &str = include_str!("../static/app.js");
const APP_CSS: &str = include_str!("../static/app.css");

/// Routes serving the portal.
pub fn routes(static_files: Option<&StaticFilesConfig>) -> Router<Arc<AppState>> {
    match static_files {
        Some(config) => {
            let index = config.root.join(&config.index);
            // Unknown paths get the index page so client-side routes load.
            Router::new().fallback_service(ServeDir::new(&config.root).fallback(ServeFile::new(index)))
        }
        None => Router::new()
            .route("/", get(index))
            .route("/app.js", get(app_js))
            .route("/app.css", get(app_css)),
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> Response {
    asset(APP_JS, "text/javascript; charset=utf-8")
}

async fn app_css() -> Response {
    asset(APP_CSS, "text/css; charset=utf-8")
}

fn asset(body: &'static str, content_type: &'static str) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
        body,
    )
        .into_response()
}
