use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Origins the local frontends are served from during development.
pub const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8081",
    "http://127.0.0.1:8081",
    "http://localhost:19006",
];

/// Origins allowed to call the API: the configured frontend plus the dev origins.
pub fn allowed_origins(frontend_origin: &str) -> Vec<HeaderValue> {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in std::iter::once(frontend_origin).chain(DEV_ORIGINS) {
        match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(_) => warn!(origin, "ignoring invalid CORS origin"),
        }
    }
    origins
}

/// Credentialed CORS for the allowed origins.
pub fn cors_layer(frontend_origin: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(frontend_origin)))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_comes_first_and_duplicates_are_dropped() {
        let origins = allowed_origins("http://localhost:3000/");
        assert_eq!(origins.len(), DEV_ORIGINS.len());
        assert_eq!(origins[0], "http://localhost:3000");

        let origins = allowed_origins("https://app.example.com");
        assert_eq!(origins.len(), DEV_ORIGINS.len() + 1);
        assert_eq!(origins[0], "https://app.example.com");
    }

    #[test]
    fn invalid_origin_is_skipped() {
        let origins = allowed_origins("http://bad\norigin");
        assert_eq!(origins.len(), DEV_ORIGINS.len());
    }
}
