pub mod admin;
pub mod auth;
pub mod compute;
pub mod subscriptions;

use axum::http::{
    HeaderMap, HeaderName,
    header::{HOST, ORIGIN},
};

/// Public base URL of the app: the configured `APP_URL`, else the request's
/// `Origin`, else `http://<Host>`.
pub fn public_base_url(app_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(app_url) = app_url {
        return app_url.trim_end_matches('/').to_string();
    }

    match (header_value(headers, ORIGIN), header_value(headers, HOST)) {
        (Some(origin), _) => origin.trim_end_matches('/').to_string(),
        (None, Some(host)) => format!("http://{host}"),
        (None, None) => String::new(),
    }
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn configured_url_wins_over_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("https://other.test"));

        assert_eq!(
            public_base_url(Some("https://calc.test/"), &headers),
            "https://calc.test"
        );
    }

    #[test]
    fn falls_back_to_origin_then_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("localhost:3000"));
        assert_eq!(public_base_url(None, &headers), "http://localhost:3000");

        headers.insert(ORIGIN, HeaderValue::from_static("https://calc.test"));
        assert_eq!(public_base_url(None, &headers), "https://calc.test");
    }
}
