//! Responses synthesised when neither the network nor a cache can answer.

use crate::offline::http::{Response, ResponseSource};
use serde_json::json;

/// Marks a cached API body served because the network failed.
pub const STALE_HEADER: &str = "x-offline-cache";
pub const STALE_VALUE: &str = "stale";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline - Toolbox</title>
  <style>
    body { font-family: system-ui, sans-serif; display: flex; align-items: center;
           justify-content: center; min-height: 100vh; margin: 0; background: #f8fafc; color: #0f172a; }
    main { text-align: center; padding: 2rem; }
    button { margin-top: 1rem; padding: 0.6rem 1.4rem; border: 0; border-radius: 6px;
             background: #2563eb; color: #fff; font-size: 1rem; cursor: pointer; }
  </style>
</head>
<body>
  <main>
    <h1>You're offline</h1>
    <p>Check your connection. Tools you opened before are still available.</p>
    <button id="retry" onclick="window.location.reload()">Try again</button>
  </main>
</body>
</html>
"#;

const IMAGE_PLACEHOLDER: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200"><rect width="200" height="200" fill="#e2e8f0"/><text x="100" y="105" font-family="sans-serif" font-size="14" fill="#64748b" text-anchor="middle">Image unavailable</text></svg>"##;

/// JSON 503 for API calls that cannot be answered offline.
pub fn api_unavailable() -> Response {
    let body = json!({
        "error": "offline",
        "message": "You are offline and this data is not available in the offline cache.",
    });
    Response::new(503, body.to_string())
        .with_header("content-type", "application/json")
        .with_source(ResponseSource::Fallback)
}

pub fn offline_page() -> Response {
    Response::new(200, OFFLINE_PAGE)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_source(ResponseSource::Fallback)
}

pub fn image_placeholder() -> Response {
    Response::new(200, IMAGE_PLACEHOLDER)
        .with_header("content-type", "image/svg+xml")
        .with_source(ResponseSource::Fallback)
}

/// Tags a cached copy so the page can tell it is not live.
pub fn mark_stale(response: Response) -> Response {
    response
        .with_header(STALE_HEADER, STALE_VALUE)
        .with_source(ResponseSource::Cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_unavailable_shape() {
        let response = api_unavailable();
        assert_eq!(response.status, 503);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "offline");
        assert!(body["message"].is_string());
    }

    #[test]
    fn test_offline_page_is_self_contained() {
        let page = offline_page().text();
        assert!(page.contains("id=\"retry\""));
        assert!(!page.contains("src="));
        assert!(!page.contains("<link"));
    }

    #[test]
    fn test_placeholder_is_svg() {
        let response = image_placeholder();
        assert_eq!(response.header("content-type"), Some("image/svg+xml"));
        assert!(response.text().starts_with("<svg"));
    }
}
