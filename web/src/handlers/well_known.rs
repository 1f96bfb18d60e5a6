//! `/.well-known` documents.

use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{
        HeaderValue,
        header::{CACHE_CONTROL, CONTENT_TYPE, STRICT_TRANSPORT_SECURITY},
    },
    response::{IntoResponse, Response},
};
use passkey_auth::{JwkSet, SharedStore, WebAuthnVerifier};
use serde_json::{Value, json};

/// `GET /.well-known/jwks.json`
///
/// Every live signing key, newest first. Verifiers should refetch on an
/// unknown `kid`.
pub async fn jwks<S, V>(State(state): State<AppState<S, V>>) -> Json<JwkSet>
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    Json(state.auth.publish_key_set())
}

/// App-site-association document binding `app_id` to this domain for
/// universal links and shared web credentials.
#[must_use]
pub fn app_site_association(app_id: &str) -> Value {
    json!({
        "applinks": {
            "apps": [],
            "details": [{
                "appID": app_id,
                "paths": ["*"],
                "components": [{ "/": "/*", "comment": "Matches all URLs" }]
            }]
        },
        "webcredentials": { "apps": [app_id] }
    })
}

/// `GET /.well-known/apple-app-site-association`
pub async fn apple_app_site_association<S, V>(State(state): State<AppState<S, V>>) -> Response
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    let mut response = Json(app_site_association(&state.app_id)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}
