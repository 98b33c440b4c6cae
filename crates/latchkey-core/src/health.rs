use axum::Json;
use axum::http::StatusCode;
use serde_json::{Map, Value};

/// `GET /healthz`: liveness only.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Build a readiness response from named dependency checks.
///
/// Returns 200 when every check passed, 503 otherwise. The body lists each
/// dependency as `"ok"` or `"down"`.
pub fn readiness(checks: &[(&str, bool)]) -> (StatusCode, Json<Value>) {
    let mut body = Map::new();
    for (name, ok) in checks {
        body.insert(
            (*name).to_owned(),
            Value::from(if *ok { "ok" } else { "down" }),
        );
    }
    let status = if checks.iter().all(|(_, ok)| *ok) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(Value::Object(body)))
}
