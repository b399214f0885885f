//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Patient routes are nested under `/api/patient/` behind bearer auth;
//! `/health` stays open for liveness probes.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost
/// layer). Endpoint handlers use `State<ApiContext>` via `with_state`.
pub fn api_router(ctx: ApiContext) -> Router {
    // Protected routes — bearer auth required.
    //
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Handler
    //
    // Extension must be outermost so the auth middleware can access
    // ApiContext. `.with_state()` converts Router<ApiContext> →
    // Router<()> so `from_fn` middleware (state = ()) is compatible.
    let protected = Router::new()
        .route(
            "/trackers",
            post(endpoints::trackers::create).get(endpoints::trackers::list),
        )
        .route("/trackers/pending", get(endpoints::trackers::pending))
        .route("/trackers/status", post(endpoints::trackers::decide))
        .route("/reminders", get(endpoints::reminders::by_date))
        .route("/reminders/today", get(endpoints::reminders::today))
        .route("/reminders/:id", put(endpoints::reminders::update))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::Extension(ctx));

    let unprotected = Router::new().route("/health", get(endpoints::health::check));

    Router::new()
        .nest("/api/patient", protected)
        .merge(unprotected)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::models::Role;

    /// Context backed by a temp-file database, with one patient and one
    /// doctor session. The tempdir guard must outlive the test.
    fn test_ctx() -> (ApiContext, String, String, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ApiContext::new(tmp.path().join("medisync.db"));
        let (patient_token, doctor_token) = {
            let mut sessions = ctx.sessions.lock().unwrap();
            (
                sessions.issue("alice@example.com", Role::Patient),
                sessions.issue("dr.chen@example.com", Role::Doctor),
            )
        };
        (ctx, patient_token, doctor_token, tmp)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 65536).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    const DRAFT_JSON: &str = r#"{
        "name": "Metformin",
        "dosage": "500mg",
        "frequency": "1-0-1",
        "doctor": "Dr. Chen",
        "start_date": "2020-01-01",
        "end_date": "2020-01-02",
        "notes": "with food"
    }"#;

    #[tokio::test]
    async fn health_is_open() {
        let (ctx, _, _, _tmp) = test_ctx();
        let app = api_router(ctx);

        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(!json["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn patient_routes_require_auth() {
        let (ctx, _, _, _tmp) = test_ctx();

        for (method, uri) in [
            ("GET", "/api/patient/trackers"),
            ("GET", "/api/patient/trackers/pending"),
            ("GET", "/api/patient/reminders/today"),
        ] {
            let app = api_router(ctx.clone());
            let response = app.oneshot(request(method, uri, None, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn invalid_token_returns_401() {
        let (ctx, _, _, _tmp) = test_ctx();
        let app = api_router(ctx);

        let response = app
            .oneshot(request("GET", "/api/patient/trackers", Some("bogus"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn patient_create_and_list() {
        let (ctx, patient, _, _tmp) = test_ctx();

        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request(
                "POST",
                "/api/patient/trackers",
                Some(&patient),
                Some(DRAFT_JSON),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let json = response_json(response).await;
        assert_eq!(json["tracker"]["status"], "approved");
        assert_eq!(json["tracker"]["patient_id"], "alice@example.com");

        let app = api_router(ctx);
        let response = app
            .oneshot(request("GET", "/api/patient/trackers", Some(&patient), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["trackers"].as_array().unwrap().len(), 1);
        assert_eq!(json["trackers"][0]["name"], "Metformin");
    }

    #[tokio::test]
    async fn doctor_prescription_approval_flow() {
        let (ctx, patient, doctor, _tmp) = test_ctx();

        // Doctor prescribes for the patient
        let body = r#"{"name":"Lisinopril","dosage":"10mg","frequency":"1-0-0","doctor":"Dr. Chen",
            "start_date":"2020-01-01","end_date":"2020-01-03","notes":"",
            "patient_id":"alice@example.com"}"#;
        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request("POST", "/api/patient/trackers", Some(&doctor), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = response_json(response).await;
        assert_eq!(json["tracker"]["status"], "pending");
        let tracker_id = json["tracker"]["id"].as_str().unwrap().to_string();

        // The patient sees it as pending
        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request("GET", "/api/patient/trackers/pending", Some(&patient), None))
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["trackers"].as_array().unwrap().len(), 1);

        // Patient approves — reminders generated
        let decision = format!(r#"{{"tracker_id":"{tracker_id}","status":"approved"}}"#);
        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request(
                "POST",
                "/api/patient/trackers/status",
                Some(&patient),
                Some(&decision),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["reminders_generated"], 3);

        // Second approval resolves to 404 (one-way guard)
        let app = api_router(ctx);
        let response = app
            .oneshot(request(
                "POST",
                "/api/patient/trackers/status",
                Some(&patient),
                Some(&decision),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn doctor_create_without_patient_id_is_rejected() {
        let (ctx, _, doctor, _tmp) = test_ctx();
        let app = api_router(ctx);

        let response = app
            .oneshot(request("POST", "/api/patient/trackers", Some(&doctor), Some(DRAFT_JSON)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_frequency_is_rejected() {
        let (ctx, patient, _, _tmp) = test_ctx();
        let app = api_router(ctx);

        let body = r#"{"name":"X","dosage":"1","frequency":"1-2-1","doctor":"Dr.",
            "start_date":"2020-01-01","end_date":null,"notes":""}"#;
        let response = app
            .oneshot(request("POST", "/api/patient/trackers", Some(&patient), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn reminders_by_past_date_report_missed() {
        let (ctx, patient, _, _tmp) = test_ctx();

        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request("POST", "/api/patient/trackers", Some(&patient), Some(DRAFT_JSON)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let app = api_router(ctx);
        let response = app
            .oneshot(request(
                "GET",
                "/api/patient/reminders?date=2020-01-01",
                Some(&patient),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        let reminders = json["reminders"].as_array().unwrap();
        assert_eq!(reminders.len(), 2);
        assert!(reminders.iter().all(|r| r["status"] == "Missed"));
        assert_eq!(reminders[0]["medication_name"], "Metformin");
    }

    #[tokio::test]
    async fn reminder_status_update_and_conflict() {
        let (ctx, patient, _, _tmp) = test_ctx();

        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request("POST", "/api/patient/trackers", Some(&patient), Some(DRAFT_JSON)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        // Grab a reminder id straight from the database
        let reminder_id: String = {
            let conn = ctx.open_db().unwrap();
            conn.query_row(
                "SELECT id FROM reminders ORDER BY date ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap()
        };

        // Scheduled in 2020, so the gate is long open
        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request(
                "PUT",
                &format!("/api/patient/reminders/{reminder_id}"),
                Some(&patient),
                Some(r#"{"status":"Taken"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "Taken");

        // Re-mark under the default sticky policy → 409
        let app = api_router(ctx);
        let response = app
            .oneshot(request(
                "PUT",
                &format!("/api/patient/reminders/{reminder_id}"),
                Some(&patient),
                Some(r#"{"status":"Missed"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn rewritable_policy_allows_remark_over_http() {
        let (mut ctx, patient, _, _tmp) = test_ctx();
        ctx.policy = crate::trackers::FinalizePolicy::Rewritable;

        let app = api_router(ctx.clone());
        let response = app
            .oneshot(request("POST", "/api/patient/trackers", Some(&patient), Some(DRAFT_JSON)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let reminder_id: String = {
            let conn = ctx.open_db().unwrap();
            conn.query_row(
                "SELECT id FROM reminders ORDER BY date ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap()
        };

        for (status, body) in [("Taken", r#"{"status":"Taken"}"#), ("Missed", r#"{"status":"Missed"}"#)]
        {
            let app = api_router(ctx.clone());
            let response = app
                .oneshot(request(
                    "PUT",
                    &format!("/api/patient/reminders/{reminder_id}"),
                    Some(&patient),
                    Some(body),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "re-mark to {status}");
        }
    }

    #[tokio::test]
    async fn foreign_reminder_is_404() {
        let (ctx, patient, doctor, _tmp) = test_ctx();

        let app = api_router(ctx.clone());
        app.oneshot(request("POST", "/api/patient/trackers", Some(&patient), Some(DRAFT_JSON)))
            .await
            .unwrap();

        let reminder_id: String = {
            let conn = ctx.open_db().unwrap();
            conn.query_row(
                "SELECT id FROM reminders ORDER BY date ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap()
        };

        // The doctor is not the owning patient
        let app = api_router(ctx);
        let response = app
            .oneshot(request(
                "PUT",
                &format!("/api/patient/reminders/{reminder_id}"),
                Some(&doctor),
                Some(r#"{"status":"Taken"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_date_param_is_400() {
        let (ctx, patient, _, _tmp) = test_ctx();
        let app = api_router(ctx);

        let response = app
            .oneshot(request(
                "GET",
                "/api/patient/reminders?date=january-1st",
                Some(&patient),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (ctx, patient, _, _tmp) = test_ctx();
        let app = api_router(ctx);

        let response = app
            .oneshot(request("GET", "/api/patient/nonexistent", Some(&patient), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
