//! Axum router configuration with middleware.
//!
//! All workflow routes are under `/api/`.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/workflows", get(handlers::workflow::list_workflows))
        // Runs across workflows
        .route("/runs", get(handlers::run::list_runs))
        .route("/runs/{run_id}", get(handlers::run::get_run))
        .route("/runs/{run_id}/cancel", post(handlers::run::cancel_run))
        // Per-workflow submission and polling
        .route("/{workflow}/generate", post(handlers::workflow::generate))
        .route(
            "/{workflow}/status/{run_id}",
            get(handlers::workflow::status),
        )
        // Tool side effects
        .route("/outbox", get(handlers::inspect::list_sent_emails))
        .route("/drafts", get(handlers::inspect::list_drafts));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use flowrun_types::config::FlowrunConfig;

    use super::*;

    /// Serve the router on an ephemeral port and return its base URL.
    async fn spawn_app() -> (String, AppState) {
        let state = AppState::init(FlowrunConfig::default()).unwrap();
        let app = build_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), state)
    }

    async fn poll_until_terminal(client: &reqwest::Client, url: &str) -> Value {
        for _ in 0..200 {
            let body: Value = client.get(url).send().await.unwrap().json().await.unwrap();
            if matches!(body["status"].as_str(), Some("completed" | "failed")) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run at {url} did not finish");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (base, _) = spawn_app().await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn lists_registered_workflows() {
        let (base, _) = spawn_app().await;
        let body: Value = reqwest::get(format!("{base}/api/workflows"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        let names: Vec<&str> = body["workflows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["business-card", "requirements"]);
    }

    #[tokio::test]
    async fn generate_then_poll_to_completion() {
        let (base, state) = spawn_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/requirements/generate"))
            .json(&json!({ "requirements": "Customers can track orders. The app must be secure." }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        let run_id = body["runId"].as_str().unwrap().to_string();

        let status = poll_until_terminal(
            &client,
            &format!("{base}/api/requirements/status/{run_id}"),
        )
        .await;
        assert_eq!(status["success"], true);
        assert_eq!(status["status"], "completed");
        assert_eq!(status["currentStep"], "save-spec");
        assert!(status["result"]["specification"].as_str().unwrap().contains("TR-1"));
        assert!(status.get("error").is_none());
        assert_eq!(state.notes.drafts().len(), 1);

        let drafts: Value = reqwest::get(format!("{base}/api/drafts"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            drafts["drafts"][0]["id"],
            status["result"]["draftId"]
        );
    }

    #[tokio::test]
    async fn failed_run_reports_error_message() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{base}/api/business-card/generate"))
            .json(&json!({
                "senderName": "Dana Reyes",
                "senderCompany": "Northwind",
                "senderEmail": "dana@northwind.example",
                "recipientName": "Sam Okafor",
                "recipientCompany": "Contoso",
                "recipientEmail": "nobody",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let run_id = body["runId"].as_str().unwrap();

        let status = poll_until_terminal(
            &client,
            &format!("{base}/api/business-card/status/{run_id}"),
        )
        .await;
        assert_eq!(status["status"], "failed");
        assert_eq!(status["currentStep"], "extract-contact");
        assert!(status["error"].as_str().unwrap().contains("not a valid email address"));
        assert!(status.get("result").is_none());

        let outbox: Value = reqwest::get(format!("{base}/api/outbox"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(outbox["emails"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn business_card_email_shows_up_in_outbox() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{base}/api/business-card/generate"))
            .json(&json!({
                "senderName": "Dana Reyes",
                "senderCompany": "Northwind",
                "senderEmail": "dana@northwind.example",
                "recipientName": "Sam Okafor",
                "recipientCompany": "Contoso",
                "recipientEmail": "sam@contoso.example",
                "meetingContext": "the billing migration",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let run_id = body["runId"].as_str().unwrap();

        let status = poll_until_terminal(
            &client,
            &format!("{base}/api/business-card/status/{run_id}"),
        )
        .await;
        assert_eq!(status["status"], "completed");
        assert_eq!(status["result"]["success"], true);

        let outbox: Value = reqwest::get(format!("{base}/api/outbox"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let emails = outbox["emails"].as_array().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0]["to"], "sam@contoso.example");
        assert_eq!(emails[0]["messageId"], status["result"]["messageId"]);
    }

    #[tokio::test]
    async fn generate_rejects_bad_input() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let missing_field = client
            .post(format!("{base}/api/requirements/generate"))
            .json(&json!({ "context": "no requirement here" }))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_field.status(), 400);
        let body: Value = missing_field.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("requirements"));

        let bad_json = client
            .post(format!("{base}/api/requirements/generate"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(bad_json.status(), 400);

        let unknown = client
            .post(format!("{base}/api/nope/generate"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);
    }

    #[tokio::test]
    async fn status_of_unknown_or_foreign_run_is_not_found() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let unknown = client
            .get(format!("{base}/api/requirements/status/{}", uuid::Uuid::now_v7()))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);
        let body: Value = unknown.json().await.unwrap();
        assert_eq!(body["success"], false);

        let malformed = client
            .get(format!("{base}/api/requirements/status/not-a-uuid"))
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), 400);

        let body: Value = client
            .post(format!("{base}/api/requirements/generate"))
            .json(&json!({ "requirements": "Users can reset their password by email." }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let run_id = body["runId"].as_str().unwrap();
        let foreign = client
            .get(format!("{base}/api/business-card/status/{run_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(foreign.status(), 404);
    }

    #[tokio::test]
    async fn cancelling_a_finished_run_conflicts() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{base}/api/requirements/generate"))
            .json(&json!({ "requirements": "Users can reset their password by email." }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let run_id = body["runId"].as_str().unwrap();
        poll_until_terminal(&client, &format!("{base}/api/requirements/status/{run_id}")).await;

        let resp = client
            .post(format!("{base}/api/runs/{run_id}/cancel"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);

        let missing = client
            .post(format!("{base}/api/runs/{}/cancel", uuid::Uuid::now_v7()))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn lists_runs_with_filters() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{base}/api/requirements/generate"))
            .json(&json!({ "requirements": "Users can reset their password by email." }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let run_id = body["runId"].as_str().unwrap();
        poll_until_terminal(&client, &format!("{base}/api/requirements/status/{run_id}")).await;

        let body: Value = client
            .get(format!("{base}/api/runs?workflow=requirements&status=completed"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let runs = body["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["runId"], run_id);

        let body: Value = client
            .get(format!("{base}/api/runs?workflow=business-card"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(body["runs"].as_array().unwrap().is_empty());

        let bad_status = client
            .get(format!("{base}/api/runs?status=paused"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_status.status(), 400);

        let single: Value = client
            .get(format!("{base}/api/runs/{run_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(single["run"]["workflow"], "requirements");
        assert_eq!(single["run"]["status"], "completed");
    }
}
