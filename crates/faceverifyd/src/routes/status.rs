use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Deserialize;

use crate::error::Result;
use crate::state::AppState;
use crate::store::StatusRecord;

#[derive(Debug, Deserialize)]
struct StatusCreate {
    client_name: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/status", get(handler_list).post(handler_create))
}

async fn handler_create(
    State(state): State<AppState>,
    Json(input): Json<StatusCreate>,
) -> Result<Json<StatusRecord>> {
    let record = state.store.insert(input.client_name).await?;
    Ok(Json(record))
}

async fn handler_list(State(state): State<AppState>) -> Result<Json<Vec<StatusRecord>>> {
    Ok(Json(state.store.list().await?))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{body_json, TestApp};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn create(client_name: &str) -> Request<Body> {
        Request::post("/api/status")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "client_name": client_name }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_round_trip() {
        let app = TestApp::new().await;

        let first = body_json(app.router().oneshot(create("web")).await.unwrap()).await;
        let second = body_json(app.router().oneshot(create("mobile")).await.unwrap()).await;
        assert_eq!(first["client_name"], "web");
        assert!(first["id"].as_str().is_some_and(|id| id.len() == 36));
        assert!(first["timestamp"].as_str().is_some());

        let resp = app
            .router()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!([first, second]));
    }

    #[tokio::test]
    async fn test_create_requires_client_name() {
        let app = TestApp::new().await;
        let req = Request::post("/api/status")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let app = TestApp::new().await;
        app.state.store.clone().close().await.unwrap();
        let resp = app
            .router()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(resp).await["detail"].is_string());
    }
}
