use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::state::AppState;
use roundtable::rooms::RoomKind;

#[derive(Debug, Serialize)]
struct RoomInfo {
    name: String,
    description: &'static str,
    default: bool,
}

async fn handler(State(state): State<AppState>) -> Json<Vec<RoomInfo>> {
    Json(
        RoomKind::iter()
            .map(|kind| RoomInfo {
                name: kind.to_string(),
                description: kind.description(),
                default: kind == state.default_room,
            })
            .collect(),
    )
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/rooms", get(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_lists_every_room() {
        let dir = TempDir::new().unwrap();
        let app = routes(test_support::state(RoomKind::Research, test_support::provider(vec![]), &dir));

        let response = app
            .oneshot(Request::get("/rooms").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let rooms: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rooms.len(), RoomKind::iter().count());
        assert_eq!(rooms[0]["name"], "basic");
        let research = rooms.iter().find(|r| r["name"] == "research").unwrap();
        assert_eq!(research["default"], true);
    }
}
