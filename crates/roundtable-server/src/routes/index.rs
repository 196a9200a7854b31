use axum::{response::Html, routing::get, Router};

const INDEX_PAGE: &str = include_str!("../../static/index.html");

async fn handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub fn routes() -> Router {
    Router::new().route("/", get(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_serves_chat_page() {
        let response = routes()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("<title>Roundtable</title>"));
        assert!(page.contains("Meeting room"));
        assert!(page.contains("Enter text here..."));
        assert!(page.contains("Please write a message..."));
    }
}
