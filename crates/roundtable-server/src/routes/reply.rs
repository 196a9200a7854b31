use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use roundtable::graph::Step;
use roundtable::rooms::RoomKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

pub const EMPTY_MESSAGE_WARNING: &str = "Please write a message...";
pub const APOLOGY: &str = "Sorry, something goes wrong. Try with a different input";

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    message: String,
    #[serde(default)]
    room: Option<RoomKind>,
}

// Custom SSE response type that implements the Vercel AI SDK protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .header("x-vercel-ai-data-stream", "v1")
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_data(data: Value) -> String {
        // Data parts start with "2:" and always carry an array
        format!("2:{}\n", json!([data]))
    }

    fn format_error(error: &str) -> String {
        let encoded_error = serde_json::to_string(error).unwrap_or_else(|_| String::new());
        format!("3:{}\n", encoded_error)
    }

    fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

/// Each message opens with a speaker marker; a routing decision is a data part of its own
async fn stream_step(step: Step, tx: &mpsc::Sender<String>) -> Result<(), mpsc::error::SendError<String>> {
    for message in step.update.messages {
        let speaker = message.name.clone().unwrap_or_else(|| step.node.clone());
        tx.send(ProtocolFormatter::format_data(json!({
            "type": "message",
            "node": step.node,
            "name": speaker,
        })))
        .await?;

        for line in message.text().lines() {
            tx.send(ProtocolFormatter::format_text(&format!("{}\n", line)))
                .await?;
        }
    }

    if let Some(next) = step.update.next {
        tx.send(ProtocolFormatter::format_data(json!({
            "type": "route",
            "node": step.node,
            "next": next,
        })))
        .await?;
    }
    Ok(())
}

async fn fail(tx: &mpsc::Sender<String>) {
    let _ = tx.send(ProtocolFormatter::format_error(APOLOGY)).await;
    let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ReplyRequest>,
) -> Result<SseResponse, (StatusCode, &'static str)> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, EMPTY_MESSAGE_WARNING));
    }

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    tokio::spawn(async move {
        let room = match state.build_room(request.room) {
            Ok(room) => room,
            Err(e) => {
                tracing::error!(error = %e, "failed to build room");
                fail(&tx).await;
                return;
            }
        };
        tracing::info!(room = %room.kind(), "Meeting started");

        let mut steps = room.stream(&message);
        let mut failed = false;
        loop {
            match timeout(Duration::from_millis(500), steps.next()).await {
                Ok(Some(Ok(step))) => {
                    if let Err(e) = stream_step(step, &tx).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "turn failed");
                    failed = true;
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and stop the room
                    if tx.is_closed() {
                        tracing::info!("client disconnected, dropping the turn");
                        break;
                    }
                }
            }
        }
        drop(steps);
        tracing::info!(room = %room.kind(), "Meeting ended");

        if failed {
            fail(&tx).await;
        } else {
            let _ = tx.send(ProtocolFormatter::format_finish("stop")).await;
        }
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use roundtable::models::message::Message;
    use roundtable::models::tool::ToolCall;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn post_reply(body: Value) -> Request<Body> {
        Request::post("/reply")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_lines(response: Response) -> Vec<String> {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec())
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    fn part(line: &str, prefix: &str) -> Option<Value> {
        line.strip_prefix(prefix)
            .map(|payload| serde_json::from_str(payload).unwrap())
    }

    #[test]
    fn test_protocol_formatting() {
        assert_eq!(
            ProtocolFormatter::format_text("say \"hi\"\n"),
            "0:\"say \\\"hi\\\"\\n\"\n"
        );
        assert_eq!(
            ProtocolFormatter::format_error(APOLOGY),
            format!("3:\"{}\"\n", APOLOGY)
        );
        assert_eq!(
            ProtocolFormatter::format_data(json!({"next": "FINISH"})),
            "2:[{\"next\":\"FINISH\"}]\n"
        );
        let finish = part(ProtocolFormatter::format_finish("stop").trim(), "d:").unwrap();
        assert_eq!(finish["finishReason"], "stop");
        assert_eq!(finish["usage"]["promptTokens"], 0);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = routes(test_support::state(RoomKind::Meeting, test_support::provider(vec![]), &dir));

        let response = app
            .oneshot(post_reply(json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], EMPTY_MESSAGE_WARNING.as_bytes());
    }

    #[tokio::test]
    async fn test_streams_agent_text() {
        let dir = TempDir::new().unwrap();
        let provider = test_support::provider(vec![Ok(
            Message::assistant().with_text("Hello there.\nSecond line.")
        )]);
        let app = routes(test_support::state(RoomKind::Meeting, provider.clone(), &dir));

        let response = app
            .oneshot(post_reply(json!({"message": "Hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-vercel-ai-data-stream").unwrap(),
            "v1"
        );

        let lines = read_lines(response).await;
        let speaker = part(&lines[0], "2:").unwrap();
        assert_eq!(speaker[0]["type"], "message");
        assert_eq!(speaker[0]["name"], "Assistant");

        let texts: Vec<Value> = lines.iter().filter_map(|l| part(l, "0:")).collect();
        assert_eq!(texts, vec![json!("Hello there.\n"), json!("Second line.\n")]);

        let finish = part(lines.last().unwrap(), "d:").unwrap();
        assert_eq!(finish["finishReason"], "stop");

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages[0].text(), "Hi");
    }

    #[tokio::test]
    async fn test_streams_routing_decisions() {
        let dir = TempDir::new().unwrap();
        let route = |next: &str| -> Result<Message, String> {
            Ok(Message::assistant().with_tool_request(
                "route_1",
                Ok(ToolCall::new("route", json!({"next": next}))),
            ))
        };
        let app = routes(test_support::state(
            RoomKind::Meeting,
            test_support::provider(vec![
                route("Search"),
                Ok(Message::assistant().with_text("Found it.")),
                route("FINISH"),
            ]),
            &dir,
        ));

        let response = app
            .oneshot(post_reply(json!({"message": "Look it up", "room": "research"})))
            .await
            .unwrap();
        let lines = read_lines(response).await;

        let routes: Vec<Value> = lines
            .iter()
            .filter_map(|l| part(l, "2:"))
            .filter(|data| data[0]["type"] == "route")
            .map(|data| data[0]["next"].clone())
            .collect();
        assert_eq!(routes, vec![json!("Search"), json!("FINISH")]);
        assert!(lines.contains(&"0:\"Found it.\\n\"".to_string()));
    }

    #[tokio::test]
    async fn test_failure_streams_apology() {
        let dir = TempDir::new().unwrap();
        let app = routes(test_support::state(
            RoomKind::Meeting,
            test_support::provider(vec![Err("Server error: 500".to_string())]),
            &dir,
        ));

        let response = app
            .oneshot(post_reply(json!({"message": "Hi"})))
            .await
            .unwrap();
        let lines = read_lines(response).await;

        assert_eq!(lines[0], format!("3:\"{}\"", APOLOGY));
        let finish = part(&lines[1], "d:").unwrap();
        assert_eq!(finish["finishReason"], "error");
    }
}
