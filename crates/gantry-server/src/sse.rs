// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server-sent event responses.
//!
//! Streaming endpoints wrap each item in `{"result": ...}` frames and
//! interleave `:` comment lines as keepalives so idle proxies do not cut
//! the connection. Errors terminate the stream with a final error frame
//! since the HTTP status is long gone by then.

use std::time::Duration;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;

const KEEPALIVE_FRAME: &[u8] = b":\n";

/// Build an SSE response from a stream of results.
pub fn response<S, T>(stream: S, keepalive: Duration) -> Response
where
    S: Stream<Item = Result<T, ApiError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let body = async_stream::stream! {
        let mut stream = std::pin::pin!(stream);
        let mut ticker = tokio::time::interval(keepalive);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.reset();
        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(value)) => yield Ok::<_, std::convert::Infallible>(data_frame(&json!({"result": value}))),
                    Some(Err(err)) => {
                        yield Ok(data_frame(&json!({"error": {"code": err.code(), "message": err.to_string()}})));
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => yield Ok(Bytes::from_static(KEEPALIVE_FRAME)),
            }
        }
    };
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .unwrap_or_default()
}

fn data_frame(value: &serde_json::Value) -> Bytes {
    Bytes::from(format!("data: {value}\n\n"))
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use http_body_util::BodyExt;

    use super::*;

    async fn collect(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn wraps_items_in_result_frames() {
        let items = stream::iter(vec![Ok(json!({"name": "wf-1"})), Ok(json!({"name": "wf-2"}))]);
        let body = collect(response(items, Duration::from_secs(60))).await;
        assert!(body.contains("data: {\"result\":{\"name\":\"wf-1\"}}\n\n"));
        assert!(body.contains("wf-2"));
    }

    #[tokio::test]
    async fn errors_become_a_terminal_frame() {
        let items = stream::iter(vec![
            Ok(json!({"n": 1})),
            Err(ApiError::NotFound("gone".into())),
            Ok(json!({"n": 2})),
        ]);
        let body = collect(response(items, Duration::from_secs(60))).await;
        assert!(body.contains("\"code\":\"NOT_FOUND\""));
        // the stream stops at the error
        assert!(!body.contains("\"n\":2"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_streams_emit_keepalive_comments() {
        let items = stream::once(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({"done": true}))
        });
        let body = collect(response(items, Duration::from_secs(2))).await;
        assert!(body.contains(":\n"));
        assert!(body.contains("\"done\":true"));
    }
}
