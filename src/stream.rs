// Streams one file range from a live session into an HTTP response,
// bridging the session's byte source to the body with backpressure and
// per-transfer bookkeeping.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::Stream;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::range;
use crate::registry::{StreamGuard, SwarmRegistry};
use crate::swarm::ByteSource;

/// Serve one file of a live session, honoring an optional `Range` header.
///
/// Headers go out exactly once, before any body bytes. Errors after that
/// point terminate the connection abruptly; a client recovers by retrying
/// with a fresh range request.
pub async fn serve(
    registry: &Arc<SwarmRegistry>,
    id: &str,
    file_index: usize,
    range_header: Option<&str>,
) -> Response {
    let Some(handle) = registry.get(id) else {
        return error_response(StatusCode::NOT_FOUND, "session not found");
    };

    let Some(file) = handle.files().get(file_index).cloned() else {
        return error_response(StatusCode::NOT_FOUND, "file not found");
    };

    let content_type = media_type_for(&file.name);

    if file.length == 0 {
        return empty_file_response(content_type);
    }

    let resolved = range::resolve(range_header, file.length);

    let guard = match registry.begin_stream(id) {
        Ok(guard) => guard,
        // The session was torn down between lookup and open.
        Err(_) => return error_response(StatusCode::NOT_FOUND, "session not found"),
    };

    let source = match handle.open_byte_range(file_index, resolved.start, resolved.end) {
        Ok(source) => source,
        Err(e) => {
            let e = Error::Stream(e.to_string());
            error!("failed to open byte range {}/{}: {}", id, file_index, e);
            // Guard drops here, releasing the stream slot.
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    debug!(
        "stream request session={} file={} range=[{}, {}] status={}",
        id,
        file_index,
        resolved.start,
        resolved.end,
        resolved.status.as_u16()
    );

    let body = Body::from_stream(GuardedSource {
        source,
        id: id.to_string(),
        _guard: guard,
    });

    let mut builder = HttpResponse::builder()
        .status(resolved.status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, resolved.content_length())
        .header(header::ACCEPT_RANGES, "bytes");

    if resolved.is_partial() {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", resolved.start, resolved.end, file.length),
        );
    }

    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            error!("failed to build stream response: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Structured JSON error body, usable only before headers have been sent.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn empty_file_response(content_type: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, "0".to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
    )
        .into_response()
}

/// Byte source wrapped with its registry stream slot. When the HTTP body is
/// dropped (completion or client disconnect) the guard releases the slot;
/// a source error mid-body makes hyper abort the connection.
struct GuardedSource {
    source: ByteSource,
    id: String,
    _guard: StreamGuard,
}

impl Stream for GuardedSource {
    type Item = anyhow::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.source.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                warn!("stream aborted for session {}: {:#}", this.id, e);
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

/// Map a file name to a `Content-Type` by extension.
///
/// Matroska is reported as `video/mp4` on purpose: browsers refuse to play
/// `video/x-matroska` inline even when the codecs are supported, and the
/// mislabel is harmless to players that sniff the container.
pub(crate) fn media_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/mp4",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" => "video/mp2t",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "srt" => "application/x-subrip",
        "vtt" => "text/vtt",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "txt" | "nfo" => "text/plain",
        _ => "application/octet-stream",
    }
}
