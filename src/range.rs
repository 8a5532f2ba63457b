// Range header resolution. Deliberately lenient: media players send
// speculative and occasionally malformed range requests, so anything we
// cannot satisfy degrades to a full 200 response instead of a 416.

use axum::http::StatusCode;

/// A concrete byte extent to serve, with the response status it implies.
/// `end` is inclusive, matching HTTP `Content-Range` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub status: StatusCode,
}

impl ResolvedRange {
    fn full(length: u64) -> Self {
        Self {
            start: 0,
            end: length - 1,
            status: StatusCode::OK,
        }
    }

    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
    }
}

/// Resolve an optional `Range` header against a resource of `length` bytes
/// (`length` must be positive).
///
/// Supported forms: `bytes=S-E`, `bytes=S-` (to end), `bytes=-N` (last N
/// bytes). Multiple comma-separated ranges are combined into one covering
/// span so the transfer stays contiguous. Malformed syntax or a span wholly
/// outside the resource falls back to the full content.
pub fn resolve(header: Option<&str>, length: u64) -> ResolvedRange {
    let Some(value) = header else {
        return ResolvedRange::full(length);
    };

    match parse_spans(value, length) {
        Some((start, end)) => ResolvedRange {
            start,
            end,
            status: StatusCode::PARTIAL_CONTENT,
        },
        None => ResolvedRange::full(length),
    }
}

/// Parse every range spec in the header and merge them into a single
/// covering span (min start, max end). Any unparseable or unsatisfiable
/// spec poisons the whole header.
fn parse_spans(value: &str, length: u64) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes=")?;

    let mut start_min: Option<u64> = None;
    let mut end_max = 0u64;

    for spec in rest.split(',') {
        let (start, end) = parse_spec(spec.trim(), length)?;
        start_min = Some(start_min.map_or(start, |m: u64| m.min(start)));
        end_max = end_max.max(end);
    }

    start_min.map(|start| (start, end_max))
}

fn parse_spec(spec: &str, length: u64) -> Option<(u64, u64)> {
    let (start_str, end_str) = spec.split_once('-')?;
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    if start_str.is_empty() {
        // bytes=-N: the last N bytes.
        let suffix: u64 = end_str.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        Some((length.saturating_sub(suffix), length - 1))
    } else {
        let start: u64 = start_str.parse().ok()?;
        if start >= length {
            return None;
        }
        let end = if end_str.is_empty() {
            length - 1
        } else {
            end_str.parse::<u64>().ok()?.min(length - 1)
        };
        if end < start {
            return None;
        }
        Some((start, end))
    }
}
