//! Body and cookie parsing

use crate::error::AppError;
use axum::{
    body::{self, Body},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{CookieJar, Key, SignedCookieJar};
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};
use tracing::debug;

/// Largest body the parser will buffer
pub const BODY_LIMIT: usize = 100 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// Decoded request body; `Null` when the request carried none we understand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBody(pub Value);

/// Cookies sent with the request
#[derive(Clone)]
pub struct ParsedCookies {
    pub plain: CookieJar,
    /// Only cookies whose signature checks out under the cookie secret
    pub signed: SignedCookieJar,
}

/// State of the parsing stage
#[derive(Clone)]
pub struct BodyParser {
    key: Key,
}

impl BodyParser {
    pub fn new(cookie_secret: &str) -> Self {
        Self {
            key: crate::session::signing_key(cookie_secret),
        }
    }
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json" || essence.ends_with("+json") {
        Some(BodyKind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn decode(kind: BodyKind, bytes: &[u8]) -> Result<Value, AppError> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .map_err(|e| AppError::BadRequest(format!("malformed JSON body: {}", e))),
        BodyKind::Form => {
            let fields = url::form_urlencoded::parse(bytes)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect::<Map<_, _>>();
            Ok(Value::Object(fields))
        }
    }
}

/// Decode JSON and form bodies and expose the request's cookies
pub async fn parse_body(
    State(parser): State<BodyParser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();

    parts.extensions.insert(ParsedCookies {
        plain: CookieJar::from_headers(&parts.headers),
        signed: SignedCookieJar::from_headers(&parts.headers, parser.key.clone()),
    });

    let Some(kind) = body_kind(&parts.headers) else {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };

    let bytes = body::to_bytes(body, BODY_LIMIT).await.map_err(|e| {
        let source = e.into_inner();
        if source.downcast_ref::<LengthLimitError>().is_some() {
            AppError::PayloadTooLarge { limit: BODY_LIMIT }
        } else {
            AppError::BadRequest(format!("failed to read body: {}", source))
        }
    })?;

    let value = decode(kind, &bytes)?;
    debug!("Parsed {:?} body ({} bytes)", kind, bytes.len());
    parts.extensions.insert(ParsedBody(value));

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

impl<S> FromRequestParts<S> for ParsedBody
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ParsedBody>()
            .cloned()
            .unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for ParsedCookies
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ParsedCookies>()
            .cloned()
            .ok_or_else(|| AppError::Internal("cookie parser is not installed".to_string()))
    }
}
