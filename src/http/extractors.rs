//! Header-based extractors for the handshake and peer-authenticated routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use crate::handshake::HandshakeHeaders;

pub struct ExtractHandshakeHeaders(pub HandshakeHeaders);

impl<S> FromRequestParts<S> for ExtractHandshakeHeaders
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let source = header_value(parts, "X-Source")?;
        let session = header_value(parts, "X-Session")?;
        let acceptance = header_value(parts, "X-Acceptance")?;
        Ok(ExtractHandshakeHeaders(HandshakeHeaders { source, session, acceptance }))
    }
}

fn header_value(parts: &Parts, name: &'static str) -> Result<String, (StatusCode, &'static str)> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .ok_or((StatusCode::UNPROCESSABLE_ENTITY, "missing or invalid credential header"))
}

pub struct ExtractHash(pub String);

impl<S> FromRequestParts<S> for ExtractHash
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, "X-Hash").map(ExtractHash)
    }
}
