//! Requester identity extractor.
//!
//! The frontend in front of this server authenticates users and forwards
//! their identity in headers:
//!
//! | Header         | Meaning                                             |
//! |----------------|-----------------------------------------------------|
//! | `x-user-id`    | requester (required)                                |
//! | `x-chat-id`    | conversation; defaults to the requester's own chat  |
//! | `x-message-id` | inbound message to reply to (optional)              |
//!
//! A chat id different from the user id denotes a group conversation.
//!
//! Direct requests are accepted from allowed users only, group requests
//! from allowed groups only; anything else is rejected with 403.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use renderq_core::error::CoreError;
use renderq_core::types::{ChatKind, DbId, Origin};

use crate::error::AppError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const CHAT_ID_HEADER: &str = "x-chat-id";
pub const MESSAGE_ID_HEADER: &str = "x-message-id";

/// The origin of the current request.
#[derive(Debug, Clone)]
pub struct Requester(pub Origin);

impl FromRequestParts<AppState> for Requester {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let origin = origin_from_headers(&parts.headers)?;
        if !state.config.access.allows(&origin) {
            tracing::info!(
                requester_id = origin.requester_id,
                chat_id = origin.chat_id,
                "Requester not allowed",
            );
            return Err(AppError::Core(CoreError::Forbidden(
                "Requester is not allowed".into(),
            )));
        }
        Ok(Requester(origin))
    }
}

/// Parse the identity headers into an [`Origin`].
pub fn origin_from_headers(headers: &HeaderMap) -> Result<Origin, AppError> {
    let requester_id = header_id(headers, USER_ID_HEADER)?
        .ok_or_else(|| AppError::BadRequest(format!("Missing {USER_ID_HEADER} header")))?;
    let chat_id = header_id(headers, CHAT_ID_HEADER)?.unwrap_or(requester_id);
    let message_id = header_id(headers, MESSAGE_ID_HEADER)?;

    let chat_kind = if chat_id == requester_id {
        ChatKind::Direct
    } else {
        ChatKind::Group
    };

    Ok(Origin {
        requester_id,
        chat_id,
        chat_kind,
        message_id,
    })
}

fn header_id(headers: &HeaderMap, name: &str) -> Result<Option<DbId>, AppError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid {name} header")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::Request;

    use super::*;

    fn extract(headers: &[(&str, &str)]) -> Result<Origin, AppError> {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        origin_from_headers(&parts.headers)
    }

    #[test]
    fn user_header_alone_is_direct_chat() {
        let origin = extract(&[(USER_ID_HEADER, "42")]).unwrap();
        assert_eq!(origin, Origin::direct(42));
    }

    #[test]
    fn different_chat_is_group() {
        let origin = extract(&[
            (USER_ID_HEADER, "42"),
            (CHAT_ID_HEADER, "-1001"),
            (MESSAGE_ID_HEADER, "7"),
        ])
        .unwrap();
        assert!(origin.is_group());
        assert_eq!(origin.chat_id, -1001);
        assert_eq!(origin.message_id, Some(7));
    }

    #[test]
    fn missing_or_malformed_user_is_rejected() {
        assert_matches!(extract(&[]), Err(AppError::BadRequest(_)));
        assert_matches!(
            extract(&[(USER_ID_HEADER, "alice")]),
            Err(AppError::BadRequest(_))
        );
    }
}
