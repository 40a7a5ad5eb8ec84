//! GitHub webhook request context

use axum::body::Bytes;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::AuthError;
use crate::signature::verify_signature;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// Headers and raw body of one GitHub delivery; every field is non-empty.
#[derive(Debug, Clone)]
pub struct WebhookContext {
    pub signature: String,
    pub event: String,
    pub delivery_id: String,
    pub payload: Bytes,
}

impl WebhookContext {
    pub fn from_request(headers: &HeaderMap, payload: Bytes) -> Result<Self, AuthError> {
        let signature = header(headers, SIGNATURE_HEADER)?;
        let event = header(headers, EVENT_HEADER)?;
        let delivery_id = header(headers, DELIVERY_HEADER)?;
        if payload.is_empty() {
            return Err(AuthError::MissingBody);
        }
        Ok(Self {
            signature,
            event,
            delivery_id,
            payload,
        })
    }

    pub fn verify(&self, secret: &[u8]) -> Result<(), AuthError> {
        if verify_signature(secret, &self.signature, &self.payload) {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    pub fn is_push(&self) -> bool {
        self.event == "push"
    }

    pub fn push_event(&self) -> Result<PushEvent, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

fn header(headers: &HeaderMap, name: &'static str) -> Result<String, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or(AuthError::MissingHeader(name))
}

/// The parts of a push payload we use
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub after: Option<String>,
    pub repository: Repository,
    pub pusher: Option<Pusher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: Option<String>,
}

impl PushEvent {
    pub fn pusher_name(&self) -> &str {
        self.pusher
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or("github")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign_body;
    use axum::http::HeaderValue;

    const PAYLOAD: &str = r#"{"ref":"refs/heads/master","after":"abc123","repository":{"full_name":"acme/site"},"pusher":{"name":"steve"}}"#;

    fn headers(secret: &[u8]) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign_body(secret, PAYLOAD.as_bytes())).unwrap(),
        );
        h.insert(EVENT_HEADER, HeaderValue::from_static("push"));
        h.insert(DELIVERY_HEADER, HeaderValue::from_static("72d3162e"));
        h
    }

    #[test]
    fn builds_and_verifies_context() {
        let ctx = WebhookContext::from_request(&headers(b"key"), Bytes::from(PAYLOAD)).unwrap();
        assert_eq!(ctx.delivery_id, "72d3162e");
        assert!(ctx.is_push());
        assert_eq!(ctx.verify(b"key"), Ok(()));
        assert_eq!(ctx.verify(b"other"), Err(AuthError::InvalidSignature));

        let push = ctx.push_event().unwrap();
        assert_eq!(push.repository.full_name, "acme/site");
        assert_eq!(push.git_ref.as_deref(), Some("refs/heads/master"));
        assert_eq!(push.pusher_name(), "steve");
    }

    #[test]
    fn missing_headers_are_named() {
        for name in [SIGNATURE_HEADER, EVENT_HEADER, DELIVERY_HEADER] {
            let mut h = headers(b"key");
            h.remove(name);
            let err = WebhookContext::from_request(&h, Bytes::from(PAYLOAD)).unwrap_err();
            assert_eq!(err, AuthError::MissingHeader(name));
        }

        let mut h = headers(b"key");
        h.insert(EVENT_HEADER, HeaderValue::from_static(""));
        assert_eq!(
            WebhookContext::from_request(&h, Bytes::from(PAYLOAD)).unwrap_err(),
            AuthError::MissingHeader(EVENT_HEADER)
        );
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = WebhookContext::from_request(&headers(b"key"), Bytes::new()).unwrap_err();
        assert_eq!(err, AuthError::MissingBody);
    }

    #[test]
    fn payload_without_repository_fails_to_parse() {
        let ctx =
            WebhookContext::from_request(&headers(b"key"), Bytes::from(r#"{"zen":"hi"}"#)).unwrap();
        assert!(ctx.push_event().is_err());
    }
}
