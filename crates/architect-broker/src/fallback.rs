// File: architect-broker/src/fallback.rs
// Purpose: Responses synthesized when neither network nor cache can answer

use http::StatusCode;
use serde_json::{json, Value};

use crate::policy::{api_relative, segment_prefix};
use crate::request::BrokerResponse;

/// Body of the synthesized 503 for non-HTML reads
pub const OFFLINE_TEXT: &str = "Offline: resource not available";

/// Generic message for API reads without a dedicated fallback
pub const OFFLINE_API_MESSAGE: &str =
    "You are currently offline. Some features may be limited until your connection is restored.";

/// Message attached to optimistic acknowledgements of queued writes
pub const QUEUED_MESSAGE: &str =
    "Your action has been saved and will be synchronized when you are back online.";

/// Shape of the offline payload for an API read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFallback {
    Techniques,
    Exercises,
    Profile,
    Generic,
}

/// Path pattern → payload, checked in order. Patterns are relative to the
/// API prefix and match on a path-segment boundary.
pub const FALLBACK_ROUTES: &[(&str, ApiFallback)] = &[
    ("techniques", ApiFallback::Techniques),
    ("exercises", ApiFallback::Exercises),
    ("user/profile", ApiFallback::Profile),
];

impl ApiFallback {
    /// Pick the fallback for a request path under `api_prefix`
    pub fn for_path(api_prefix: &str, path: &str) -> Self {
        let Some(rest) = api_relative(api_prefix, path) else {
            return Self::Generic;
        };

        FALLBACK_ROUTES
            .iter()
            .find(|(pattern, _)| segment_prefix(rest, pattern))
            .map(|(_, fallback)| *fallback)
            .unwrap_or(Self::Generic)
    }

    pub fn payload(self) -> Value {
        match self {
            Self::Techniques => json!({
                "offline": true,
                "techniques": [
                    {
                        "id": "reframing",
                        "name": "Reframing",
                        "description": "Change the meaning of a situation by looking at it from a different perspective."
                    },
                    {
                        "id": "anchoring",
                        "name": "Anchoring",
                        "description": "Link a resourceful emotional state to a physical or mental trigger."
                    },
                    {
                        "id": "pattern_interruption",
                        "name": "Pattern Interruption",
                        "description": "Break an unhelpful habitual thought or behavior sequence."
                    }
                ]
            }),
            Self::Exercises => json!({
                "offline": true,
                "exercises": [
                    {
                        "id": "reframing_basics",
                        "technique": "reframing",
                        "title": "Reframing Basics",
                        "description": "Rewrite one limiting thought from today in a more resourceful way."
                    },
                    {
                        "id": "anchor_calm",
                        "technique": "anchoring",
                        "title": "Anchor a Calm State",
                        "description": "Recall a calm memory and pair it with a simple gesture."
                    }
                ]
            }),
            Self::Profile => json!({
                "offline": true,
                "profile": {
                    "username": "Offline User",
                    "email": null,
                    "preferences": {},
                    "progress": {}
                }
            }),
            Self::Generic => json!({
                "offline": true,
                "message": OFFLINE_API_MESSAGE
            }),
        }
    }

    pub fn response(self) -> BrokerResponse {
        BrokerResponse::json(StatusCode::OK, &self.payload()).offline_fallback()
    }
}

/// 503 with a fixed plain-text body
pub fn service_unavailable() -> BrokerResponse {
    BrokerResponse::text(StatusCode::SERVICE_UNAVAILABLE, OFFLINE_TEXT).offline_fallback()
}

/// Acknowledgement for a write that was queued instead of delivered
pub fn queued_acknowledgement(queued_id: i64) -> BrokerResponse {
    BrokerResponse::json(
        StatusCode::OK,
        &json!({
            "success": true,
            "offline": true,
            "message": QUEUED_MESSAGE,
            "queued_id": queued_id
        }),
    )
    .offline_fallback()
}

/// Minimal page used when the offline page itself is not cached
pub fn bare_offline_page() -> BrokerResponse {
    BrokerResponse::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
         <body><h1>You are offline</h1><p>Please check your connection and try again.</p></body></html>",
    )
    .with_header(http::header::CONTENT_TYPE, "text/html; charset=utf-8")
    .offline_fallback()
}
