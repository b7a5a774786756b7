//! Event types forwarded to the barrier.
//!
//! An [`Event`] describes one intercepted request. The shape is chosen by the
//! caller through an [`EventKind`], and each shape serializes to a flat JSON
//! object whose keys are the record's attribute names.
//!
//! # Example
//!
//! ```json
//! {
//!   "Ip": "10.0.0.5",
//!   "Path": "/orders",
//!   "Method": "GET",
//!   "Token": "tok123"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects which event shape the extractor builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// API access: client IP, path, method and access token
    Api,
    /// Authentication: client IP and client identifier
    Auth,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Api => "api",
            EventKind::Auth => "auth",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one call to an API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ApiEndpointLog {
    /// Client IP address as resolved by the host
    pub ip: String,

    /// Matched route path (e.g. "/orders/{id}")
    pub path: String,

    /// HTTP method
    pub method: String,

    /// Access token carried by the caller
    pub token: String,
}

/// Record of one authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AuthLog {
    /// Client IP address as resolved by the host
    pub ip: String,

    /// Client identifier, empty when the caller did not send one
    pub client: String,
}

/// An event forwarded to the barrier.
///
/// Serialized untagged: the JSON body carries only the variant's own fields,
/// so the barrier tells the shapes apart by their keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Api(ApiEndpointLog),
    Auth(AuthLog),
}

impl Event {
    /// Build an API access event
    pub fn api(
        ip: impl Into<String>,
        path: impl Into<String>,
        method: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Event::Api(ApiEndpointLog {
            ip: ip.into(),
            path: path.into(),
            method: method.into(),
            token: token.into(),
        })
    }

    /// Build an authentication event
    pub fn auth(ip: impl Into<String>, client: impl Into<String>) -> Self {
        Event::Auth(AuthLog {
            ip: ip.into(),
            client: client.into(),
        })
    }

    /// The discriminant of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Api(_) => EventKind::Api,
            Event::Auth(_) => EventKind::Auth,
        }
    }

    /// Client IP, present on every shape
    pub fn ip(&self) -> &str {
        match self {
            Event::Api(log) => &log.ip,
            Event::Auth(log) => &log.ip,
        }
    }
}

impl From<ApiEndpointLog> for Event {
    fn from(log: ApiEndpointLog) -> Self {
        Event::Api(log)
    }
}

impl From<AuthLog> for Event {
    fn from(log: AuthLog) -> Self {
        Event::Auth(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_api_event_serialize() {
        let event = Event::api("10.0.0.5", "/orders", "GET", "tok123");

        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "Ip": "10.0.0.5",
                "Path": "/orders",
                "Method": "GET",
                "Token": "tok123"
            })
        );
    }

    #[test]
    fn test_auth_event_serialize() {
        let event = Event::auth("192.168.1.1", "mobile-app");

        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"Ip": "192.168.1.1", "Client": "mobile-app"}));
    }

    #[test]
    fn test_event_deserialize_picks_shape_by_keys() {
        let api: Event = serde_json::from_str(
            r#"{"Ip":"1.2.3.4","Path":"/x","Method":"POST","Token":"t"}"#,
        )
        .unwrap();
        assert_eq!(api.kind(), EventKind::Api);

        let auth: Event = serde_json::from_str(r#"{"Ip":"1.2.3.4","Client":""}"#).unwrap();
        assert_eq!(auth.kind(), EventKind::Auth);
        assert_eq!(auth.ip(), "1.2.3.4");
    }

    #[test]
    fn test_event_round_trip() {
        let events = [
            Event::api("::1", "/users/{id}", "DELETE", "a\"quoted\"token"),
            Event::auth("10.0.0.1", "ünïcode-client"),
            Event::auth("", ""),
        ];

        for event in events {
            let bytes = serde_json::to_vec(&event).unwrap();
            let decoded: Event = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let result: Result<Event, _> =
            serde_json::from_str(r#"{"ip":"1.2.3.4","client":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::Api.to_string(), "api");
        assert_eq!(EventKind::Auth.to_string(), "auth");
    }
}
