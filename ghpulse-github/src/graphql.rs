//! GitHub GraphQL response envelope

use serde::Deserialize;

use crate::{Error, Result};

/// GraphQL query response wrapper
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

/// GraphQL error
#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl<T> GraphQlResponse<T> {
    /// The `data` member, or the errors that replaced it
    ///
    /// A `NOT_FOUND` error becomes [`Error::NotFound`] even when partial data
    /// came back, since GitHub then returns the missing object as `null`.
    pub(crate) fn into_data(self) -> Result<T> {
        if let Some(missing) = self
            .errors
            .iter()
            .find(|e| e.kind.as_deref() == Some("NOT_FOUND"))
        {
            return Err(Error::NotFound(missing.message.clone()));
        }

        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(Error::GraphQl(messages.join(", ")));
        }

        self.data
            .ok_or_else(|| Error::GraphQl("response missing data".to_string()))
    }
}

/// Whether a response body reports a GraphQL rate limit
pub(crate) fn is_rate_limited(body: &str) -> bool {
    #[derive(Deserialize)]
    struct ErrorsOnly {
        #[serde(default)]
        errors: Vec<GraphQlError>,
    }

    serde_json::from_str::<ErrorsOnly>(body)
        .map(|r| {
            r.errors
                .iter()
                .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Viewer {
        login: String,
    }

    #[test]
    fn test_data_is_returned() {
        let body: GraphQlResponse<Viewer> =
            serde_json::from_str(r#"{"data":{"login":"octocat"}}"#).unwrap();
        assert_eq!(body.into_data().unwrap().login, "octocat");
    }

    #[test]
    fn test_not_found_error() {
        let body: GraphQlResponse<Viewer> = serde_json::from_str(
            r#"{"data":null,"errors":[{"type":"NOT_FOUND","message":"Could not resolve"}]}"#,
        )
        .unwrap();
        assert!(matches!(body.into_data(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_other_errors_are_joined() {
        let body: GraphQlResponse<Viewer> = serde_json::from_str(
            r#"{"errors":[{"message":"first"},{"message":"second"}]}"#,
        )
        .unwrap();
        match body.into_data() {
            Err(Error::GraphQl(message)) => assert_eq!(message, "first, second"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_rate_limited_detection() {
        assert!(is_rate_limited(
            r#"{"errors":[{"type":"RATE_LIMITED","message":"API rate limit exceeded"}]}"#
        ));
        assert!(!is_rate_limited(r#"{"data":{"login":"octocat"}}"#));
        assert!(!is_rate_limited("not json"));
    }
}
