use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::api::error::ApiError;
use crate::model::{Principal, Role};

/// Axum extractor for the calling principal.
///
/// Authentication happens upstream; the verified identity arrives in
/// request headers:
/// - X-User-Id: required
/// - X-User-Role: admin, subadmin or user (defaults to user)
/// - X-User-Name, X-User-Email, X-Employee-Id: optional
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers)
    }
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let id = extract_header_value(headers, "x-user-id")
        .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?;

    let role = match extract_header_value(headers, "x-user-role") {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?,
        None => Role::User,
    };

    Ok(Principal::with_details(
        id,
        role,
        extract_header_value(headers, "x-user-name"),
        extract_header_value(headers, "x-user-email"),
        extract_header_value(headers, "x-employee-id"),
    ))
}

/// Extract a non-blank header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        headers
    }

    #[test]
    fn test_principal_extraction() {
        let principal = principal_from_headers(&headers(&[
            ("x-user-id", "u-1"),
            ("x-user-role", " SubAdmin "),
            ("x-employee-id", "EMP-9"),
            ("x-user-name", ""),
        ]))
        .unwrap();

        assert_eq!(principal.id, "u-1");
        assert_eq!(principal.role, Role::Subadmin);
        assert_eq!(principal.employee_id.as_deref(), Some("EMP-9"));
        assert_eq!(principal.name, None);
    }

    #[test]
    fn test_missing_role_defaults_to_user() {
        let principal = principal_from_headers(&headers(&[("x-user-id", "u-2")])).unwrap();
        assert_eq!(principal.role, Role::User);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            principal_from_headers(&HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            principal_from_headers(&headers(&[("x-user-id", "u-3"), ("x-user-role", "root")])),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
