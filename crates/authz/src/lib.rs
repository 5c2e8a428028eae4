//! Staff authorization.
//!
//! Staff-only handlers take a [`Staff`] argument. The extractor compares the
//! request's bearer token with the configured `auth.staff_token`; with no token
//! configured every staff route is closed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use libris_http::AppError;
use libris_kernel::{settings::AuthSettings, InitCtx, Module};

/// Who may act as staff
#[derive(Debug, Clone, Default)]
pub struct StaffPolicy {
    token: Option<Arc<str>>,
}

impl StaffPolicy {
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let token = settings
            .staff_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Arc::from);
        Self { token }
    }

    pub fn with_token(token: impl AsRef<str>) -> Self {
        Self {
            token: Some(Arc::from(token.as_ref())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Check an `Authorization` header value
    pub fn authorize(&self, authorization: Option<&str>) -> Result<Staff, AppError> {
        let Some(expected) = self.token.as_deref() else {
            return Err(AppError::forbidden("staff access is not configured"));
        };

        let presented = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| AppError::unauthorized("staff credentials required"))?;

        if constant_time_eq::constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(Staff)
        } else {
            Err(AppError::forbidden("staff privileges required"))
        }
    }
}

/// Proof that the request carries staff credentials
#[derive(Debug, Clone, Copy)]
pub struct Staff;

impl<S> FromRequestParts<S> for Staff
where
    StaffPolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = StaffPolicy::from_ref(state);
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let staff = policy.authorize(authorization);
        if staff.is_err() {
            tracing::info!(target: "libris-authz", path = %parts.uri.path(), "staff check failed");
        }
        staff
    }
}

/// Core module reporting the guard's configuration at startup
pub struct AuthzModule {
    policy: StaffPolicy,
}

#[async_trait]
impl Module for AuthzModule {
    fn name(&self) -> &'static str {
        "authz"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if self.policy.is_configured() {
            tracing::info!(target: "libris-authz", "staff token configured");
        } else {
            tracing::warn!(
                target: "libris-authz",
                environment = ?ctx.settings.environment,
                "no staff token configured; staff routes are closed"
            );
        }
        Ok(())
    }
}

pub fn create_module(policy: StaffPolicy) -> Arc<dyn Module> {
    Arc::new(AuthzModule { policy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    #[test]
    fn blank_token_counts_as_unconfigured() {
        let policy = StaffPolicy::from_settings(&AuthSettings {
            staff_token: Some("   ".to_string()),
        });
        assert!(!policy.is_configured());
    }

    #[test]
    fn authorize_distinguishes_missing_and_wrong_tokens() {
        let policy = StaffPolicy::with_token("desk-secret");

        assert!(policy.authorize(Some("Bearer desk-secret")).is_ok());
        assert!(matches!(
            policy.authorize(None),
            Err(AppError::Unauthorized { .. })
        ));
        assert!(matches!(
            policy.authorize(Some("Basic abc")),
            Err(AppError::Unauthorized { .. })
        ));
        assert!(matches!(
            policy.authorize(Some("Bearer guess")),
            Err(AppError::Forbidden { .. })
        ));
    }

    #[test]
    fn near_misses_are_forbidden() {
        let policy = StaffPolicy::with_token("desk-secret");

        for attempt in ["desk-secreT", "desk-secre", "desk-secret-", "xesk-secret", "Bearer"] {
            assert!(
                matches!(
                    policy.authorize(Some(&format!("Bearer {}", attempt))),
                    Err(AppError::Forbidden { .. })
                ),
                "{} accepted",
                attempt
            );
        }
        assert!(policy.authorize(Some("Bearer  desk-secret ")).is_ok());
    }

    #[test]
    fn unconfigured_policy_rejects_everyone() {
        let policy = StaffPolicy::default();
        assert!(matches!(
            policy.authorize(Some("Bearer anything")),
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn extractor_guards_route() {
        let router = Router::new()
            .route("/return", post(|_staff: Staff| async { "returned" }))
            .with_state(StaffPolicy::with_token("desk-secret"));

        let denied = router
            .clone()
            .oneshot(
                Request::post("/return")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .oneshot(
                Request::post("/return")
                    .header(header::AUTHORIZATION, "Bearer desk-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
