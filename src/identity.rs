use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

/// The authenticated caller, passed explicitly through the call chain.
///
/// Authentication itself happens upstream; this core only consumes the
/// resulting identity. Exactly one of `user_id` / `guest_id` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: Option<i64>,
    pub guest_id: Option<Uuid>,
    pub role: Role,
}

impl CallerIdentity {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            guest_id: None,
            role: Role::Customer,
        }
    }

    pub fn guest(guest_id: Uuid) -> Self {
        Self {
            user_id: None,
            guest_id: Some(guest_id),
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            guest_id: None,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        let user_id = header("x-user-id")
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    ServiceError::Unauthorized("malformed x-user-id header".to_string())
                })
            })
            .transpose()?;

        let guest_id = header("x-guest-id")
            .map(|raw| {
                Uuid::parse_str(&raw).map_err(|_| {
                    ServiceError::Unauthorized("malformed x-guest-id header".to_string())
                })
            })
            .transpose()?;

        let role = match header("x-role").as_deref() {
            Some("admin") => Role::Admin,
            _ => Role::Customer,
        };

        match (user_id, guest_id) {
            (Some(uid), None) => Ok(Self {
                user_id: Some(uid),
                guest_id: None,
                role,
            }),
            (None, Some(gid)) => {
                if role == Role::Admin {
                    return Err(ServiceError::Unauthorized(
                        "guests cannot hold the admin role".to_string(),
                    ));
                }
                Ok(Self {
                    user_id: None,
                    guest_id: Some(gid),
                    role,
                })
            }
            (Some(_), Some(_)) => Err(ServiceError::Unauthorized(
                "x-user-id and x-guest-id are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ServiceError::Unauthorized(
                "missing caller identity".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<CallerIdentity, ServiceError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CallerIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn user_identity_is_extracted() {
        let caller = extract(&[("x-user-id", "42")]).await.unwrap();
        assert_eq!(caller.user_id, Some(42));
        assert_eq!(caller.role, Role::Customer);
    }

    #[tokio::test]
    async fn guest_and_user_are_mutually_exclusive() {
        let gid = Uuid::new_v4().to_string();
        let result = extract(&[("x-user-id", "42"), ("x-guest-id", &gid)]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        assert!(extract(&[]).await.is_err());
    }

    #[tokio::test]
    async fn guest_cannot_claim_admin() {
        let gid = Uuid::new_v4().to_string();
        let result = extract(&[("x-guest-id", &gid), ("x-role", "admin")]).await;
        assert!(result.is_err());
    }
}
