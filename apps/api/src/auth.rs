use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::AppError;

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";
const TENANT_ID_HEADER: &str = "x-tenant-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Agent,
    Customer,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "AGENT" => Ok(Role::Agent),
            "CUSTOMER" => Ok(Role::Customer),
            _ => Err(()),
        }
    }
}

/// Caller identity as resolved by the upstream auth gateway.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub tenant_id: Uuid,
}

impl Actor {
    /// Manual routing of leads is limited to admins and managers.
    pub fn require_manager(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin | Role::Manager => Ok(()),
            Role::Agent | Role::Customer => Err(AppError::Forbidden),
        }
    }

    /// The caller's own account id when it acts as a customer.
    pub fn customer_id(&self) -> Option<Uuid> {
        (self.role == Role::Customer).then_some(self.id)
    }
}

fn header<T: FromStr>(parts: &Parts, name: &str) -> Result<T, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<T>().ok())
        .ok_or(AppError::Unauthorized)
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor {
            id: header(parts, ACTOR_ID_HEADER)?,
            role: header(parts, ACTOR_ROLE_HEADER)?,
            tenant_id: header(parts, TENANT_ID_HEADER)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Actor, AppError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_is_read_from_gateway_headers() {
        let (id, tenant) = (Uuid::new_v4(), Uuid::new_v4());
        let actor = extract(
            Request::builder()
                .header(ACTOR_ID_HEADER, id.to_string())
                .header(ACTOR_ROLE_HEADER, "manager")
                .header(TENANT_ID_HEADER, tenant.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(actor.id, id);
        assert_eq!(actor.role, Role::Manager);
        assert_eq!(actor.tenant_id, tenant);
        assert!(actor.require_manager().is_ok());
    }

    #[tokio::test]
    async fn test_missing_tenant_is_unauthorized() {
        let result = extract(
            Request::builder()
                .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
                .header(ACTOR_ROLE_HEADER, "ADMIN"),
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_agents_cannot_route_leads_manually() {
        let actor = Actor {
            id: Uuid::new_v4(),
            role: Role::Agent,
            tenant_id: Uuid::new_v4(),
        };
        assert!(matches!(actor.require_manager(), Err(AppError::Forbidden)));
        assert_eq!(actor.customer_id(), None);
    }

    #[test]
    fn test_customer_acts_as_itself() {
        let actor = Actor {
            id: Uuid::new_v4(),
            role: Role::Customer,
            tenant_id: Uuid::new_v4(),
        };
        assert_eq!(actor.customer_id(), Some(actor.id));
    }
}
