use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{unauthorized_error, Error};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

pub const DRIVER: &str = "driver";
pub const PASSENGER: &str = "passenger";
pub const ADMIN: &str = "admin";

/// Caller identity as verified by the identity provider. Nothing here is re-checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: Uuid, roles: &[&str]) -> Self {
        Self {
            id,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn driver(id: Uuid) -> Self {
        Self::new(id, &[DRIVER])
    }

    pub fn passenger(id: Uuid) -> Self {
        Self::new(id, &[PASSENGER])
    }

    pub fn admin(id: Uuid) -> Self {
        Self::new(id, &[ADMIN])
    }

    fn id_equals(&self, id: Uuid) -> bool {
        self.id == id
    }

    pub fn has_role(&self, role: String) -> bool {
        self.roles.iter().any(|x| x == &role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN.into())
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id)
            .add_attribute_getter("roles", |recv: &User| recv.roles.clone())
            .add_method("id_equals", User::id_equals)
            .add_method("has_role", User::has_role)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}

#[async_trait]
impl<B: Send> FromRequest<B> for User {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let headers = req.headers();

        let id = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(unauthorized_error)?;

        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(',')
                    .map(|role| role.trim().to_lowercase())
                    .filter(|role| [DRIVER, PASSENGER, ADMIN].contains(&role.as_str()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if roles.is_empty() {
            tracing::warn!(user_id = %id, "request without a recognised role");
            return Err(unauthorized_error());
        }

        Ok(Self { id, roles })
    }
}
