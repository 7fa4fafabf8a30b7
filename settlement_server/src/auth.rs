//! Request identity extraction.
//!
//! Authentication happens upstream (the API gateway terminates sessions and forwards a verified identity in
//! headers); this server is responsible for authorization only. `AuthenticatedUser` is the extractor that makes the
//! forwarded identity available to handlers, and refuses requests that arrive without one.

use std::str::FromStr;

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub roles: Vec<Role>,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    /// Admins may act on anyone's behalf; everyone else only on their own.
    pub fn require_self_or_admin(&self, owner_id: &str) -> Result<(), ServerError> {
        if self.id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions(format!("{} may not act for {owner_id}", self.id)))
        }
    }

    pub fn require_admin(&self) -> Result<(), ServerError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions("administrator role required".to_string()))
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_user(req))
    }
}

fn extract_user(req: &HttpRequest) -> Result<AuthenticatedUser, ServerError> {
    let id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::AuthenticationError("no authenticated identity on the request".to_string()))?
        .to_string();
    let roles = req
        .headers()
        .get(USER_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').filter_map(|r| Role::from_str(r).ok()).collect())
        .unwrap_or_else(|| vec![Role::User]);
    Ok(AuthenticatedUser { id, roles })
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn identity_headers_are_parsed() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "dev_42"))
            .insert_header((USER_ROLES_HEADER, "user, admin"))
            .to_http_request();
        let user = extract_user(&req).unwrap();
        assert_eq!(user.id, "dev_42");
        assert!(user.is_admin());
        assert!(user.require_self_or_admin("someone_else").is_ok());
    }

    #[test]
    fn missing_identity_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(extract_user(&req), Err(ServerError::AuthenticationError(_))));
    }

    #[test]
    fn plain_users_cannot_act_for_others() {
        let req = TestRequest::default().insert_header((USER_ID_HEADER, "dev_1")).to_http_request();
        let user = extract_user(&req).unwrap();
        assert!(!user.is_admin());
        assert!(user.require_self_or_admin("dev_1").is_ok());
        assert!(user.require_self_or_admin("dev_2").is_err());
        assert!(user.require_admin().is_err());
    }
}
