use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use yatra_core::{Actor, Role};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// One of TRAVELLER, STAFF, ADMIN, SUPER_ADMIN.
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Option<Actor> {
        Role::parse(&self.role).map(|role| Actor::new(self.sub.clone(), role))
    }
}

fn role_claim(role: Role) -> &'static str {
    match role {
        Role::Traveller => "TRAVELLER",
        Role::Staff => "STAFF",
        Role::Admin => "ADMIN",
        Role::SuperAdmin => "SUPER_ADMIN",
    }
}

/// Mint a token for `subject`. Identity and role assignment live outside
/// this service; this is used by tooling and tests.
pub fn issue_token(
    secret: &str,
    subject: &str,
    role: Role,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: subject.to_string(),
        role: role_claim(role).to_string(),
        exp: (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn authenticate(state: &AppState, req: &Request) -> Result<Actor, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    token_data.claims.actor().ok_or(StatusCode::UNAUTHORIZED)
}

/// Any valid token. The resolved `Actor` is injected for handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = authenticate(&state, &req)?;
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

/// Staff tier or above.
pub async fn staff_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = authenticate(&state, &req)?;
    if !actor.is_staff() {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_round_trips_to_actor() {
        let token = issue_token("secret", "staff-7", Role::SuperAdmin, 60).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret("secret".as_bytes()),
            &Validation::default(),
        )
        .unwrap();

        let actor = data.claims.actor().unwrap();
        assert_eq!(actor.id, "staff-7");
        assert_eq!(actor.role, Role::SuperAdmin);
    }

    #[test]
    fn test_unknown_role_has_no_actor() {
        let claims = Claims {
            sub: "x".to_string(),
            role: "PILOT".to_string(),
            exp: 0,
        };
        assert!(claims.actor().is_none());
    }
}
