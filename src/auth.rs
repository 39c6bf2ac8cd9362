use chrono::{Duration, Utc};
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, parse_body, validate_uuid, verify_password};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{TokenData, User};

/// Credential resolved from a request's bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

impl Session {
    /// Fails with `Forbidden` unless the session belongs to `user_id`.
    pub fn require_owner(&self, user_id: &str) -> Result<(), ApiError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    let auth_header = req.header("authorization")?.as_str()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn authenticate(
    store: &dyn KvStore,
    settings: &Settings,
    req: &Request,
) -> Result<Session, ApiError> {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    let data: TokenData = store
        .get_json(&token_key(token))?
        .ok_or(ApiError::Unauthorized)?;

    if is_expired(&data, settings) {
        warn!(user_id = %data.user_id, "rejected expired token");
        forget_token(store, token, &data.user_id)?;
        return Err(ApiError::Unauthorized);
    }

    // Tokens of deleted accounts die with the account.
    if store.get_json::<User>(&user_key(&data.user_id))?.is_none() {
        return Err(ApiError::Unauthorized);
    }

    Ok(Session {
        user_id: data.user_id,
        token: token.to_string(),
    })
}

fn is_expired(data: &TokenData, settings: &Settings) -> bool {
    Utc::now() - data.created_at > Duration::hours(settings.token_expiration_hours)
}

/// Drops one token record and its entry in the owner's token list.
fn forget_token(store: &dyn KvStore, token: &str, user_id: &str) -> Result<(), ApiError> {
    store.delete(&token_key(token))?;
    store.upsert_json(&user_tokens_key(user_id), |tokens: &mut Vec<String>| {
        tokens.retain(|t| t != token);
    })?;
    Ok(())
}

/// Forgets every expired or dangling token of `user_id`.
pub fn prune_expired_tokens(store: &dyn KvStore, settings: &Settings, user_id: &str) -> Result<(), ApiError> {
    let tokens: Vec<String> = store
        .get_json(&user_tokens_key(user_id))?
        .unwrap_or_default();
    for token in &tokens {
        match store.get_json::<TokenData>(&token_key(token))? {
            Some(data) if !is_expired(&data, settings) => {}
            _ => forget_token(store, token, user_id)?,
        }
    }
    Ok(())
}

pub fn issue_token(store: &dyn KvStore, user_id: &str) -> Result<String, ApiError> {
    let token = new_id();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: Utc::now(),
    };
    store.set_json(&token_key(&token), &data)?;
    store.upsert_json(&user_tokens_key(user_id), |tokens: &mut Vec<String>| {
        tokens.push(token.clone());
    })?;
    Ok(token)
}

/// Deletes every token issued to `user_id`.
pub fn revoke_tokens(store: &dyn KvStore, user_id: &str) -> Result<(), ApiError> {
    let tokens: Vec<String> = store
        .get_json(&user_tokens_key(user_id))?
        .unwrap_or_default();
    for token in &tokens {
        store.delete(&token_key(token))?;
    }
    store.delete(&user_tokens_key(user_id))?;
    Ok(())
}

#[derive(Deserialize)]
struct SigninRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub struct SignedIn {
    pub token: String,
    pub user: User,
}

pub fn signin(
    store: &dyn KvStore,
    settings: &Settings,
    email: &str,
    password: &str,
) -> Result<SignedIn, ApiError> {
    let user_id: Option<String> = store.get_json(&email_key(email.trim()))?;
    let user = match user_id {
        Some(id) if validate_uuid(&id) => store.get_json::<User>(&user_key(&id))?,
        _ => None,
    };

    match user {
        Some(user) if verify_password(password, &user.password) => {
            prune_expired_tokens(store, settings, &user.id)?;
            let token = issue_token(store, &user.id)?;
            info!(user_id = %user.id, "signed in");
            Ok(SignedIn { token, user })
        }
        _ => {
            warn!("rejected sign-in attempt");
            Err(ApiError::Unauthorized)
        }
    }
}

pub fn signout(store: &dyn KvStore, token: &str) -> Result<(), ApiError> {
    let key = token_key(token);
    if let Some(data) = store.get_json::<TokenData>(&key)? {
        forget_token(store, token, &data.user_id)?;
        info!(user_id = %data.user_id, "signed out");
    }
    Ok(())
}

// === HTTP Handlers ===

pub fn handle_signin(store: &dyn KvStore, settings: &Settings, req: &Request) -> Result<Response, ApiError> {
    let creds: SigninRequest = parse_body(req)?;
    let signed_in = signin(store, settings, &creds.email, &creds.password)?;
    let user = &signed_in.user;

    json_response(
        200,
        &serde_json::json!({
            "token": signed_in.token,
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
            },
        }),
    )
}

pub fn handle_signout(store: &dyn KvStore, req: &Request) -> Result<Response, ApiError> {
    if let Some(token) = bearer_token(req) {
        signout(store, token)?;
    }
    json_response(200, &serde_json::json!({ "message": "Signed out" }))
}
