use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::{issue_token, revoke_tokens, Session};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{
    hash_password, json_response, new_id, parse_body, sanitize_text, PhotoUpload,
};
use crate::core::store::{KvStore, KvStoreExt, Write};
use crate::models::models::{Connection, PhotoMeta, Profile, User, UserListing, UserSummary};

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Regex should compile"))
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = sanitize_text(name.trim());
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::Validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name)
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }
    if !email_regex().is_match(&email) {
        return Err(ApiError::Validation("Please fill a valid email address".to_string()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::Validation("Password is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn validate_about(about: &str) -> Result<String, ApiError> {
    if about.chars().count() > MAX_ABOUT_LENGTH {
        return Err(ApiError::Validation(format!(
            "About must be at most {} characters",
            MAX_ABOUT_LENGTH
        )));
    }
    Ok(sanitize_text(about.trim()))
}

/// Claims `email` for `user_id`. The index key is written under `update`, so
/// two signups racing for one address cannot both win.
fn reserve_email(store: &dyn KvStore, email: &str, user_id: &str) -> Result<(), ApiError> {
    let mut taken = false;
    store.update(&email_key(email), &mut |current: Option<Vec<u8>>| -> anyhow::Result<Write> {
        if current.is_some() {
            taken = true;
            return Ok(Write::Keep);
        }
        Ok(Write::Put(serde_json::to_vec(user_id)?))
    })?;
    if taken {
        return Err(ApiError::Duplicate("Email is already registered".to_string()));
    }
    Ok(())
}

/// Drops the index entry for `email` if it still points at `user_id`.
fn release_email(store: &dyn KvStore, email: &str, user_id: &str) -> Result<(), ApiError> {
    store.update(&email_key(email), &mut |current: Option<Vec<u8>>| -> anyhow::Result<Write> {
        let owner: Option<String> = match current {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => None,
        };
        Ok(match owner {
            Some(owner) if owner == user_id => Write::Delete,
            _ => Write::Keep,
        })
    })?;
    Ok(())
}

pub fn load_user(store: &dyn KvStore, user_id: &str) -> Result<User, ApiError> {
    store
        .get_json::<User>(&user_key(user_id))?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Summary of `id`, or a tombstone when the account no longer exists.
pub fn resolve_summary(store: &dyn KvStore, id: &str) -> Result<UserSummary, ApiError> {
    Ok(store
        .get_json::<User>(&user_key(id))?
        .map(|user| UserSummary::from(&user))
        .unwrap_or_else(|| UserSummary::tombstone(id)))
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub fn create_user(store: &dyn KvStore, new_user: &NewUser) -> Result<User, ApiError> {
    let name = validate_name(&new_user.name)?;
    let email = validate_email(&new_user.email)?;
    validate_password(&new_user.password)?;

    let id = new_id();
    reserve_email(store, &email, &id)?;

    let user = User {
        id: id.clone(),
        name,
        email,
        password: hash_password(&new_user.password)?,
        about: String::new(),
        photo: None,
        created: Utc::now(),
        updated: None,
        following: Default::default(),
        followers: Default::default(),
        bookmarked_posts: Vec::new(),
    };

    store.set_json(&user_key(&id), &user)?;
    store.upsert_json(USERS_LIST_KEY, |users: &mut Vec<String>| {
        if !users.contains(&id) {
            users.push(id.clone());
        }
    })?;

    info!(user_id = %id, "user created");
    Ok(user)
}

fn connections<'a>(
    store: &dyn KvStore,
    ids: impl IntoIterator<Item = &'a String>,
) -> Result<Vec<Connection>, ApiError> {
    let mut out = Vec::new();
    for id in ids {
        if let Some(user) = store.get_json::<User>(&user_key(id))? {
            out.push(Connection::from(&user));
        }
    }
    Ok(out)
}

pub fn profile_of(store: &dyn KvStore, user: &User) -> Result<Profile, ApiError> {
    Ok(Profile {
        id: user.id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        about: user.about.clone(),
        has_photo: user.photo.is_some(),
        created: user.created,
        updated: user.updated,
        following: connections(store, &user.following)?,
        followers: connections(store, &user.followers)?,
    })
}

pub fn get_user(store: &dyn KvStore, user_id: &str) -> Result<Profile, ApiError> {
    let user = load_user(store, user_id)?;
    profile_of(store, &user)
}

/// Users in directory order, skipping ids that no longer resolve.
pub fn all_users(store: &dyn KvStore) -> Result<Vec<User>, ApiError> {
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = store.get_json::<User>(&user_key(&id))? {
            users.push(user);
        }
    }
    Ok(users)
}

pub fn list_users(store: &dyn KvStore) -> Result<Vec<UserListing>, ApiError> {
    Ok(all_users(store)?.iter().map(UserListing::from).collect())
}

pub fn list_users_excluding(
    store: &dyn KvStore,
    excluded: &[String],
) -> Result<Vec<UserListing>, ApiError> {
    Ok(all_users(store)?
        .iter()
        .filter(|user| !excluded.contains(&user.id))
        .map(UserListing::from)
        .collect())
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub about: Option<String>,
    pub password: Option<String>,
    pub photo: Option<PhotoUpload>,
}

pub struct UpdatedUser {
    pub profile: Profile,
    /// Fresh token when the password changed; older tokens are revoked.
    pub token: Option<String>,
}

pub fn update_user(
    store: &dyn KvStore,
    user_id: &str,
    patch: &UserPatch,
    session: &Session,
) -> Result<UpdatedUser, ApiError> {
    session.require_owner(user_id)?;
    let current = load_user(store, user_id)?;

    let name = patch.name.as_deref().map(validate_name).transpose()?;
    let email = patch.email.as_deref().map(validate_email).transpose()?;
    let about = patch.about.as_deref().map(validate_about).transpose()?;
    let password = match patch.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let photo = patch.photo.as_ref().map(|p| p.decode().map(|bytes| (p, bytes))).transpose()?;

    let new_email = email.filter(|e| *e != current.email);
    if let Some(email) = &new_email {
        reserve_email(store, email, user_id)?;
    }
    if let Some((_, bytes)) = &photo {
        store.set(&user_photo_key(user_id), bytes)?;
    }

    let password_changed = password.is_some();
    let updated = store.modify_json(&user_key(user_id), |user: &mut User| {
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(email) = &new_email {
            user.email = email.clone();
        }
        if let Some(about) = about {
            user.about = about;
        }
        if let Some(password) = password {
            user.password = password;
        }
        if let Some((upload, _)) = &photo {
            user.photo = Some(PhotoMeta {
                content_type: upload.content_type.clone(),
            });
        }
        user.updated = Some(Utc::now());
        Ok::<_, ApiError>(user.clone())
    })?;
    let Some(updated) = updated else {
        // Deleted between the load and the write.
        if let Some(email) = &new_email {
            release_email(store, email, user_id)?;
        }
        return Err(ApiError::not_found("User"));
    };

    if new_email.is_some() {
        release_email(store, &current.email, user_id)?;
    }

    let token = if password_changed {
        revoke_tokens(store, user_id)?;
        Some(issue_token(store, user_id)?)
    } else {
        None
    };

    info!(user_id, password_changed, "user updated");
    Ok(UpdatedUser {
        profile: profile_of(store, &updated)?,
        token,
    })
}

/// Removes the account. Posts, comments and likes by the user stay behind
/// and resolve to a tombstone author.
pub fn delete_user(
    store: &dyn KvStore,
    user_id: &str,
    session: &Session,
) -> Result<UserListing, ApiError> {
    session.require_owner(user_id)?;
    let user = load_user(store, user_id)?;

    store.delete(&user_key(user_id))?;
    store.upsert_json(USERS_LIST_KEY, |users: &mut Vec<String>| {
        users.retain(|id| id != user_id);
    })?;
    release_email(store, &user.email, user_id)?;
    store.delete(&user_photo_key(user_id))?;
    revoke_tokens(store, user_id)?;

    info!(user_id, "user deleted");
    Ok(UserListing::from(&user))
}

// === HTTP Handlers ===

pub fn handle_create_user(store: &dyn KvStore, req: &Request) -> Result<Response, ApiError> {
    let new_user: NewUser = parse_body(req)?;
    let user = create_user(store, &new_user)?;
    json_response(201, &UserListing::from(&user))
}

pub fn handle_list_users(store: &dyn KvStore) -> Result<Response, ApiError> {
    json_response(200, &list_users(store)?)
}

pub fn handle_get_user(store: &dyn KvStore, user_id: &str) -> Result<Response, ApiError> {
    json_response(200, &get_user(store, user_id)?)
}

pub fn handle_update_user(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
    req: &Request,
) -> Result<Response, ApiError> {
    let patch: UserPatch = parse_body(req)?;
    let updated = update_user(store, user_id, &patch, session)?;

    let mut body = serde_json::to_value(&updated.profile)?;
    if let Some(token) = updated.token {
        body["token"] = serde_json::Value::String(token);
    }
    json_response(200, &body)
}

pub fn handle_delete_user(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
) -> Result<Response, ApiError> {
    json_response(200, &delete_user(store, user_id, session)?)
}
