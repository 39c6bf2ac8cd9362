//! Private saved-post lists. Order is bookmark order; adding twice keeps the
//! first position.

use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::Session;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, parse_body};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{Post, PostView, User};
use crate::posts::{load_post, Expander};
use crate::users::load_user;

fn modify_bookmarks(
    store: &dyn KvStore,
    user_id: &str,
    f: impl FnOnce(&mut Vec<String>),
) -> Result<Vec<String>, ApiError> {
    store
        .modify_json(&user_key(user_id), |user: &mut User| {
            f(&mut user.bookmarked_posts);
            Ok::<_, ApiError>(user.bookmarked_posts.clone())
        })?
        .ok_or_else(|| ApiError::not_found("User"))
}

pub fn add_bookmark(store: &dyn KvStore, user_id: &str, post_id: &str) -> Result<Vec<String>, ApiError> {
    load_post(store, post_id)?;
    let ids = modify_bookmarks(store, user_id, |ids| {
        if !ids.iter().any(|id| id == post_id) {
            ids.push(post_id.to_string());
        }
    })?;
    info!(user_id, post_id, "bookmark added");
    Ok(ids)
}

/// Removing a post that is not bookmarked is a no-op. The post itself does
/// not have to exist any more.
pub fn remove_bookmark(store: &dyn KvStore, user_id: &str, post_id: &str) -> Result<Vec<String>, ApiError> {
    let ids = modify_bookmarks(store, user_id, |ids| ids.retain(|id| id != post_id))?;
    info!(user_id, post_id, "bookmark removed");
    Ok(ids)
}

pub fn bookmark_ids(store: &dyn KvStore, user_id: &str) -> Result<Vec<String>, ApiError> {
    Ok(load_user(store, user_id)?.bookmarked_posts)
}

/// Bookmarked posts in bookmark order. Deleted posts are skipped.
pub fn list_bookmarks(store: &dyn KvStore, user_id: &str) -> Result<Vec<PostView>, ApiError> {
    let ids = bookmark_ids(store, user_id)?;
    let mut expander = Expander::new(store);
    let mut views = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(post) = store.get_json::<Post>(&post_key(&id))? {
            views.push(expander.post(&post)?);
        }
    }
    Ok(views)
}

// === HTTP Handlers ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookmarkRequest {
    #[serde(default)]
    post_id: String,
}

fn parse_post_id(req: &Request) -> Result<String, ApiError> {
    let body: BookmarkRequest = parse_body(req)?;
    let post_id = body.post_id.trim();
    if post_id.is_empty() {
        return Err(ApiError::Validation("postId is required".to_string()));
    }
    Ok(post_id.to_string())
}

pub fn handle_list_bookmarks(store: &dyn KvStore, session: &Session, user_id: &str) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    json_response(200, &list_bookmarks(store, user_id)?)
}

pub fn handle_bookmark_ids(store: &dyn KvStore, session: &Session, user_id: &str) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    json_response(200, &bookmark_ids(store, user_id)?)
}

pub fn handle_add_bookmark(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
    req: &Request,
) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    let post_id = parse_post_id(req)?;
    json_response(200, &add_bookmark(store, user_id, &post_id)?)
}

pub fn handle_remove_bookmark(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
    req: &Request,
) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    let post_id = parse_post_id(req)?;
    json_response(200, &remove_bookmark(store, user_id, &post_id)?)
}
