//! Likes and comments. Any signed-in user may like or comment on any post;
//! only a comment's author may remove it.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};

use crate::auth::Session;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, parse_body, sanitize_text};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{Comment, Post, PostView, UserSummary};
use crate::posts::{load_post, Expander};

#[derive(Serialize, Deserialize, Debug)]
pub struct Likes {
    pub likes: BTreeSet<String>,
}

fn modify_post<R>(
    store: &dyn KvStore,
    post_id: &str,
    f: impl FnOnce(&mut Post) -> Result<R, ApiError>,
) -> Result<R, ApiError> {
    store
        .modify_json(&post_key(post_id), f)?
        .ok_or_else(|| ApiError::not_found("Post"))
}

/// Adds `user_id` to the post's likes. Liking twice leaves one entry.
pub fn like(store: &dyn KvStore, user_id: &str, post_id: &str) -> Result<Likes, ApiError> {
    let likes = modify_post(store, post_id, |post| {
        if !post.likes.insert(user_id.to_string()) {
            debug!(user_id, post_id, "already liked");
        }
        Ok(post.likes.clone())
    })?;
    Ok(Likes { likes })
}

/// Removes `user_id` from the post's likes; a no-op when it was not there.
pub fn unlike(store: &dyn KvStore, user_id: &str, post_id: &str) -> Result<Likes, ApiError> {
    let likes = modify_post(store, post_id, |post| {
        post.likes.remove(user_id);
        Ok(post.likes.clone())
    })?;
    Ok(Likes { likes })
}

fn validate_comment(text: &str) -> Result<String, ApiError> {
    let text = sanitize_text(text.trim());
    if text.is_empty() {
        return Err(ApiError::Validation("Comment text is required".to_string()));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(text)
}

/// Appends a comment and returns the post with comment authors expanded.
pub fn comment(store: &dyn KvStore, user_id: &str, post_id: &str, text: &str) -> Result<PostView, ApiError> {
    let text = validate_comment(text)?;
    let comment = Comment {
        id: new_id(),
        text,
        created: Utc::now(),
        posted_by: user_id.to_string(),
    };
    let comment_id = comment.id.clone();

    let post = modify_post(store, post_id, |post| {
        post.comments.push(comment);
        Ok(post.clone())
    })?;

    info!(post_id, comment_id = %comment_id, user_id, "comment added");
    Expander::new(store).post(&post)
}

/// Removes the comment `comment_id` if `user_id` wrote it. A comment that is
/// already gone counts as removed.
pub fn uncomment(
    store: &dyn KvStore,
    user_id: &str,
    post_id: &str,
    comment_id: &str,
) -> Result<PostView, ApiError> {
    let post = modify_post(store, post_id, |post| {
        if let Some(existing) = post.comments.iter().find(|c| c.id == comment_id) {
            if existing.posted_by != user_id {
                return Err(ApiError::Forbidden);
            }
        }
        post.comments.retain(|c| c.id != comment_id);
        Ok(post.clone())
    })?;

    info!(post_id, comment_id, user_id, "comment removed");
    Expander::new(store).post(&post)
}

pub fn list_likers(store: &dyn KvStore, post_id: &str) -> Result<Vec<UserSummary>, ApiError> {
    let post = load_post(store, post_id)?;
    let mut expander = Expander::new(store);
    post.likes.iter().map(|id| expander.summary(id)).collect()
}

// === HTTP Handlers ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRef {
    user_id: Option<String>,
    #[serde(default)]
    post_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    #[serde(default)]
    post_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UncommentRequest {
    #[serde(default)]
    post_id: String,
    #[serde(default)]
    comment_id: String,
}

fn required(value: &str, what: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} is required", what)));
    }
    Ok(value.to_string())
}

fn parse_post_ref(session: &Session, req: &Request) -> Result<String, ApiError> {
    let body: PostRef = parse_body(req)?;
    if let Some(user_id) = &body.user_id {
        session.require_owner(user_id)?;
    }
    required(&body.post_id, "postId")
}

pub fn handle_like(store: &dyn KvStore, session: &Session, req: &Request) -> Result<Response, ApiError> {
    let post_id = parse_post_ref(session, req)?;
    json_response(200, &like(store, &session.user_id, &post_id)?)
}

pub fn handle_unlike(store: &dyn KvStore, session: &Session, req: &Request) -> Result<Response, ApiError> {
    let post_id = parse_post_ref(session, req)?;
    json_response(200, &unlike(store, &session.user_id, &post_id)?)
}

pub fn handle_comment(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
    req: &Request,
) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    let body: CommentRequest = parse_body(req)?;
    let post_id = required(&body.post_id, "postId")?;
    json_response(200, &comment(store, user_id, &post_id, &body.text)?)
}

pub fn handle_uncomment(store: &dyn KvStore, session: &Session, req: &Request) -> Result<Response, ApiError> {
    let body: UncommentRequest = parse_body(req)?;
    let post_id = required(&body.post_id, "postId")?;
    let comment_id = required(&body.comment_id, "commentId")?;
    json_response(200, &uncomment(store, &session.user_id, &post_id, &comment_id)?)
}

pub fn handle_list_likers(store: &dyn KvStore, post_id: &str) -> Result<Response, ApiError> {
    json_response(200, &list_likers(store, post_id)?)
}
