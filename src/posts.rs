use std::collections::HashMap;
use std::sync::OnceLock;

use ammonia::Builder;
use chrono::Utc;
use html_escape::encode_double_quoted_attribute;
use regex::Regex;
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::Session;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, parse_body, PhotoUpload};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{CommentView, PhotoMeta, Post, PostView, UserSummary};
use crate::users::{load_user, resolve_summary};

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("Regex should compile"))
}

/// Sanitized text escapes stray `<`, so an unclosed one opens a tag.
fn inside_tag(before: &str) -> bool {
    match (before.rfind('<'), before.rfind('>')) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

fn inside_link(before: &str) -> bool {
    match (before.rfind("<a "), before.rfind("</a>")) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

fn filter_post_content(content: &str) -> String {
    // Sanitize HTML to remove dangerous scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    // Bare URLs become links. URLs in attributes or existing link text are left alone.
    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let url = &caps[0];
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let before = &clean[..start];
            if inside_tag(before) || inside_link(before) {
                return url.to_string();
            }
            let escaped_url = encode_double_quoted_attribute(url);
            format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
        })
        .to_string()
}

fn validate_text(text: &str) -> Result<String, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("Text is required".to_string()));
    }
    if text.chars().count() > MAX_POST_LENGTH {
        return Err(ApiError::Validation(format!(
            "Text must be at most {} characters",
            MAX_POST_LENGTH
        )));
    }
    Ok(filter_post_content(text))
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(default)]
    pub text: String,
    pub photo: Option<PhotoUpload>,
}

pub fn load_post(store: &dyn KvStore, post_id: &str) -> Result<Post, ApiError> {
    store
        .get_json::<Post>(&post_key(post_id))?
        .ok_or_else(|| ApiError::not_found("Post"))
}

pub fn create_post(store: &dyn KvStore, author_id: &str, new_post: &NewPost) -> Result<Post, ApiError> {
    load_user(store, author_id)?;
    let text = validate_text(&new_post.text)?;
    let photo = new_post.photo.as_ref().map(|p| p.decode().map(|bytes| (p, bytes))).transpose()?;

    let id = new_id();
    if let Some((_, bytes)) = &photo {
        store.set(&post_photo_key(&id), bytes)?;
    }

    let post = Post {
        id: id.clone(),
        text,
        photo: photo.map(|(upload, _)| PhotoMeta {
            content_type: upload.content_type.clone(),
        }),
        posted_by: author_id.to_string(),
        created: Utc::now(),
        likes: Default::default(),
        comments: Vec::new(),
    };

    store.set_json(&post_key(&id), &post)?;
    store.upsert_json(POSTS_LIST_KEY, |posts: &mut Vec<String>| {
        if !posts.contains(&id) {
            posts.insert(0, id.clone()); // prepend newest
        }
    })?;

    info!(post_id = %id, author_id, "post created");
    Ok(post)
}

/// Every post in index order (newest first), skipping ids that no longer
/// resolve.
pub fn all_posts(store: &dyn KvStore) -> Result<Vec<Post>, ApiError> {
    let ids: Vec<String> = store.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(post) = store.get_json::<Post>(&post_key(&id))? {
            posts.push(post);
        }
    }
    Ok(posts)
}

/// Newest first. The sort is stable, so equal timestamps keep index order.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created.cmp(&a.created));
}

pub fn list_posts_by_author(store: &dyn KvStore, author_id: &str) -> Result<Vec<Post>, ApiError> {
    let mut posts: Vec<Post> = all_posts(store)?
        .into_iter()
        .filter(|p| p.posted_by == author_id)
        .collect();
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// Expands author ids for display. Lookups are memoised per call.
pub struct Expander<'a> {
    store: &'a dyn KvStore,
    seen: HashMap<String, UserSummary>,
}

impl<'a> Expander<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            seen: HashMap::new(),
        }
    }

    pub fn summary(&mut self, user_id: &str) -> Result<UserSummary, ApiError> {
        if let Some(summary) = self.seen.get(user_id) {
            return Ok(summary.clone());
        }
        let summary = resolve_summary(self.store, user_id)?;
        self.seen.insert(user_id.to_string(), summary.clone());
        Ok(summary)
    }

    pub fn post(&mut self, post: &Post) -> Result<PostView, ApiError> {
        let mut comments = Vec::with_capacity(post.comments.len());
        for comment in &post.comments {
            comments.push(CommentView {
                id: comment.id.clone(),
                text: comment.text.clone(),
                created: comment.created,
                posted_by: self.summary(&comment.posted_by)?,
            });
        }
        Ok(PostView {
            id: post.id.clone(),
            text: post.text.clone(),
            has_photo: post.photo.is_some(),
            posted_by: self.summary(&post.posted_by)?,
            created: post.created,
            likes: post.likes.clone(),
            comments,
        })
    }

    pub fn posts(&mut self, posts: &[Post]) -> Result<Vec<PostView>, ApiError> {
        posts.iter().map(|p| self.post(p)).collect()
    }
}

pub fn get_post(store: &dyn KvStore, post_id: &str) -> Result<PostView, ApiError> {
    let post = load_post(store, post_id)?;
    Expander::new(store).post(&post)
}

/// Deletes a post owned by the session's user. A second delete of the same
/// id is `NotFound`.
pub fn delete_post(store: &dyn KvStore, post_id: &str, session: &Session) -> Result<PostView, ApiError> {
    let post = load_post(store, post_id)?;
    session.require_owner(&post.posted_by)?;
    let view = Expander::new(store).post(&post)?;

    store.delete(&post_key(post_id))?;
    store.upsert_json(POSTS_LIST_KEY, |posts: &mut Vec<String>| {
        posts.retain(|id| id != post_id);
    })?;
    store.delete(&post_photo_key(post_id))?;

    info!(post_id, "post deleted");
    Ok(view)
}

/// Content type and bytes of the post's photo.
pub fn post_photo(store: &dyn KvStore, post_id: &str) -> Result<(String, Vec<u8>), ApiError> {
    let post = load_post(store, post_id)?;
    let meta = post.photo.ok_or_else(|| ApiError::not_found("Photo"))?;
    let bytes = store
        .get(&post_photo_key(post_id))?
        .ok_or_else(|| ApiError::not_found("Photo"))?;
    Ok((meta.content_type, bytes))
}

// === HTTP Handlers ===

pub fn handle_create_post(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
    req: &Request,
) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    let new_post: NewPost = parse_body(req)?;
    let post = create_post(store, user_id, &new_post)?;
    json_response(201, &Expander::new(store).post(&post)?)
}

pub fn handle_get_post(store: &dyn KvStore, post_id: &str) -> Result<Response, ApiError> {
    json_response(200, &get_post(store, post_id)?)
}

pub fn handle_delete_post(store: &dyn KvStore, session: &Session, post_id: &str) -> Result<Response, ApiError> {
    json_response(200, &delete_post(store, post_id, session)?)
}
