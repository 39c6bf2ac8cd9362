//! Read-time feed composition. Every request scans the post index and sorts;
//! nothing is materialised and results are not paginated.

use std::collections::BTreeSet;

use spin_sdk::http::Response;
use tracing::debug;

use crate::core::errors::ApiError;
use crate::core::helpers::json_response;
use crate::core::store::KvStore;
use crate::models::models::{Post, PostView};
use crate::posts::{all_posts, list_posts_by_author, sort_newest_first, Expander};
use crate::users::load_user;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// The user's own posts plus everyone they follow.
    Following,
    /// Everyone else.
    Discover,
}

fn compose(store: &dyn KvStore, user_id: &str, kind: FeedKind) -> Result<Vec<Post>, ApiError> {
    let user = load_user(store, user_id)?;
    let mut authors: BTreeSet<String> = user.following;
    authors.insert(user.id);

    let mut posts: Vec<Post> = all_posts(store)?
        .into_iter()
        .filter(|post| match kind {
            FeedKind::Following => authors.contains(&post.posted_by),
            FeedKind::Discover => !authors.contains(&post.posted_by),
        })
        .collect();
    sort_newest_first(&mut posts);

    debug!(user_id, ?kind, posts = posts.len(), "feed composed");
    Ok(posts)
}

pub fn compose_following_feed(store: &dyn KvStore, user_id: &str) -> Result<Vec<Post>, ApiError> {
    compose(store, user_id, FeedKind::Following)
}

pub fn compose_discover_feed(store: &dyn KvStore, user_id: &str) -> Result<Vec<Post>, ApiError> {
    compose(store, user_id, FeedKind::Discover)
}

/// A profile page's posts. Unknown authors are `NotFound`.
pub fn compose_user_feed(store: &dyn KvStore, author_id: &str) -> Result<Vec<Post>, ApiError> {
    load_user(store, author_id)?;
    list_posts_by_author(store, author_id)
}

fn views(store: &dyn KvStore, posts: &[Post]) -> Result<Vec<PostView>, ApiError> {
    Expander::new(store).posts(posts)
}

// === HTTP Handlers ===

pub fn handle_feed(store: &dyn KvStore, user_id: &str, kind: FeedKind) -> Result<Response, ApiError> {
    let posts = compose(store, user_id, kind)?;
    json_response(200, &views(store, &posts)?)
}

pub fn handle_user_feed(store: &dyn KvStore, author_id: &str) -> Result<Response, ApiError> {
    let posts = compose_user_feed(store, author_id)?;
    json_response(200, &views(store, &posts)?)
}
