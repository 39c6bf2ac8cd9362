use spin_sdk::http::{Method, Request, Response};
use tracing::{debug, error};

use crate::auth::{authenticate, handle_signin, handle_signout, Session};
use crate::bookmarks;
use crate::config::Settings;
use crate::core::errors::ApiError;
use crate::core::store::KvStore;
use crate::feed::{self, FeedKind};
use crate::follow;
use crate::interactions;
use crate::photos;
use crate::posts;
use crate::users;

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

fn with_session<F>(store: &dyn KvStore, settings: &Settings, req: &Request, f: F) -> Result<Response, ApiError>
where
    F: FnOnce(&Session) -> Result<Response, ApiError>,
{
    let session = authenticate(store, settings, req)?;
    f(&session)
}

fn dispatch(store: &dyn KvStore, settings: &Settings, req: &Request) -> Result<Response, ApiError> {
    let path = req.path();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (req.method(), segments.as_slice()) {
        (Method::Options, _) => Ok(Response::builder().status(204).body(Vec::new()).build()),

        // Sessions
        (Method::Post, ["auth", "signin"]) => handle_signin(store, settings, req),
        (Method::Get, ["auth", "signout"]) => handle_signout(store, req),

        // User directory
        (Method::Post, ["api", "users"]) => users::handle_create_user(store, req),
        (Method::Get, ["api", "users"]) => users::handle_list_users(store),
        (Method::Get, ["api", "users", "defaultphoto"]) => photos::handle_default_photo(),
        (Method::Get, ["api", "users", "photo", user_id]) => photos::handle_user_photo(store, user_id),
        (Method::Get, ["api", "users", "findpeople", user_id]) => {
            with_session(store, settings, req, |s| follow::handle_find_people(store, s, user_id))
        }
        (Method::Get, ["api", "users", user_id]) => {
            with_session(store, settings, req, |_| users::handle_get_user(store, user_id))
        }
        (Method::Put, ["api", "users", user_id]) => {
            with_session(store, settings, req, |s| users::handle_update_user(store, s, user_id, req))
        }
        (Method::Delete, ["api", "users", user_id]) => {
            with_session(store, settings, req, |s| users::handle_delete_user(store, s, user_id))
        }

        // Follow graph
        (Method::Put, ["api", "follow"]) => {
            with_session(store, settings, req, |s| follow::handle_follow(store, s, req))
        }
        (Method::Put, ["api", "unfollow"]) => {
            with_session(store, settings, req, |s| follow::handle_unfollow(store, s, req))
        }

        // Feeds
        (Method::Get, ["api", "posts", "feed", user_id])
        | (Method::Get, ["api", "posts", "feed", user_id, "following"]) => {
            with_session(store, settings, req, |_| feed::handle_feed(store, user_id, FeedKind::Following))
        }
        (Method::Get, ["api", "posts", "feed", user_id, "discover"]) => {
            with_session(store, settings, req, |_| feed::handle_feed(store, user_id, FeedKind::Discover))
        }
        (Method::Get, ["api", "posts", "by", user_id]) => {
            with_session(store, settings, req, |_| feed::handle_user_feed(store, user_id))
        }

        // Posts
        (Method::Post, ["api", "posts", "new", user_id]) => {
            with_session(store, settings, req, |s| posts::handle_create_post(store, s, user_id, req))
        }
        (Method::Get, ["api", "post", "by", post_id]) => {
            with_session(store, settings, req, |_| posts::handle_get_post(store, post_id))
        }
        (Method::Get, ["api", "posts", "photo", post_id]) => photos::handle_post_photo(store, post_id),
        (Method::Delete, ["api", "posts", "delete", post_id]) => {
            with_session(store, settings, req, |s| posts::handle_delete_post(store, s, post_id))
        }

        // Interactions
        (Method::Get, ["api", "posts", "likes", post_id]) => {
            with_session(store, settings, req, |_| interactions::handle_list_likers(store, post_id))
        }
        (Method::Put, ["api", "posts", "like"]) => {
            with_session(store, settings, req, |s| interactions::handle_like(store, s, req))
        }
        (Method::Put, ["api", "posts", "unlike"]) => {
            with_session(store, settings, req, |s| interactions::handle_unlike(store, s, req))
        }
        (Method::Put, ["api", "posts", "comment", user_id]) => {
            with_session(store, settings, req, |s| interactions::handle_comment(store, s, user_id, req))
        }
        (Method::Put, ["api", "posts", "uncomment"]) => {
            with_session(store, settings, req, |s| interactions::handle_uncomment(store, s, req))
        }

        // Bookmarks
        (Method::Get, ["api", "bookmarks", "ids", user_id]) => {
            with_session(store, settings, req, |s| bookmarks::handle_bookmark_ids(store, s, user_id))
        }
        (Method::Put, ["api", "bookmarks", "add", user_id]) => {
            with_session(store, settings, req, |s| bookmarks::handle_add_bookmark(store, s, user_id, req))
        }
        (Method::Put, ["api", "bookmarks", "remove", user_id]) => {
            with_session(store, settings, req, |s| bookmarks::handle_remove_bookmark(store, s, user_id, req))
        }
        (Method::Get, ["api", "bookmarks", user_id]) => {
            with_session(store, settings, req, |s| bookmarks::handle_list_bookmarks(store, s, user_id))
        }

        _ => Err(ApiError::NotFound("No route found".to_string())),
    }
}

fn apply_cors(settings: &Settings, req: &Request, resp: &mut Response) {
    let Some(origin) = req.header("origin").and_then(|h| h.as_str()) else {
        return;
    };
    if !settings.allows_origin(origin) {
        return;
    }
    resp.set_header("access-control-allow-origin", origin);
    resp.set_header("access-control-allow-methods", ALLOWED_METHODS);
    resp.set_header("access-control-allow-headers", ALLOWED_HEADERS);
    resp.set_header("vary", "Origin");
}

/// Answers one request. Errors become `{ "error": ... }` bodies here.
pub fn route(store: &dyn KvStore, settings: &Settings, req: &Request) -> Response {
    let mut resp = match dispatch(store, settings, req) {
        Ok(resp) => resp,
        Err(err) => {
            if let ApiError::Internal(inner) = &err {
                error!(path = req.path(), "request failed: {:#}", inner);
            }
            err.into()
        }
    };
    apply_cors(settings, req, &mut resp);
    debug!(method = ?req.method(), path = req.path(), status = *resp.status(), "handled");
    resp
}
