use mingle::config::Settings;
use mingle::core::store::MemoryStore;
use mingle::router::route;
use serde_json::{json, Value};
use spin_sdk::http::{Method, Request, Response};

struct App {
    store: MemoryStore,
    settings: Settings,
}

impl App {
    fn new() -> Self {
        App {
            store: MemoryStore::new(),
            settings: Settings::default(),
        }
    }

    fn raw(&self, method: Method, path: &str, token: Option<&str>, body: Vec<u8>) -> Response {
        let mut builder = Request::builder();
        let mut req = builder.method(method).uri(path);
        req = req.header("content-type", "application/json");
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        route(&self.store, &self.settings, &req.body(body).build())
    }

    fn call(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> (u16, Value) {
        let body = body.map(|b| b.to_string().into_bytes()).unwrap_or_default();
        let resp = self.raw(method, path, token, body);
        let status = *resp.status();
        let json = if resp.body().is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(resp.body()).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Signs up and signs in, returning `(user_id, token)`.
    fn signup(&self, name: &str) -> (String, String) {
        let email = format!("{}@example.com", name.to_lowercase());
        let (status, user) = self.call(
            Method::Post,
            "/api/users",
            None,
            Some(json!({ "name": name, "email": email, "password": "secret-pw" })),
        );
        assert_eq!(status, 201, "signup failed: {:?}", user);
        let user_id = user["id"].as_str().unwrap().to_string();

        let (status, signed_in) = self.call(
            Method::Post,
            "/auth/signin",
            None,
            Some(json!({ "email": email, "password": "secret-pw" })),
        );
        assert_eq!(status, 200, "signin failed: {:?}", signed_in);
        assert_eq!(signed_in["user"]["id"], user_id);
        (user_id, signed_in["token"].as_str().unwrap().to_string())
    }

    fn post(&self, user_id: &str, token: &str, text: &str) -> String {
        let (status, post) = self.call(
            Method::Post,
            &format!("/api/posts/new/{}", user_id),
            Some(token),
            Some(json!({ "text": text })),
        );
        assert_eq!(status, 201, "post failed: {:?}", post);
        post["id"].as_str().unwrap().to_string()
    }
}

fn texts(feed: &Value) -> Vec<String> {
    feed.as_array()
        .unwrap()
        .iter()
        .map(|p| p["text"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_signup_signin_and_protected_routes() {
    let app = App::new();
    let (user_id, token) = app.signup("Ann");

    let (status, _) = app.call(Method::Get, &format!("/api/users/{}", user_id), None, None);
    assert_eq!(status, 401);

    let (status, _) = app.call(Method::Get, &format!("/api/users/{}", user_id), Some("bogus"), None);
    assert_eq!(status, 401);

    let (status, profile) = app.call(Method::Get, &format!("/api/users/{}", user_id), Some(&token), None);
    assert_eq!(status, 200);
    assert_eq!(profile["name"], "Ann");
    assert!(profile.get("password").is_none());

    let (status, body) = app.call(
        Method::Post,
        "/auth/signin",
        None,
        Some(json!({ "email": "ann@example.com", "password": "wrong" })),
    );
    assert_eq!(status, 401);
    assert!(body["error"].is_string());

    let (status, _) = app.call(Method::Get, "/auth/signout", Some(&token), None);
    assert_eq!(status, 200);
    let (status, _) = app.call(Method::Get, &format!("/api/users/{}", user_id), Some(&token), None);
    assert_eq!(status, 401);
}

#[test]
fn test_duplicate_email_is_conflict() {
    let app = App::new();
    app.signup("Ann");
    let (status, body) = app.call(
        Method::Post,
        "/api/users",
        None,
        Some(json!({ "name": "Other", "email": "ANN@example.com", "password": "secret-pw" })),
    );
    assert_eq!(status, 409);
    assert!(body["error"].is_string());
}

#[test]
fn test_malformed_body_is_bad_request() {
    let app = App::new();
    let resp = app.raw(Method::Post, "/api/users", None, b"not json".to_vec());
    assert_eq!(*resp.status(), 400);

    let (_, token) = app.signup("Ann");
    let resp = app.raw(Method::Put, "/api/follow", Some(&token), b"{".to_vec());
    assert_eq!(*resp.status(), 400);
}

#[test]
fn test_follow_shapes_the_feeds() {
    let app = App::new();
    let (ann, ann_token) = app.signup("Ann");
    let (bob, bob_token) = app.signup("Bob");
    let (cy, cy_token) = app.signup("Cy");

    app.post(&bob, &bob_token, "hello");
    app.post(&cy, &cy_token, "from cy");

    let (status, followee) = app.call(
        Method::Put,
        "/api/follow",
        Some(&ann_token),
        Some(json!({ "userId": ann, "followId": bob })),
    );
    assert_eq!(status, 200);
    assert_eq!(followee["id"], bob);

    let (status, feed) = app.call(Method::Get, &format!("/api/posts/feed/{}", ann), Some(&ann_token), None);
    assert_eq!(status, 200);
    assert_eq!(texts(&feed), vec!["hello"]);
    assert_eq!(feed[0]["postedBy"]["name"], "Bob");

    let (_, discover) = app.call(
        Method::Get,
        &format!("/api/posts/feed/{}/discover", ann),
        Some(&ann_token),
        None,
    );
    assert_eq!(texts(&discover), vec!["from cy"]);

    let (_, people) = app.call(
        Method::Get,
        &format!("/api/users/findpeople/{}", ann),
        Some(&ann_token),
        None,
    );
    let names: Vec<&str> = people.as_array().unwrap().iter().map(|u| u["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Cy"]);

    let (status, _) = app.call(
        Method::Put,
        "/api/unfollow",
        Some(&ann_token),
        Some(json!({ "unfollowId": bob })),
    );
    assert_eq!(status, 200);
    let (_, feed) = app.call(Method::Get, &format!("/api/posts/feed/{}", ann), Some(&ann_token), None);
    assert!(texts(&feed).is_empty());

    // Acting on behalf of someone else is refused.
    let (status, _) = app.call(
        Method::Put,
        "/api/follow",
        Some(&ann_token),
        Some(json!({ "userId": cy, "followId": bob })),
    );
    assert_eq!(status, 403);
}

#[test]
fn test_likes_and_comments() {
    let app = App::new();
    let (ann, ann_token) = app.signup("Ann");
    let (_, bob_token) = app.signup("Bob");
    let post_id = app.post(&ann, &ann_token, "like me");

    for _ in 0..2 {
        let (status, likes) = app.call(
            Method::Put,
            "/api/posts/like",
            Some(&bob_token),
            Some(json!({ "postId": post_id })),
        );
        assert_eq!(status, 200);
        assert_eq!(likes["likes"].as_array().unwrap().len(), 1);
    }

    let (_, likers) = app.call(
        Method::Get,
        &format!("/api/posts/likes/{}", post_id),
        Some(&ann_token),
        None,
    );
    assert_eq!(likers[0]["name"], "Bob");

    let (status, post) = app.call(
        Method::Put,
        &format!("/api/posts/comment/{}", ann),
        Some(&ann_token),
        Some(json!({ "postId": post_id, "text": "thanks" })),
    );
    assert_eq!(status, 200);
    let comment_id = post["comments"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app.call(
        Method::Put,
        "/api/posts/uncomment",
        Some(&bob_token),
        Some(json!({ "postId": post_id, "commentId": comment_id })),
    );
    assert_eq!(status, 403);

    let (status, post) = app.call(
        Method::Put,
        "/api/posts/uncomment",
        Some(&ann_token),
        Some(json!({ "postId": post_id, "commentId": comment_id })),
    );
    assert_eq!(status, 200);
    assert!(post["comments"].as_array().unwrap().is_empty());
}

#[test]
fn test_deleted_author_shows_as_tombstone() {
    let app = App::new();
    let (ann, ann_token) = app.signup("Ann");
    let (_, bob_token) = app.signup("Bob");
    let post_id = app.post(&ann, &ann_token, "last words");

    let (status, _) = app.call(Method::Delete, &format!("/api/users/{}", ann), Some(&bob_token), None);
    assert_eq!(status, 403);

    let (status, _) = app.call(Method::Delete, &format!("/api/users/{}", ann), Some(&ann_token), None);
    assert_eq!(status, 200);

    let (status, post) = app.call(Method::Get, &format!("/api/post/by/{}", post_id), Some(&bob_token), None);
    assert_eq!(status, 200);
    assert_eq!(post["postedBy"]["name"], "Unknown user");
    assert_eq!(post["postedBy"]["deleted"], true);

    // The deleted account's token is dead too.
    let (status, _) = app.call(Method::Get, &format!("/api/posts/by/{}", ann), Some(&ann_token), None);
    assert_eq!(status, 401);
}

#[test]
fn test_bookmarks_are_private() {
    let app = App::new();
    let (ann, ann_token) = app.signup("Ann");
    let (_, bob_token) = app.signup("Bob");
    let post_id = app.post(&ann, &ann_token, "keep this");

    let (status, ids) = app.call(
        Method::Put,
        &format!("/api/bookmarks/add/{}", ann),
        Some(&ann_token),
        Some(json!({ "postId": post_id })),
    );
    assert_eq!(status, 200);
    assert_eq!(ids, json!([post_id]));

    let (status, _) = app.call(Method::Get, &format!("/api/bookmarks/{}", ann), Some(&bob_token), None);
    assert_eq!(status, 403);

    let (status, saved) = app.call(Method::Get, &format!("/api/bookmarks/{}", ann), Some(&ann_token), None);
    assert_eq!(status, 200);
    assert_eq!(texts(&saved), vec!["keep this"]);
}

#[test]
fn test_photos_and_defaults() {
    let app = App::new();
    let (ann, ann_token) = app.signup("Ann");

    let resp = app.raw(Method::Get, &format!("/api/users/photo/{}", ann), None, Vec::new());
    assert_eq!(*resp.status(), 200);
    assert!(!resp.body().is_empty());

    let (status, _) = app.call(
        Method::Post,
        &format!("/api/posts/new/{}", ann),
        Some(&ann_token),
        Some(json!({ "text": "bad photo", "photo": { "contentType": "text/plain", "data": "aGk=" } })),
    );
    assert_eq!(status, 400);

    let resp = app.raw(Method::Get, "/api/posts/photo/missing", None, Vec::new());
    assert_eq!(*resp.status(), 404);
}

#[test]
fn test_cors_and_unknown_routes() {
    let app = App::new();

    let mut builder = Request::builder();
    let req = builder
        .method(Method::Options)
        .uri("/api/users")
        .header("origin", "http://localhost:3000")
        .body(Vec::new())
        .build();
    let resp = route(&app.store, &app.settings, &req);
    assert_eq!(*resp.status(), 204);
    let allowed = resp.header("access-control-allow-origin").and_then(|h| h.as_str());
    assert_eq!(allowed, Some("http://localhost:3000"));

    let mut builder = Request::builder();
    let req = builder
        .method(Method::Get)
        .uri("/api/users")
        .header("origin", "http://evil.example")
        .body(Vec::new())
        .build();
    let resp = route(&app.store, &app.settings, &req);
    assert_eq!(*resp.status(), 200);
    assert!(resp.header("access-control-allow-origin").is_none());

    let (status, body) = app.call(Method::Get, "/api/nothing/here", None, None);
    assert_eq!(status, 404);
    assert_eq!(body["error"], "No route found");
}
