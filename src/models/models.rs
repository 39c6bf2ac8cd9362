use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type of a stored photo. The bytes live under their own key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMeta {
    pub content_type: String,
}

/// Stored user record. Never serialized to clients; responses go through
/// [`Profile`], [`UserListing`] or [`UserSummary`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string; the salt is embedded in it.
    pub password: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub photo: Option<PhotoMeta>,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub following: BTreeSet<String>,
    #[serde(default)]
    pub followers: BTreeSet<String>,
    #[serde(default)]
    pub bookmarked_posts: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub created: DateTime<Utc>,
    pub posted_by: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub photo: Option<PhotoMeta>,
    pub posted_by: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub likes: BTreeSet<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

// === Client-facing views ===

/// Minimal author reference used wherever a user id is expanded for display.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl UserSummary {
    pub const UNKNOWN_NAME: &'static str = "Unknown user";

    pub fn tombstone(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Self::UNKNOWN_NAME.to_string(),
            deleted: true,
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            deleted: false,
        }
    }
}

/// One level of a profile's follow graph: the connection and its own edges.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub email: String,
    pub following: BTreeSet<String>,
    pub followers: BTreeSet<String>,
}

impl From<&User> for Connection {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            following: user.following.clone(),
            followers: user.followers.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub about: String,
    pub has_photo: bool,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub following: Vec<Connection>,
    pub followers: Vec<Connection>,
}

/// Row of the public user directory.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserListing {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

impl From<&User> for UserListing {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            created: user.created,
            updated: user.updated,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub text: String,
    pub created: DateTime<Utc>,
    pub posted_by: UserSummary,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub has_photo: bool,
    pub posted_by: UserSummary,
    pub created: DateTime<Utc>,
    pub likes: BTreeSet<String>,
    pub comments: Vec<CommentView>,
}
