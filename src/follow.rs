//! Directed follow edges.
//!
//! "A follows B" is two writes: B into A's `following`, then A into B's
//! `followers`. There is no transaction spanning both records. Each half is a
//! set operation applied under [`KvStore::update`], so it is idempotent on its
//! own, and an edge left half-written by a failure is repaired by repeating
//! the same call.

use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};

use crate::auth::Session;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, parse_body};
use crate::core::store::{KvStore, KvStoreExt};
use crate::models::models::{Profile, User, UserListing};
use crate::users::{list_users_excluding, load_user, profile_of};

fn add_following(store: &dyn KvStore, follower_id: &str, followee_id: &str) -> Result<bool, ApiError> {
    store
        .modify_json(&user_key(follower_id), |user: &mut User| {
            Ok::<_, ApiError>(user.following.insert(followee_id.to_string()))
        })?
        .ok_or_else(|| ApiError::not_found("User"))
}

fn add_follower(store: &dyn KvStore, followee_id: &str, follower_id: &str) -> Result<bool, ApiError> {
    store
        .modify_json(&user_key(followee_id), |user: &mut User| {
            Ok::<_, ApiError>(user.followers.insert(follower_id.to_string()))
        })?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Records `follower_id -> followee_id` and returns the followee's profile.
pub fn follow(store: &dyn KvStore, follower_id: &str, followee_id: &str) -> Result<Profile, ApiError> {
    if follower_id == followee_id {
        return Err(ApiError::Validation("You cannot follow yourself".to_string()));
    }
    load_user(store, followee_id)?;

    let added_following = add_following(store, follower_id, followee_id)?;
    let added_follower = add_follower(store, followee_id, follower_id)?;

    if added_following || added_follower {
        info!(follower_id, followee_id, "followed");
    } else {
        debug!(follower_id, followee_id, "follow edge already present");
    }

    let followee = load_user(store, followee_id)?;
    profile_of(store, &followee)
}

/// Removes `follower_id -> followee_id`. Also succeeds when the followee's
/// account is gone, which clears the dangling half of the edge.
pub fn unfollow(store: &dyn KvStore, follower_id: &str, followee_id: &str) -> Result<Profile, ApiError> {
    let removed = store
        .modify_json(&user_key(follower_id), |user: &mut User| {
            Ok::<_, ApiError>(user.following.remove(followee_id))
        })?
        .ok_or_else(|| ApiError::not_found("User"))?;

    store.modify_json(&user_key(followee_id), |user: &mut User| {
        Ok::<_, ApiError>(user.followers.remove(follower_id))
    })?;

    if removed {
        info!(follower_id, followee_id, "unfollowed");
    }

    match store.get_json::<User>(&user_key(followee_id))? {
        Some(followee) => profile_of(store, &followee),
        None => {
            let follower = load_user(store, follower_id)?;
            profile_of(store, &follower)
        }
    }
}

/// Everyone `user_id` does not follow yet, excluding themselves.
pub fn find_people(store: &dyn KvStore, user_id: &str) -> Result<Vec<UserListing>, ApiError> {
    let user = load_user(store, user_id)?;
    let mut excluded: Vec<String> = user.following.iter().cloned().collect();
    excluded.push(user.id);
    list_users_excluding(store, &excluded)
}

// === HTTP Handlers ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowRequest {
    user_id: Option<String>,
    #[serde(alias = "unfollowId", default)]
    follow_id: String,
}

fn parse_follow_request(session: &Session, req: &Request) -> Result<String, ApiError> {
    let body: FollowRequest = parse_body(req)?;
    if let Some(user_id) = &body.user_id {
        session.require_owner(user_id)?;
    }
    let target = body.follow_id.trim();
    if target.is_empty() {
        return Err(ApiError::Validation("Target user is required".to_string()));
    }
    Ok(target.to_string())
}

pub fn handle_follow(store: &dyn KvStore, session: &Session, req: &Request) -> Result<Response, ApiError> {
    let target = parse_follow_request(session, req)?;
    json_response(200, &follow(store, &session.user_id, &target)?)
}

pub fn handle_unfollow(store: &dyn KvStore, session: &Session, req: &Request) -> Result<Response, ApiError> {
    let target = parse_follow_request(session, req)?;
    json_response(200, &unfollow(store, &session.user_id, &target)?)
}

pub fn handle_find_people(
    store: &dyn KvStore,
    session: &Session,
    user_id: &str,
) -> Result<Response, ApiError> {
    session.require_owner(user_id)?;
    json_response(200, &find_people(store, user_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::users::{create_user, NewUser};

    fn signup(store: &MemoryStore, name: &str) -> String {
        create_user(
            store,
            &NewUser {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                password: "secret-pw".to_string(),
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn follow_then_unfollow_restores_both_sides() {
        let store = MemoryStore::new();
        let a = signup(&store, "Ann");
        let b = signup(&store, "Bob");
        let before_a = load_user(&store, &a).unwrap();
        let before_b = load_user(&store, &b).unwrap();

        follow(&store, &a, &b).unwrap();
        assert!(load_user(&store, &a).unwrap().following.contains(&b));
        assert!(load_user(&store, &b).unwrap().followers.contains(&a));

        unfollow(&store, &a, &b).unwrap();
        assert_eq!(load_user(&store, &a).unwrap().following, before_a.following);
        assert_eq!(load_user(&store, &b).unwrap().followers, before_b.followers);
    }

    #[test]
    fn follow_twice_does_not_duplicate() {
        let store = MemoryStore::new();
        let a = signup(&store, "Ann");
        let b = signup(&store, "Bob");

        follow(&store, &a, &b).unwrap();
        let profile = follow(&store, &a, &b).unwrap();

        assert_eq!(profile.followers.len(), 1);
        assert_eq!(load_user(&store, &a).unwrap().following.len(), 1);
    }

    #[test]
    fn repeating_follow_repairs_half_written_edge() {
        let store = MemoryStore::new();
        let a = signup(&store, "Ann");
        let b = signup(&store, "Bob");

        // Only the first write landed.
        add_following(&store, &a, &b).unwrap();
        assert!(!load_user(&store, &b).unwrap().followers.contains(&a));

        follow(&store, &a, &b).unwrap();
        assert!(load_user(&store, &b).unwrap().followers.contains(&a));
        assert_eq!(load_user(&store, &a).unwrap().following.len(), 1);
    }

    #[test]
    fn follow_rejects_self_and_unknown_users() {
        let store = MemoryStore::new();
        let a = signup(&store, "Ann");

        assert!(matches!(follow(&store, &a, &a), Err(ApiError::Validation(_))));
        assert!(matches!(follow(&store, &a, "ghost"), Err(ApiError::NotFound(_))));
        assert!(load_user(&store, &a).unwrap().following.is_empty());
    }

    #[test]
    fn unfollow_of_deleted_account_clears_dangling_edge() {
        let store = MemoryStore::new();
        let a = signup(&store, "Ann");
        let b = signup(&store, "Bob");
        follow(&store, &a, &b).unwrap();
        store.delete(&user_key(&b)).unwrap();

        unfollow(&store, &a, &b).unwrap();
        assert!(load_user(&store, &a).unwrap().following.is_empty());
    }

    #[test]
    fn find_people_excludes_self_and_followees() {
        let store = MemoryStore::new();
        let a = signup(&store, "Ann");
        let b = signup(&store, "Bob");
        let c = signup(&store, "Cy");
        follow(&store, &a, &b).unwrap();

        let ids: Vec<String> = find_people(&store, &a).unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![c]);
    }
}
