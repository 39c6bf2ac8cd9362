use mime_guess::from_path;
use rust_embed::RustEmbed;
use spin_sdk::http::Response;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::store::KvStore;
use crate::posts::post_photo;
use crate::users::load_user;

#[derive(RustEmbed)]
#[folder = "assets"]
struct Assets;

const DEFAULT_PHOTO: &str = "profile-pic.svg";

fn image_response(content_type: &str, bytes: Vec<u8>) -> Response {
    Response::builder()
        .status(200)
        .header("Content-Type", content_type)
        .header("Cache-Control", "no-cache")
        .body(bytes)
        .build()
}

pub fn default_photo() -> Result<(String, Vec<u8>), ApiError> {
    let file = Assets::get(DEFAULT_PHOTO)
        .ok_or_else(|| anyhow::anyhow!("default photo {} is not embedded", DEFAULT_PHOTO))?;
    let mime = from_path(DEFAULT_PHOTO).first_or_octet_stream();
    Ok((mime.to_string(), file.data.to_vec()))
}

/// The user's uploaded photo, or the default one when they have none.
pub fn user_photo(store: &dyn KvStore, user_id: &str) -> Result<(String, Vec<u8>), ApiError> {
    let user = load_user(store, user_id)?;
    if let Some(meta) = user.photo {
        if let Some(bytes) = store.get(&user_photo_key(user_id))? {
            return Ok((meta.content_type, bytes));
        }
    }
    default_photo()
}

// === HTTP Handlers ===

pub fn handle_default_photo() -> Result<Response, ApiError> {
    let (content_type, bytes) = default_photo()?;
    Ok(image_response(&content_type, bytes))
}

pub fn handle_user_photo(store: &dyn KvStore, user_id: &str) -> Result<Response, ApiError> {
    let (content_type, bytes) = user_photo(store, user_id)?;
    Ok(image_response(&content_type, bytes))
}

pub fn handle_post_photo(store: &dyn KvStore, post_id: &str) -> Result<Response, ApiError> {
    let (content_type, bytes) = post_photo(store, post_id)?;
    Ok(image_response(&content_type, bytes))
}
