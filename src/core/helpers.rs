use std::collections::HashSet;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::{ALLOWED_PHOTO_TYPES, MAX_PHOTO_BYTES};
use crate::core::errors::ApiError;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Strips every HTML tag, leaving plain text.
pub fn sanitize_text(text: &str) -> String {
    Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string()
}

pub fn json_response<T: Serialize>(status: u16, value: &T) -> Result<Response, ApiError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(value)?)
        .build())
}

pub fn no_content() -> Response {
    Response::builder().status(204).body(Vec::new()).build()
}

pub fn parse_body<T: DeserializeOwned>(req: &Request) -> Result<T, ApiError> {
    serde_json::from_slice(req.body())
        .map_err(|e| ApiError::Validation(format!("Malformed request body: {}", e)))
}

/// Photo as it arrives in a JSON body.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpload {
    pub content_type: String,
    pub data: String,
}

impl PhotoUpload {
    /// Checks the content type and size and returns the raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, ApiError> {
        if !ALLOWED_PHOTO_TYPES.contains(&self.content_type.as_str()) {
            return Err(ApiError::Validation(format!(
                "Unsupported photo type {}",
                self.content_type
            )));
        }
        let bytes = BASE64_STANDARD
            .decode(self.data.as_bytes())
            .map_err(|_| ApiError::Validation("Photo data is not valid base64".to_string()))?;
        if bytes.is_empty() {
            return Err(ApiError::Validation("Photo is empty".to_string()));
        }
        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(ApiError::Validation("Photo exceeds 1 MiB".to_string()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies_and_differs_from_plaintext() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }

    #[test]
    fn sanitize_text_drops_markup() {
        assert_eq!(sanitize_text("<b>Ann</b><script>x()</script>"), "Ann");
    }

    #[test]
    fn photo_upload_rejects_unknown_types_and_bad_base64() {
        let svg = PhotoUpload {
            content_type: "image/svg+xml".to_string(),
            data: BASE64_STANDARD.encode(b"<svg/>"),
        };
        assert!(matches!(svg.decode(), Err(ApiError::Validation(_))));

        let garbage = PhotoUpload {
            content_type: "image/png".to_string(),
            data: "%%%".to_string(),
        };
        assert!(matches!(garbage.decode(), Err(ApiError::Validation(_))));

        let ok = PhotoUpload {
            content_type: "image/png".to_string(),
            data: BASE64_STANDARD.encode([137u8, 80, 78, 71]),
        };
        assert_eq!(ok.decode().unwrap(), vec![137u8, 80, 78, 71]);
    }
}
