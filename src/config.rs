use envconfig::Envconfig;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_ABOUT_LENGTH: usize = 500;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;
pub const ALLOWED_PHOTO_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

pub const USERS_LIST_KEY: &str = "users_list";
pub const POSTS_LIST_KEY: &str = "posts_list";

#[derive(Envconfig, Clone, Debug)]
pub struct Settings {
    #[envconfig(from = "MINGLE_BIND_ADDR", default = "0.0.0.0:3000")]
    pub bind_addr: String,

    /// Comma separated list of origins allowed to make cross-origin calls.
    #[envconfig(from = "MINGLE_CORS_ORIGINS", default = "http://localhost:3000")]
    pub cors_origins: String,

    #[envconfig(from = "MINGLE_TOKEN_EXPIRATION_HOURS", default = "24")]
    pub token_expiration_hours: i64,
}

impl Settings {
    /// Reads the environment, falling back to defaults for anything unset or
    /// unparsable.
    pub fn load() -> Self {
        Settings::init_from_env().unwrap_or_else(|err| {
            tracing::warn!("invalid settings in environment ({err}), using defaults");
            Settings::default()
        })
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .any(|allowed| !allowed.is_empty() && allowed == origin)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            cors_origins: "http://localhost:3000".to_string(),
            token_expiration_hours: 24,
        }
    }
}

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn user_tokens_key(user_id: &str) -> String {
    format!("tokens:{}", user_id)
}

pub fn user_photo_key(id: &str) -> String {
    format!("photo:user:{}", id)
}

pub fn post_photo_key(id: &str) -> String {
    format!("photo:post:{}", id)
}
