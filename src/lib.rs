//! Mingle: a small social network backend.
//!
//! Users sign up, follow each other, post text with an optional photo, like,
//! comment and bookmark. All state lives in a key-value store behind
//! [`core::store::KvStore`]; the same [`router::route`] serves both the Spin
//! component below and the native actix binary in `src/bin/main.rs`.

pub mod auth;
pub mod bookmarks;
pub mod config;
pub mod core;
pub mod feed;
pub mod follow;
pub mod interactions;
pub mod models;
pub mod photos;
pub mod posts;
pub mod router;
pub mod users;

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::{
        http::{IntoResponse, Request},
        http_component,
        key_value::Store,
    };

    use crate::config::Settings;

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        let store = Store::open_default()?;
        let settings = Settings::load();
        Ok(crate::router::route(&store, &settings, &req))
    }
}
