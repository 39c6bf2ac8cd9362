#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::sync::Arc;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use tracing::{info, warn};
    use tracing_subscriber::EnvFilter;

    use mingle::config::Settings;
    use mingle::core::store::MemoryStore;
    use mingle::router;

    mod adapter {
        use actix_web::http::StatusCode;
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request, Response};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> anyhow::Result<Request> {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => anyhow::bail!("unsupported method {other}"),
            };

            let uri = req.uri().to_string();
            let mut builder = Request::builder();
            let mut with_headers = builder.method(method).uri(&uri);
            for (name, value) in req.headers() {
                if let Ok(value) = value.to_str() {
                    with_headers = with_headers.header(name.as_str(), value);
                }
            }

            Ok(with_headers.body(body.to_vec()).build())
        }

        pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
            let status = StatusCode::from_u16(*spin_resp.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = actix_web::HttpResponse::build(status);
            for (name, value) in spin_resp.headers() {
                if let Some(value) = value.as_str() {
                    response.insert_header((name, value));
                }
            }
            response.body(spin_resp.body().to_vec())
        }
    }

    struct AppState {
        store: Arc<MemoryStore>,
        settings: Settings,
    }

    pub async fn run() -> std::io::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();

        let settings = Settings::load();
        let bind_addr = settings.bind_addr.clone();
        let state = web::Data::new(AppState {
            store: Arc::new(MemoryStore::new()),
            settings,
        });

        info!(%bind_addr, "server listening");

        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(bind_addr.as_str())?
        .run()
        .await
    }

    async fn handle_all(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let spin_req = match adapter::actix_to_spin_request(&req, body) {
            Ok(r) => r,
            Err(err) => {
                warn!(path = req.path(), "rejected request: {err}");
                return HttpResponse::BadRequest().json(serde_json::json!({"error": "Invalid request"}));
            }
        };

        let resp = router::route(state.store.as_ref(), &state.settings, &spin_req);
        adapter::spin_to_actix_response(resp)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
