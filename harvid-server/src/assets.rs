//! Static assets embedded into the binary at compile time (§6.5): no
//! filesystem dependency at runtime, served at fixed paths.

use axum::{http::header, response::IntoResponse, response::Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

fn serve(path: &str, content_type: &'static str) -> Response {
    match Assets::get(path) {
        Some(file) => (
            [(header::CONTENT_TYPE, content_type)],
            file.data.into_owned(),
        )
            .into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn favicon() -> Response {
    serve("favicon.ico", "image/x-icon")
}

pub async fn logo() -> Response {
    serve("harvid.png", "image/png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_assets_are_present() {
        assert!(Assets::get("favicon.ico").is_some());
        assert!(Assets::get("harvid.png").is_some());
    }
}
