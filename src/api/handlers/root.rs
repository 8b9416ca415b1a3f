use axum::response::IntoResponse;

// Undocumented banner for humans hitting the API root.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, response::IntoResponse};

    #[tokio::test]
    async fn root_returns_name_and_version() {
        let response = root().await.into_response();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let banner = String::from_utf8(body.to_vec()).unwrap();
        assert!(banner.starts_with(env!("CARGO_PKG_NAME")));
        assert!(banner.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
