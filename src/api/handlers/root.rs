use axum::response::IntoResponse;

// axum handler for the service banner
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn root_returns_banner() {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
