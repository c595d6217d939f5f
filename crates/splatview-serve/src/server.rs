//! Web server setup and routing

use anyhow::Result;
use axum::http::{header, HeaderValue};
use axum::{routing::get, Router};
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::config::TlsConfig;

/// Build the router: the site directory as static files
pub fn router(site: &Path) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        // Static files (WASM frontend, catalogs, scene) - must be fallback for root
        .fallback_service(ServeDir::new(site))
        // Catalogs and config are edited in place; make browsers revalidate
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        // CORS, so the viewer can be pointed at this host with ?assets=
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Run the web server (HTTP or HTTPS depending on config)
pub async fn run(site: &Path, bind: &str, tls: Option<&TlsConfig>) -> Result<()> {
    if !site.is_dir() {
        anyhow::bail!("Site directory not found: {}", site.display());
    }
    let app = router(site);

    // Start server with or without TLS
    if let Some(tls_config) = tls {
        run_https(app, bind, tls_config).await
    } else {
        run_http(app, bind).await
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    info!("Device orientation and AR need HTTPS on mobile browsers");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    // Verify files exist
    if !cert_path.exists() {
        anyhow::bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        anyhow::bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
