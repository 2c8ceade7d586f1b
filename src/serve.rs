//! Local preview server.
//!
//! Serves a built site over HTTP for checking it in a browser:
//!
//! - Directory requests serve their `index.html`.
//! - Misses answer `404` with the site's own `404.html` when it has one,
//!   else with a small built-in page.
//! - Every request is logged through `tracing` at debug level.
//! - Ctrl-C stops the server after in-flight requests finish.
//!
//! When the port is taken, binding fails with [`ServeError::PortInUse`] and
//! suggests the first free port among the next ten.

use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use axum::response::Html;
use maud::{DOCTYPE, html};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Site-provided page served for missing paths.
pub const NOT_FOUND_PAGE: &str = "404.html";

/// How many ports after a busy one are tried for a suggestion.
const PORT_SEARCH_SPAN: u16 = 10;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("port {port} is already in use{}", suggestion_text(*.suggestion))]
    PortInUse { port: u16, suggestion: Option<u16> },
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

fn suggestion_text(suggestion: Option<u16>) -> String {
    match suggestion {
        Some(port) => format!("; try --port {port}"),
        None => String::new(),
    }
}

/// Router serving `root` as a static site.
pub fn router(root: &Path) -> Router {
    let page = Arc::new(root.join(NOT_FOUND_PAGE));
    let not_found = move || {
        let page = Arc::clone(&page);
        async move { not_found_page(&page).await }
    };

    let files = ServeDir::new(root)
        .append_index_html_on_directories(true)
        .not_found_service(not_found.into_service());

    Router::new()
        .fallback_service(files)
        .layer(TraceLayer::new_for_http())
}

/// Bind `host:port`, suggesting a free port when it is taken.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServeError> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(ServeError::PortInUse {
            port,
            suggestion: find_free_port(host, port),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Serve `root` on `listener` until Ctrl-C.
pub async fn run(listener: TcpListener, root: &Path) -> Result<(), ServeError> {
    if !root.is_dir() {
        return Err(ServeError::NotADirectory(root.to_path_buf()));
    }
    let addr: SocketAddr = listener.local_addr()?;
    info!(address = %addr, root = %root.display(), "serving");

    axum::serve(listener, router(root))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn not_found_page(page: &Path) -> Html<String> {
    match tokio::fs::read_to_string(page).await {
        Ok(body) => Html(body),
        Err(_) => Html(builtin_not_found()),
    }
}

fn builtin_not_found() -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { "404 Not Found" }
            }
            body {
                h1 { "404 Not Found" }
                p { "The requested page does not exist." }
                p { a href="/" { "Back to the home page" } }
            }
        }
    }
    .into_string()
}

fn find_free_port(host: &str, busy: u16) -> Option<u16> {
    (1..=PORT_SEARCH_SPAN)
        .filter_map(|offset| busy.checked_add(offset))
        .find(|&candidate| std::net::TcpListener::bind((host, candidate)).is_ok())
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server runs until killed.
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, stopping server");
}
