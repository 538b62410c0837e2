//! Local HTTP doubles for the remote services

#![allow(dead_code)]

use axum::Router;

/// Serve `app` on an ephemeral loopback port and return its base URL
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A base URL nothing listens on
pub const UNREACHABLE: &str = "http://127.0.0.1:1";
