//! Requests through a running proxy to a local upstream

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use themepark_config::ConfigBuilder;
use themepark_middleware::ThemeParkConfig;
use themepark_proxy::{HttpClient, Server};
use tokio::net::TcpListener;

const PAGE: &str = "<html><head><title>Sonarr</title></head><body></body></html>";

/// Serve `PAGE` and echo the forwarding headers back
async fn upstream(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .cloned()
        .unwrap_or_else(|| "none".parse().unwrap());
    let forwarded_host = req
        .headers()
        .get("x-forwarded-host")
        .cloned()
        .unwrap_or_else(|| "none".parse().unwrap());

    let (content_type, body) = match req.uri().path() {
        "/api/series" => ("application/json", "[]"),
        _ => ("text/html; charset=utf-8", PAGE),
    };

    Ok(Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header("x-seen-forwarded-for", forwarded_for)
        .header("x-seen-forwarded-host", forwarded_host)
        .body(Full::new(Bytes::from(body)))
        .unwrap())
}

async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), hyper::service::service_fn(upstream))
                    .await;
            });
        }
    });

    addr
}

async fn start_proxy(upstream: SocketAddr) -> (Arc<Server>, SocketAddr) {
    let config = ConfigBuilder::new()
        .upstream(format!("http://{upstream}"))
        .request_timeout(Duration::from_secs(5))
        .theme_park(ThemeParkConfig::new("sonarr", "dark"))
        .build()
        .unwrap();

    let server = Arc::new(Server::new(&config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let running = Arc::clone(&server);
    tokio::spawn(async move { running.serve(listener).await });

    (server, addr)
}

async fn get(addr: SocketAddr, path: &str) -> Response<Incoming> {
    let req = Request::builder()
        .uri(format!("http://{addr}{path}"))
        .header(ACCEPT, "text/html")
        .body(Full::new(Bytes::new()))
        .unwrap();

    HttpClient::new().send(req).await.unwrap()
}

#[tokio::test]
async fn html_is_themed_through_the_proxy() {
    let upstream = start_upstream().await;
    let (server, proxy) = start_proxy(upstream).await;

    let response = get(proxy, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-seen-forwarded-for"], "127.0.0.1");
    assert_eq!(
        response.headers()["x-seen-forwarded-host"],
        proxy.to_string().as_str()
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains(
        r#"<link rel="stylesheet" type="text/css" href="https://theme-park.dev/css/base/sonarr/dark.css"></head>"#
    ));

    server.shutdown_signal().trigger();
}

#[tokio::test]
async fn json_passes_through_the_proxy() {
    let upstream = start_upstream().await;
    let (server, proxy) = start_proxy(upstream).await;

    let response = get(proxy, "/api/series").await;
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "[]");

    server.shutdown_signal().trigger();
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let (server, proxy) = start_proxy(dead).await;

    let response = get(proxy, "/").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    server.shutdown_signal().trigger();
}
