use http_svr::config::Config;
use http_svr::http::response::Response;
use http_svr::server::{HttpServer, handler_fn, send_response};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let handler = handler_fn(|session, request| {
        let response = match request.path() {
            "/ping" => Response::ok("pong\n"),
            _ => Response::ok(format!("Hello from http-svr: {}\n", request.url)),
        };
        send_response(session, &response)?;
        Ok(())
    });

    let mut server = HttpServer::create(cfg, handler)?;
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.stop().await?;
    server.release()?;
    Ok(())
}
