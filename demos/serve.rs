use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use axum_range_request::{FileSource, RequestContext, Resource};

/// Run an RFC 7233 enabled webserver for a single file.
#[derive(Debug, Parser)]
struct Args {
    /// File served at `/`
    #[arg(short, long, default_value = "Cargo.toml")]
    file: PathBuf,

    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
}

async fn get_file(State(resource): State<Arc<Resource<FileSource>>>, request: RequestContext) -> Response {
    resource.serve(&request).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let args = Args::parse();
    let resource = Resource::file(&args.file).await?;
    info!(file = %args.file.display(), size = resource.byte_size(), etag = resource.etag(), "serving");

    let router = Router::new()
        .route("/", get(get_file).post(get_file))
        .with_state(Arc::new(resource));

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
