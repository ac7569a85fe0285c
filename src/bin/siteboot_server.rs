//!
//! siteboot server binary
//! ----------------------
//! Command-line entry point that boots a site from its config file and module
//! root and serves it over HTTP. Supports configuration via CLI flags and
//! environment variables; flags win.

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

use siteboot::engine::EngineSettings;
use siteboot::{start, BootRequest};

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn arg_values(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2).filter(|w| w[0] == flag).map(|w| w[1].clone()).collect()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("siteboot Server\n\nUSAGE:\n  siteboot_server [--config PATH] [--root PATH] [--port N] [--db-uri URI] [--set key=value]...\n\nOPTIONS:\n  --config PATH     Site config JSON (env: SITE_CONFIG, default config.json)\n  --root PATH       Module root holding models/ and public/ (env: SITE_ROOT, default .)\n  --port N          HTTP port (env: PORT, default 3000)\n  --db-uri URI      Data-store address; MONGO_URI / MONGO_URI_CI still take priority\n  --set key=value   Extra engine setting, repeatable; value parsed as JSON when possible\n\nENVIRONMENT:\n  SITE_ENV or NODE_ENV   development | staging | production (default production)\n  COOKIE_SECRET, AUTH0_DOMAIN, AUTH0_CLIENT_ID, AUTH0_CLIENT_SECRET, AUTH0_CALLBACK_URL, DEV_EMAIL\n");
        return Ok(());
    }

    let config = arg_value(&args, "--config")
        .or_else(|| env::var("SITE_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let root = arg_value(&args, "--root")
        .or_else(|| env::var("SITE_ROOT").ok())
        .unwrap_or_else(|| ".".to_string());
    let port = arg_value(&args, "--port")
        .and_then(|p| p.parse::<u16>().ok())
        .or_else(|| parse_port_env("PORT"))
        .unwrap_or(3000);

    let mut settings = EngineSettings::new();
    for pair in arg_values(&args, "--set") {
        let (key, value) = EngineSettings::parse_pair(&pair)?;
        settings.insert(key, value);
    }

    let mut request = BootRequest::new(config.as_str(), root.as_str()).with_engine_settings(settings);
    if let Some(uri) = arg_value(&args, "--db-uri") {
        request = request.with_data_store(uri);
    }

    let site = start(request, |site| {
        tracing::info!(target: "boot", "{} ready ({} mounts)", site.config.name, site.mount_log.len());
    })
    .await
    .with_context(|| format!("While booting site from {}", config))?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, site.into_router()).await?;
    Ok(())
}
