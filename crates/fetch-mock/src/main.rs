//! fetch-mock CLI
//!
//! Usage:
//!   fetch-mock check routes.yaml
//!   fetch-mock try routes.yaml http://api.test/users/1 -X GET -H accept:application/json

use anyhow::Context;
use clap::{Parser, Subcommand};
use fetch_mock::{FetchMock, RequestInit, RoutesFile};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "fetch-mock")]
#[command(author, version, about = "Load and exercise fetch-mock routes files", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a routes file, compile every route and print a summary
    Check { file: PathBuf },
    /// Dispatch one call against the routes in a file
    Try {
        file: PathBuf,
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request header as `name:value`, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        #[arg(short = 'd', long)]
        data: Option<String>,
    },
}

fn load(file: &Path) -> anyhow::Result<FetchMock> {
    let routes = RoutesFile::from_file(file)?;
    FetchMock::from_routes_file(&routes, Vec::new())
        .with_context(|| format!("failed to compile routes in {}", file.display()))
}

fn check(file: &Path) -> anyhow::Result<()> {
    let mock = load(file)?;
    let routes = mock.routes();
    println!("{}: {} route(s)", file.display(), routes.len());
    for (index, route) in routes.iter().enumerate() {
        let repeat = route
            .repeat()
            .map(|n| format!(" x{n}"))
            .unwrap_or_default();
        let sticky = if route.is_sticky() { " (sticky)" } else { "" };
        println!("  {:>3}. {}{}{}", index + 1, route.identifier(), repeat, sticky);
    }
    if let Some(fallback) = mock.fallback_route() {
        println!("  fallback: {:?}", fallback.spec().response);
    }
    Ok(())
}

async fn try_call(
    file: &Path,
    url: String,
    method: String,
    headers: Vec<String>,
    data: Option<String>,
) -> anyhow::Result<()> {
    let mock = load(file)?;
    let mut init = RequestInit::new().method(method);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header {header:?} is not in name:value form"))?;
        init = init.header(name.trim(), value.trim());
    }
    if let Some(data) = data {
        init = init.body(data);
    }

    let response = mock.fetch(url, init)?.await?;
    let call = mock
        .last_call(fetch_mock::CallFilter::All)?
        .context("call was not recorded")?;
    println!(
        "{} {}  [{}]",
        response.status().as_u16(),
        response.status_text(),
        call.route().map(|r| r.identifier()).unwrap_or("pass-through")
    );
    for (name, value) in response.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();
    println!("{}", response.text().await?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match Args::parse().command {
        Command::Check { file } => check(&file),
        Command::Try {
            file,
            url,
            method,
            headers,
            data,
        } => try_call(&file, url, method, headers, data).await,
    }
}
