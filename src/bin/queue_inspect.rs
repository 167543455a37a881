use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use modfeed::client::{build_http, parse_base_url};
use modfeed::config;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(about = "Fetch one raw page of a moderation queue and print it")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Queue path, e.g. api/admin/reports
    #[arg(long, default_value = "api/admin/verifications")]
    path: String,

    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    page: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let http = build_http(cfg.api.session_cookie.as_deref(), cfg.api.user_agent.as_deref())?;
    let mut url = parse_base_url(&cfg.api.base_url)?.join(args.path.trim_start_matches('/'))?;
    url.query_pairs_mut()
        .append_pair("page", &args.page.to_string())
        .append_pair("size", &cfg.queues.page_size.to_string())
        .append_pair("sort", &cfg.queues.sort);

    let res = http.get(url.clone()).send().await?;
    let status = res.status();
    let body = res.text().await?;
    if !status.is_success() {
        bail!("{} returned {}: {}", url, status, body);
    }

    let page: Value = serde_json::from_str(&body)?;
    println!("GET {} -> {}", url, status);
    println!(
        "page {} (last: {}, total: {})",
        page["number"], page["last"], page["totalElements"]
    );
    match page["content"].as_array() {
        Some(items) => {
            for item in items {
                println!("{}", serde_json::to_string(item)?);
            }
        }
        None => println!(
            "no `content` array in response:\n{}",
            serde_json::to_string_pretty(&page)?
        ),
    }
    Ok(())
}
