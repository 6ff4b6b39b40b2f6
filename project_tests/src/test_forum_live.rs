//! # Forum Live Data Test
//!
//! Logs in (or stays anonymous when `MV_USER` is unset), resolves a real
//! thread and prints what the parser extracts from one of its pages.

use clap::Parser;
use lib_threadwatch::configs::ForumConfig;
use lib_threadwatch::forum::page;
use lib_threadwatch::loggers::{LoggingOptions, setup_logging};
use lib_threadwatch::retrieve::{ForumClient, RemoteSource};
use lib_threadwatch::ThreadAddress;

#[derive(Parser, Debug)]
#[clap(about = "Fetch one page of a forum thread and print the parsed posts")]
struct Args {
    /// Any link into the thread.
    url: String,
    /// Page to read.
    #[clap(long, default_value_t = 1)]
    page: u32,
    #[clap(long, env = "MV_USER")]
    user: Option<String>,
    #[clap(long, env = "MV_PASS", hide_env_values = true)]
    pass: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = setup_logging(&LoggingOptions {
        app_name: "test_forum_live".to_string(),
        level: "debug".to_string(),
        ..LoggingOptions::default()
    })?;

    let address = ThreadAddress::parse(&args.url)?;
    let client = ForumClient::new(ForumConfig {
        username: args.user.unwrap_or_default(),
        password: args.pass.unwrap_or_default(),
        ..ForumConfig::default()
    })?;

    println!("[*] Authenticating...");
    client.authenticate().await?;

    println!("[*] Resolving {address}");
    let first = client.fetch(address.as_str()).await?;
    let info = page::parse_thread_info(&first, address.as_str())?;
    println!("[INFO] {info:?}");

    let url = address.page_url(args.page);
    let html = client.fetch(&url).await?;
    let reported = page::parse_page_number(&html, &url)?;
    println!("[INFO] requested page {}, forum rendered page {reported}", args.page);

    println!("-----------------------------------------------");
    for post in page::parse_posts(&html) {
        match post {
            Ok(post) => println!("#{} {}: {}", post.sequence, post.message.author, post.message.body),
            Err(e) => println!("[WARN] {e}"),
        }
    }
    println!("-----------------------------------------------");
    Ok(())
}
