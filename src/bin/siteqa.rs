//! Line-oriented REPL over the site Q&A pipeline.
//!
//! `:index <url>` crawls and indexes a page, anything else is a question
//! against the active index.

use std::io::Write;

use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use siteqa::{Config, QaError, Session};

#[tokio::main]
async fn main() -> Result<(), QaError> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;
    let mut session = Session::new(&config)?;

    println!("siteqa — index a website, then ask questions about it");
    println!("commands: :index <url>   :clear (history)   :reset (collections)   :quit");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            ":quit" | ":q" => break,
            ":clear" => {
                session.clear_history();
                println!("chat history cleared");
            }
            ":reset" => match session.clear_collections().await {
                Ok(()) => println!("all collections cleared"),
                Err(err) => println!("error: {err}"),
            },
            _ if input.starts_with(":index") => {
                let url = input.trim_start_matches(":index").trim();
                if url.is_empty() {
                    println!("usage: :index <url>");
                } else {
                    index_site(&mut session, url).await;
                }
            }
            question => {
                let answer = session.ask(question).await;
                println!("{answer}");
            }
        }
        prompt()?;
    }

    Ok(())
}

async fn index_site(session: &mut Session, url: &str) {
    println!("crawling and indexing {url} ...");
    match session.index_site(url).await {
        Ok(summary) => println!(
            "indexed {} chunks into collection '{}' ({} embeddings)",
            summary.chunks, summary.collection, summary.embedder
        ),
        Err(err) => println!("error indexing website: {err}"),
    }
}

fn prompt() -> Result<(), QaError> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
