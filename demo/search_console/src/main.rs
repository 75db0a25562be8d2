mod config;
mod highlight;

use std::time::Duration;

use colored::Colorize;
use config::ConsoleConfig;
use highlight::Highlighter;
use quarry_core::telemetry::init_tracing;
use quarry_core::{ChatCompletionResponse, Message};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("warn,search_console=info");

    let cfg = ConsoleConfig::load()?;
    let highlighter = Highlighter::new()?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.workspace.request_timeout_ms))
        .build()?;

    info!(
        target: "search_console",
        endpoint = %cfg.serving_endpoint,
        index = %cfg.vs_index_name,
        "Starting search console"
    );

    println!("{}", cfg.title.bold());
    if !cfg.description.is_empty() {
        println!("{}", cfg.description);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&cfg.example).await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        match search(&http, &cfg, query).await {
            Ok(resp) => render(&highlighter, query, &resp),
            Err(e) => {
                error!(target: "search_console", error = %e, "Request failed");
                eprintln!("{} {e}", "Error making request:".red());
            }
        }
    }

    Ok(())
}

async fn prompt(example: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let hint = if example.is_empty() {
        "Enter your query: ".to_string()
    } else {
        format!("Enter your query (e.g. {example}): ")
    };
    stdout.write_all(hint.as_bytes()).await?;
    stdout.flush().await
}

async fn search(
    http: &reqwest::Client,
    cfg: &ConsoleConfig,
    query: &str,
) -> Result<ChatCompletionResponse, reqwest::Error> {
    let mut req = http.post(cfg.invocations_url());
    if let Some(token) = &cfg.workspace.token {
        req = req.bearer_auth(token);
    }
    req.json(&json!({ "messages": [Message::user(query)] }))
        .send()
        .await?
        .error_for_status()?
        .json::<ChatCompletionResponse>()
        .await
}

fn render(highlighter: &Highlighter, query: &str, resp: &ChatCompletionResponse) {
    let documents = &resp.custom_outputs.documents;

    println!("\n{}", "Answer".bold().underline());
    println!("{}", highlighter.highlight(resp.answer(), query));

    println!("\n{}", "Retrieved Documents".bold().underline());
    println!("I've found {} documents related to your query.", documents.len());

    for (i, doc) in documents.iter().enumerate() {
        let content = doc.get("page_content").and_then(Value::as_str).unwrap_or_default();
        let metadata = doc.get("metadata").cloned().unwrap_or(Value::Null);
        // First metadata column is the document URI
        let label = metadata
            .as_object()
            .and_then(|m| m.values().next())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| (i + 1).to_string());

        println!("\n{}", format!("Document {label}").cyan().bold());
        println!("{}", highlighter.highlight(content, query));
        println!("{}", "Metadata:".bold());
        println!(
            "{}",
            serde_json::to_string_pretty(&metadata).unwrap_or_else(|_| metadata.to_string())
        );
    }
    println!();
}
