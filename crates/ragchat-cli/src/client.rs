//! Client for a running ragchat API server.

use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::ChatCommand;

/// Thin wrapper over the REST endpoints, returning raw JSON bodies.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Decode a JSON body, turning error statuses into their `detail`.
    async fn read(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await.context("Invalid JSON response")?;

        if !status.is_success() {
            let detail = body
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("{} ({})", detail, status.as_u16());
        }

        Ok(body)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::read(response).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<Value> {
        self.get("/status").await
    }

    pub async fn documents(&self) -> Result<Value> {
        self.get("/documents").await
    }

    pub async fn history(&self, limit: i64) -> Result<Value> {
        self.get(&format!("/history?limit={}", limit)).await
    }

    pub async fn chat(&self, message: &str, include_context: bool) -> Result<Value> {
        let response = self
            .http
            .post(self.url("/chat"))
            .json(&json!({ "message": message, "include_context": include_context }))
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn clear_history(&self) -> Result<Value> {
        let response = self.http.delete(self.url("/history")).send().await?;
        Self::read(response).await
    }

    pub async fn reload(&self) -> Result<Value> {
        let response = self.http.post(self.url("/reload")).send().await?;
        Self::read(response).await
    }
}

/// Run the demo sequence or the interactive client.
pub async fn run(url: &str, demo: bool) -> Result<()> {
    let client = ApiClient::new(url)?;

    client.health().await.map_err(|e| {
        anyhow!(
            "Cannot reach the API server at {} ({}). Start it with `ragchat serve`.",
            url,
            e
        )
    })?;

    if demo {
        run_demo(&client).await
    } else {
        run_interactive(&client).await
    }
}

async fn run_demo(client: &ApiClient) -> Result<()> {
    println!("ragchat API demo against {}", client.base_url);

    println!("\n1. Status");
    print_json(&client.status().await?);

    println!("\n2. Documents");
    print_json(&client.documents().await?);

    println!("\n3. Chat");
    print_json(&client.chat("What documents do you have access to?", true).await?);

    println!("\n4. History");
    print_json(&client.history(5).await?);

    Ok(())
}

async fn run_interactive(client: &ApiClient) -> Result<()> {
    println!("Connected to {}", client.base_url);
    println!("Commands: status, docs, history, clear, reload, help, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nGoodbye!");
            break;
        };

        let result = match line.trim().to_lowercase().as_str() {
            "status" => client.status().await.map(|v| print_json(&v)),
            "docs" => client.documents().await.map(|v| print_json(&v)),
            _ => match ChatCommand::parse(&line) {
                ChatCommand::Empty => continue,
                ChatCommand::Quit => {
                    println!("Goodbye!");
                    break;
                }
                ChatCommand::Help => {
                    println!("status   server status");
                    println!("docs     list uploaded documents");
                    println!("history  recent chat history");
                    println!("clear    clear chat history");
                    println!("reload   rebuild the index in the background");
                    println!("quit     exit");
                    Ok(())
                }
                ChatCommand::History => client.history(5).await.map(|v| print_json(&v)),
                ChatCommand::Clear => client.clear_history().await.map(|v| print_message(&v)),
                ChatCommand::Reload => client.reload().await.map(|v| print_message(&v)),
                ChatCommand::Ask(question) => client.chat(&question, true).await.map(|v| {
                    println!("\nBot: {}", v["response"].as_str().unwrap_or_default());
                }),
            },
        };

        if let Err(e) = result {
            println!("Error: {}", e);
        }
    }

    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn print_message(value: &Value) {
    println!("{}", value["message"].as_str().unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_chat_posts_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(json!({ "message": "hi", "include_context": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "hello",
                "session_id": "session_1.0",
                "timestamp": "2024-01-01T00:00:00Z",
                "include_context": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let body = client.chat("hi", true).await.unwrap();

        assert_eq!(body["response"], "hello");
    }

    #[tokio::test]
    async fn test_error_detail_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": "Service unavailable",
                "detail": "Chatbot not initialized"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/", server.uri())).unwrap();
        let err = client.status().await.unwrap_err();

        assert!(err.to_string().contains("Chatbot not initialized"));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_history_limit_param() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/history"))
            .and(query_param("limit", "5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "history": [], "total_count": 0 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        assert_eq!(client.history(5).await.unwrap()["total_count"], 0);
    }
}
