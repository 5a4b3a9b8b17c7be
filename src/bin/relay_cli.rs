//! relay-cli: command-line client for a running voice-relay.
//!
//! Sends one request to the relay API and prints the JSON response.
//! Exits non-zero when the request fails or the relay answers with an error.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::{json, Value};

const DEFAULT_URL: &str = "http://localhost:8000";

#[derive(Parser, Debug)]
#[command(name = "relay-cli", about = "Send messages and notifications through voice-relay")]
struct Cli {
    /// Relay base URL
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push a message to one device
    Send {
        message: String,
        #[arg(long, default_value = "default")]
        device: String,
        #[arg(long)]
        silent: bool,
    },
    /// Push a message to every registered device
    Broadcast {
        message: String,
        #[arg(long)]
        silent: bool,
    },
    /// Submit a phone notification for triage
    Notify {
        app: String,
        text: String,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        silent: bool,
    },
    /// Ask the AI and push its reply
    Chat {
        text: String,
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        spoken: bool,
        #[arg(long)]
        silent: bool,
    },
    /// Register a device push token
    Register {
        device_id: String,
        push_token: String,
        #[arg(long)]
        device_type: Option<String>,
        #[arg(long)]
        app_version: Option<String>,
    },
    /// List registered devices
    Devices,
    /// Show relay status
    Status,
}

/// Path and optional JSON body for a command. A body means POST.
fn request_for(command: &Command) -> (&'static str, Option<Value>) {
    match command {
        Command::Send {
            message,
            device,
            silent,
        } => (
            "/send_message",
            Some(json!({
                "message": message,
                "device_id": device,
                "type": "cli_message",
                "silent": silent,
            })),
        ),
        Command::Broadcast { message, silent } => (
            "/broadcast_message",
            Some(json!({ "message": message, "silent": silent })),
        ),
        Command::Notify {
            app,
            text,
            sender,
            device,
            silent,
        } => {
            let mut body = json!({ "app": app, "text": text, "silent": silent });
            if let Some(sender) = sender {
                body["sender"] = json!(sender);
            }
            if let Some(device) = device {
                body["device_id"] = json!(device);
            }
            ("/notify", Some(body))
        }
        Command::Chat {
            text,
            device,
            spoken,
            silent,
        } => {
            let mut body = json!({ "text": text, "spoken": spoken, "silent": silent });
            if let Some(device) = device {
                body["device_id"] = json!(device);
            }
            ("/chat", Some(body))
        }
        Command::Register {
            device_id,
            push_token,
            device_type,
            app_version,
        } => {
            let mut body = json!({ "device_id": device_id, "push_token": push_token });
            if let Some(device_type) = device_type {
                body["device_type"] = json!(device_type);
            }
            if let Some(app_version) = app_version {
                body["app_version"] = json!(app_version);
            }
            ("/register_device", Some(body))
        }
        Command::Devices => ("/devices", None),
        Command::Status => ("/status", None),
    }
}

/// The relay reports failures in-band as `{error}`, `{push_error}` or
/// `{status: "error"}`.
fn error_message(response: &Value) -> Option<String> {
    if let Some(error) = response.get("error").or_else(|| response.get("push_error")) {
        return Some(error.as_str().map_or_else(|| error.to_string(), String::from));
    }
    if response.get("status").and_then(Value::as_str) == Some("error") {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        return Some(message.to_string());
    }
    None
}

async fn execute(client: &Client, base: &str, command: &Command) -> Result<Value, reqwest::Error> {
    let (path, body) = request_for(command);
    let url = format!("{}{path}", base.trim_end_matches('/'));
    let request = match body {
        Some(body) => client.post(url).json(&body),
        None => client.get(url),
    };
    request.send().await?.error_for_status()?.json().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let client = match Client::builder().timeout(Duration::from_secs(60)).build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let response = match execute(&client, &cli.url, &cli.command).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error: request failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(error) = error_message(&response) {
        eprintln!("Error: {error}");
        return ExitCode::FAILURE;
    }

    match serde_json::to_string_pretty(&response) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{response}"),
    }
    ExitCode::SUCCESS
}
