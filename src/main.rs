//! voice-relay: notification triage and multi-device push relay.

mod api;
mod classifier;
mod config;
mod fanout;
mod history;
mod ollama;
mod push;
mod registry;
mod relay;
mod speech;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::classifier::Classifier;
use crate::history::ConversationLog;
use crate::ollama::OllamaClient;
use crate::push::fcm::FcmChannel;
use crate::push::{PushChannel, PushDispatcher};
use crate::registry::DeviceRegistry;
use crate::relay::Relay;
use crate::speech::{HttpSpeaker, Silent, SpeechOutput};

#[derive(Parser, Debug)]
#[command(name = "voice-relay", about = "Notification triage and multi-device push relay")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Run without a push channel (every delivery reports failure)
    #[arg(long)]
    no_push: bool,

    /// Disable Ollama rewrites and chat replies
    #[arg(long)]
    no_ai: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (keep HTTP client internals quiet)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("voice-relay starting");

    let mut config = config::Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_push {
        config.push.enabled = false;
    }
    info!("Push config: {:?}", config.push);

    // Push channel: missing credentials leave the relay in no-push mode
    let channel: Option<Arc<dyn PushChannel>> = match FcmChannel::from_config(&config.push) {
        Ok(Some(channel)) => Some(Arc::new(channel)),
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to set up FCM channel: {e}");
            None
        }
    };
    let dispatcher = PushDispatcher::new(channel, &config.push);

    let ollama = if args.no_ai {
        info!("AI disabled by --no-ai");
        None
    } else {
        Some(Arc::new(OllamaClient::new(config.ollama.clone())?))
    };

    let mut classifier = Classifier::new(&config.classifier);
    if let Some(client) = &ollama {
        if config.classifier.ai_rewrite_enabled {
            classifier = classifier.with_rewriter(client.clone());
        }
    }
    info!(
        "Classifier: filtering={}, ai_rewrite={}",
        classifier.filtering_enabled(),
        classifier.ai_enabled()
    );

    let speech: Arc<dyn SpeechOutput> = if config.speech.enabled {
        info!("Speech output via {}", config.speech.url);
        Arc::new(HttpSpeaker::new(&config.speech)?)
    } else {
        Arc::new(Silent)
    };

    let log = ConversationLog::new(config.history.resolved_dir(), config.history.enabled);

    let mut relay = Relay::new(
        DeviceRegistry::new(),
        classifier,
        dispatcher,
        speech,
        log,
        config.push.welcome_message.clone(),
    );
    if let Some(client) = ollama {
        relay = relay.with_chat(client);
    }

    api::serve(Arc::new(relay), &config.server.host, config.server.port).await?;

    Ok(())
}
