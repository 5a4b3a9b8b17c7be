//! Spoken output through a local TTS HTTP API.
//!
//! Speaks via the code-speaker style `/speak` endpoint. Calls are
//! fire-and-forget: the request runs on its own task and failures only
//! reach the log.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SpeechConfig;

pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
    summarize: bool,
    event_type: &'a str,
    start_reminder: bool,
}

pub struct HttpSpeaker {
    client: Client,
    url: String,
}

impl HttpSpeaker {
    pub fn new(config: &SpeechConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(300))
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/speak", config.url.trim_end_matches('/')),
        })
    }
}

impl SpeechOutput for HttpSpeaker {
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let request = self.client.post(&self.url).json(&SpeakRequest {
            text,
            summarize: true,
            event_type: "relay",
            start_reminder: false,
        });

        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => debug!("Speech request accepted"),
                Ok(resp) => warn!("TTS API returned status {}", resp.status()),
                Err(e) => warn!("TTS API request failed: {e}"),
            }
        });
    }
}

/// Used when speech output is disabled.
pub struct Silent;

impl SpeechOutput for Silent {
    fn speak(&self, text: &str) {
        debug!("Speech disabled, not speaking {} chars", text.len());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn speak_posts_to_tts_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speak"))
            .and(body_partial_json(json!({ "text": "You have a message", "event_type": "relay" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "speaking" })))
            .expect(1)
            .mount(&server)
            .await;

        let speaker = HttpSpeaker::new(&SpeechConfig {
            enabled: true,
            url: server.uri(),
        })
        .unwrap();
        speaker.speak("You have a message");

        // The request runs detached; wait for it to land.
        for _ in 0..50 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_api_does_not_panic() {
        let speaker = HttpSpeaker::new(&SpeechConfig {
            enabled: true,
            url: "http://127.0.0.1:1".into(),
        })
        .unwrap();
        speaker.speak("nobody is listening");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
