//! Relay service: ties the classifier, registry and fan-out together.
//!
//! Every HTTP handler is a thin shim over one method here. Methods return
//! domain outcomes; the API layer decides their wire shape.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::{Classification, Classifier, Notification};
use crate::fanout::{DeliveryReport, FanOut, FanOutOutcome, Target};
use crate::history::{ConversationLog, ConversationRecord};
use crate::ollama::ChatResponder;
use crate::push::PushDispatcher;
use crate::registry::{DeviceMetadata, DeviceRecord, DeviceRegistry};
use crate::speech::SpeechOutput;

pub const TYPE_NOTIFICATION: &str = "notification";
pub const TYPE_CHAT: &str = "ai_response";
pub const TYPE_SERVER_MESSAGE: &str = "server_message";
pub const TYPE_BROADCAST: &str = "broadcast";
pub const TYPE_WELCOME: &str = "welcome";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub classification: Classification,
    /// `None` when the notification was rejected and nothing was pushed.
    pub delivery: Option<FanOutOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered { record: DeviceRecord, welcomed: bool },
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(bool),
    DeviceNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Replied {
        reply: String,
        spoken: bool,
        delivery: FanOutOutcome,
    },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    pub push_channel_configured: bool,
    pub registered_devices: usize,
    pub ai_enabled: bool,
    pub filter_enabled: bool,
}

impl RelayStatus {
    pub fn can_send_notifications(&self) -> bool {
        self.push_channel_configured && self.registered_devices > 0
    }
}

pub struct Relay {
    registry: DeviceRegistry,
    classifier: Classifier,
    fanout: FanOut,
    chat: Option<Arc<dyn ChatResponder>>,
    speech: Arc<dyn SpeechOutput>,
    log: ConversationLog,
    welcome_message: String,
}

impl Relay {
    pub fn new(
        registry: DeviceRegistry,
        classifier: Classifier,
        dispatcher: PushDispatcher,
        speech: Arc<dyn SpeechOutput>,
        log: ConversationLog,
        welcome_message: String,
    ) -> Self {
        let fanout = FanOut::new(registry.clone(), Arc::new(dispatcher));
        Self {
            registry,
            classifier,
            fanout,
            chat: None,
            speech,
            log,
            welcome_message,
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatResponder>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Classify a phone notification and push the accepted text.
    pub async fn handle_notification(
        &self,
        notification: &Notification,
        device_id: Option<&str>,
        silent: bool,
    ) -> NotifyOutcome {
        debug!(
            "Notification from {} (package {:?}, priority {:?}, timestamp {:?})",
            notification.app,
            notification.package_name,
            notification.priority,
            notification.timestamp
        );
        let classification = self.classifier.classify_with_rewrite(notification).await;

        let Some(text) = classification.text().map(str::to_string) else {
            info!(
                "Notification from {} {}",
                notification.app,
                classification.label()
            );
            return NotifyOutcome {
                classification,
                delivery: None,
            };
        };

        self.log.record(
            TYPE_NOTIFICATION,
            &format!("{}: {}", notification.app, notification.text),
            &text,
        );

        let target = Target::from_optional(device_id);
        let delivery = self
            .fanout
            .dispatch(&text, &target, TYPE_NOTIFICATION, silent)
            .await;

        NotifyOutcome {
            classification,
            delivery: Some(delivery),
        }
    }

    /// Register (or replace) a device and send it the welcome message.
    pub async fn register_device(
        &self,
        device_id: &str,
        push_token: &str,
        metadata: DeviceMetadata,
    ) -> RegisterOutcome {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return RegisterOutcome::Invalid("device_id is required");
        }
        if push_token.trim().is_empty() {
            return RegisterOutcome::Invalid("push token is required");
        }

        let record = self.registry.register(device_id, push_token.trim(), metadata);

        let dispatcher = self.fanout.dispatcher();
        let welcomed = if dispatcher.is_configured() && !self.welcome_message.is_empty() {
            dispatcher
                .send(&record.push_token, &self.welcome_message, TYPE_WELCOME, false)
                .await
        } else {
            false
        };

        RegisterOutcome::Registered { record, welcomed }
    }

    /// Push `message` to exactly one registered device.
    pub async fn send_message(
        &self,
        device_id: &str,
        message: &str,
        message_type: Option<&str>,
        silent: bool,
    ) -> SendOutcome {
        let device_id = device_id.trim();
        let target = Target::Device(device_id.to_string());
        let message_type = message_type.unwrap_or(TYPE_SERVER_MESSAGE);

        match self.fanout.dispatch(message, &target, message_type, silent).await {
            FanOutOutcome::DeviceNotFound(id) => SendOutcome::DeviceNotFound(id),
            FanOutOutcome::Completed(report) => {
                SendOutcome::Sent(report.get(device_id).unwrap_or(false))
            }
            FanOutOutcome::NoDevices => SendOutcome::Sent(false),
        }
    }

    /// Push `message` to every registered device. `None` when nothing is
    /// registered.
    pub async fn broadcast(
        &self,
        message: &str,
        message_type: Option<&str>,
        silent: bool,
    ) -> Option<DeliveryReport> {
        let message_type = message_type.unwrap_or(TYPE_BROADCAST);
        match self.fanout.dispatch(message, &Target::All, message_type, silent).await {
            FanOutOutcome::Completed(report) => Some(report),
            FanOutOutcome::NoDevices | FanOutOutcome::DeviceNotFound(_) => None,
        }
    }

    /// Ask the chat responder, then speak, log and push the reply.
    pub async fn chat(
        &self,
        text: &str,
        device_id: Option<&str>,
        spoken: bool,
        silent: bool,
    ) -> ChatOutcome {
        let prompt = if text.trim().is_empty() { "Hello" } else { text };

        let Some(chat) = &self.chat else {
            return ChatOutcome::Failed("AI chat is disabled".into());
        };
        let reply = match chat.reply(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat reply failed: {e}");
                return ChatOutcome::Failed(format!("Chat failed: {e}"));
            }
        };

        if spoken {
            self.speech.speak(&reply);
        }
        self.log.record("chat", prompt, &reply);

        let target = Target::from_optional(device_id);
        let delivery = self.fanout.dispatch(&reply, &target, TYPE_CHAT, silent).await;

        ChatOutcome::Replied {
            reply,
            spoken,
            delivery,
        }
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.all()
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            push_channel_configured: self.fanout.dispatcher().is_configured(),
            registered_devices: self.registry.len(),
            ai_enabled: self.classifier.ai_enabled() || self.chat.is_some(),
            filter_enabled: self.classifier.filtering_enabled(),
        }
    }

    pub fn conversations(&self, date: &str) -> (String, Vec<ConversationRecord>) {
        (ConversationLog::resolve_date(date), self.log.load(date))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::config::{ClassifierConfig, PushConfig};
    use crate::push::testing::RecordingChannel;
    use crate::speech::Silent;

    fn notification(app: &str, sender: Option<&str>, text: &str) -> Notification {
        Notification {
            app: app.into(),
            sender: sender.map(String::from),
            text: text.into(),
            package_name: None,
            timestamp: None,
            priority: None,
        }
    }

    #[tokio::test]
    async fn accepted_notification_is_pushed_and_logged() {
        let h = harness(RecordingChannel::default());
        h.relay.registry().register("phone", "tok-phone", DeviceMetadata::default());

        let whatsapp = notification("WhatsApp", Some("John Doe"), "Hey, free for lunch?");
        let outcome = h.relay.handle_notification(&whatsapp, None, false).await;

        assert_eq!(
            outcome.classification,
            Classification::Accepted("Message from John Doe on WhatsApp: Hey, free for lunch?".into())
        );
        let delivery = outcome.delivery.unwrap();
        assert_eq!(delivery.delivered_to(), vec!["phone"]);

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data["type"], TYPE_NOTIFICATION);

        let (_, records) = h.relay.conversations("today");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_text, "WhatsApp: Hey, free for lunch?");
    }

    #[tokio::test]
    async fn rejected_notification_pushes_nothing() {
        let h = harness(RecordingChannel::default());
        h.relay.registry().register("phone", "tok-phone", DeviceMetadata::default());

        let facebook = notification("Facebook", None, "Someone liked your post");
        let blocked = h.relay.handle_notification(&facebook, None, false).await;
        assert_eq!(blocked.classification, Classification::FilteredOut);
        assert_eq!(blocked.delivery, None);

        let sms = notification("SMS", None, "FREE prize! Click here now!");
        let spam = h.relay.handle_notification(&sms, None, false).await;
        assert_eq!(spam.classification, Classification::SpamFiltered);

        assert!(h.channel.sent().is_empty());
        assert!(h.relay.conversations("today").1.is_empty());
    }

    #[tokio::test]
    async fn notification_for_unknown_device_reports_not_found() {
        let h = harness(RecordingChannel::default());
        h.relay.registry().register("phone", "tok-phone", DeviceMetadata::default());

        let whatsapp = notification("WhatsApp", Some("Ann"), "On my way");
        let outcome = h.relay.handle_notification(&whatsapp, Some("ghost"), false).await;

        assert!(matches!(outcome.classification, Classification::Accepted(_)));
        assert_eq!(outcome.delivery, Some(FanOutOutcome::DeviceNotFound("ghost".into())));
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn notification_without_devices_reports_no_devices() {
        let h = harness(RecordingChannel::default());
        let sms = notification("SMS", Some("Bank"), "Your card was used");
        let outcome = h.relay.handle_notification(&sms, None, false).await;
        assert_eq!(outcome.delivery, Some(FanOutOutcome::NoDevices));
    }

    #[tokio::test]
    async fn registration_sends_welcome() {
        let h = harness(RecordingChannel::default());

        let RegisterOutcome::Registered { record, welcomed } = h
            .relay
            .register_device("pixel", "tok-pixel", DeviceMetadata::default())
            .await
        else {
            panic!("expected registration");
        };

        assert!(welcomed);
        assert_eq!(record.device_id, "pixel");
        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data["type"], TYPE_WELCOME);
        assert_eq!(sent[0].token, "tok-pixel");
    }

    #[tokio::test]
    async fn registration_rejects_blank_fields() {
        let h = harness(RecordingChannel::default());
        assert!(matches!(
            h.relay.register_device(" ", "tok", DeviceMetadata::default()).await,
            RegisterOutcome::Invalid(_)
        ));
        assert!(matches!(
            h.relay.register_device("pixel", "", DeviceMetadata::default()).await,
            RegisterOutcome::Invalid(_)
        ));
        assert!(h.relay.registry().is_empty());
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn send_message_to_unknown_device() {
        let h = harness(RecordingChannel::default());
        let outcome = h.relay.send_message("ghost", "hi", None, false).await;
        assert_eq!(outcome, SendOutcome::DeviceNotFound("ghost".into()));
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn send_message_reports_provider_failure() {
        let h = harness(RecordingChannel::failing_for(&["tok-bad"]));
        h.relay.registry().register("bad", "tok-bad", DeviceMetadata::default());
        h.relay.registry().register("good", "tok-good", DeviceMetadata::default());

        assert_eq!(h.relay.send_message("bad", "hi", None, false).await, SendOutcome::Sent(false));
        let outcome = h.relay.send_message("good", "hi", Some("custom"), true).await;
        assert_eq!(outcome, SendOutcome::Sent(true));

        let sent = h.channel.sent();
        assert_eq!(sent[1].data["type"], "custom");
        assert!(sent[1].is_silent());
    }

    #[tokio::test]
    async fn broadcast_with_no_devices() {
        let h = harness(RecordingChannel::default());
        assert!(h.relay.broadcast("hi", None, false).await.is_none());
    }

    #[tokio::test]
    async fn chat_speaks_logs_and_pushes() {
        let h = harness(RecordingChannel::default());
        h.relay.registry().register("a", "tok-a", DeviceMetadata::default());
        h.relay.registry().register("b", "tok-b", DeviceMetadata::default());

        let ChatOutcome::Replied {
            reply,
            spoken,
            delivery,
        } = h.relay.chat("What time is it?", Some("b"), true, false).await
        else {
            panic!("expected a reply");
        };

        assert_eq!(reply, "You said: What time is it?");
        assert!(spoken);
        assert_eq!(delivery.delivered_to(), vec!["b"]);
        assert_eq!(h.speaker.spoken.lock().unwrap().len(), 1);
        assert_eq!(h.relay.conversations("today").1[0].kind, "chat");
        assert_eq!(h.channel.sent()[0].data["type"], TYPE_CHAT);
    }

    #[tokio::test]
    async fn chat_to_unknown_device_reports_not_found() {
        let h = harness(RecordingChannel::default());
        h.relay.registry().register("a", "tok-a", DeviceMetadata::default());

        let ChatOutcome::Replied { delivery, .. } =
            h.relay.chat("hello", Some("ghost"), false, false).await
        else {
            panic!("expected a reply");
        };
        assert_eq!(delivery, FanOutOutcome::DeviceNotFound("ghost".into()));
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn chat_failure_is_reported_without_push() {
        let h = harness(RecordingChannel::default());
        h.relay.registry().register("a", "tok-a", DeviceMetadata::default());
        let relay = Relay::new(
            h.relay.registry().clone(),
            Classifier::new(&ClassifierConfig::default()),
            PushDispatcher::new(None, &PushConfig::default()),
            Arc::new(Silent),
            ConversationLog::new(h.log_dir.path().to_path_buf(), true),
            String::new(),
        )
        .with_chat(Arc::new(DownChat));

        let ChatOutcome::Failed(error) = relay.chat("hi", None, false, false).await else {
            panic!("expected failure");
        };
        assert!(error.contains("timed out"));
    }

    #[tokio::test]
    async fn status_reflects_registry_and_channel() {
        let h = harness(RecordingChannel::default());
        let status = h.relay.status();
        assert!(status.push_channel_configured);
        assert!(!status.can_send_notifications());
        assert!(status.filter_enabled);

        h.relay.registry().register("a", "tok-a", DeviceMetadata::default());
        let status = h.relay.status();
        assert_eq!(status.registered_devices, 1);
        assert!(status.can_send_notifications());
    }
}
