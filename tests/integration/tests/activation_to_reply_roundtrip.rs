use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use spirit_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, CompanionConfig, GeminiCompanion, LlmClient,
    LlmClientFactory, Message, MessageRole,
};
use spirit_browser::{RoomEvent, ScriptedRoomAutomation, SessionTemplate};
use spirit_gateway::{build_activation_router, ACTIVATE_ENDPOINT, BOTS_ENDPOINT, DEACTIVATE_ENDPOINT};
use spirit_orchestrator::{OrchestratorConfig, SessionSupervisor, DEFAULT_GREETING};
use spirit_vault::CredentialVault;
use tokio::net::TcpListener;

#[derive(Default)]
struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<(String, ChatRequest)>>,
}

impl ScriptedProvider {
    fn with_responses(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|text| text.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(String, ChatRequest)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

struct KeyBoundClient {
    api_key: String,
    provider: Arc<ScriptedProvider>,
}

#[async_trait]
impl LlmClient for KeyBoundClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.provider
            .requests
            .lock()
            .expect("requests lock")
            .push((self.api_key.clone(), request));
        let text = self
            .provider
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| AiError::InvalidResponse("scripted response queue exhausted".into()))?;
        Ok(ChatResponse {
            message: Message::assistant_text(text),
            finish_reason: Some("STOP".to_string()),
            usage: ChatUsage::default(),
        })
    }
}

struct ScriptedFactory {
    provider: Arc<ScriptedProvider>,
}

impl LlmClientFactory for ScriptedFactory {
    fn client_for(&self, api_key: &str) -> Result<Arc<dyn LlmClient>, AiError> {
        Ok(Arc::new(KeyBoundClient {
            api_key: api_key.to_string(),
            provider: self.provider.clone(),
        }))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn integration_activation_drives_room_replies_through_companion_prompt() {
    let automation = ScriptedRoomAutomation::new();
    let provider = ScriptedProvider::with_responses(&["Hi Mia! Great to see you."]);
    let companion = Arc::new(GeminiCompanion::new(
        Arc::new(ScriptedFactory {
            provider: provider.clone(),
        }),
        CompanionConfig {
            persona: "You are a friendly room companion.".to_string(),
            ..CompanionConfig::default()
        },
    ));
    let supervisor = Arc::new(SessionSupervisor::new(
        OrchestratorConfig {
            poll_interval: Duration::from_millis(10),
            post_send_delay: Duration::ZERO,
            teardown_timeout: Duration::from_secs(1),
            ..OrchestratorConfig::default()
        },
        Arc::new(CredentialVault::new("integration-base-secret").expect("vault")),
        Arc::new(automation.clone()),
        SessionTemplate::new(json!({ "cookies": [], "origins": [] })),
        companion,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = build_activation_router(supervisor.clone());
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let client = reqwest::Client::new();

    let activated = client
        .post(format!("http://{addr}{ACTIVATE_ENDPOINT}"))
        .json(&json!({
            "subscriptionId": "tenant-integration",
            "roomLink": "https://www.free4talk.com/room/lounge-7?key=31",
            "geminiKey": "AIza-integration-key",
        }))
        .send()
        .await
        .expect("activate")
        .json::<Value>()
        .await
        .expect("parse activate");
    assert_eq!(activated["roomKey"], "lounge-7");
    assert_eq!(automation.sent_texts("lounge-7"), vec![DEFAULT_GREETING]);

    automation.push_event("lounge-7", RoomEvent::public("Leo", "morning everyone"));
    automation.push_event("lounge-7", RoomEvent::public("Avatar Spirit", "echo of myself?"));
    automation.push_event("lounge-7", RoomEvent::public("Mia", "hey spirit, how are you"));
    assert!(wait_until(|| automation.sent_texts("lounge-7").len() == 2).await);
    assert_eq!(
        automation.sent_texts("lounge-7")[1],
        "Hi Mia! Great to see you."
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let (api_key, request) = &requests[0];
    assert_eq!(api_key, "AIza-integration-key");
    assert_eq!(request.messages[0].role, MessageRole::System);
    assert_eq!(
        request.messages[0].text_content(),
        "You are a friendly room companion."
    );
    let prompt = request.messages[1].text_content();
    assert!(prompt.contains("Leo: morning everyone"));
    assert!(!prompt.contains("echo of myself"));
    assert!(prompt.ends_with("Mia: hey spirit, how are you\nAvatar Spirit:"));

    assert!(wait_until(|| supervisor.list()[0].history_len == 3).await);
    let bots = client
        .get(format!("http://{addr}{BOTS_ENDPOINT}"))
        .send()
        .await
        .expect("bots")
        .json::<Value>()
        .await
        .expect("parse bots");
    assert_eq!(bots["bots"][0]["messageCount"], 3);

    let deactivated = client
        .post(format!("http://{addr}{DEACTIVATE_ENDPOINT}"))
        .json(&json!({ "subscriptionId": "tenant-integration" }))
        .send()
        .await
        .expect("deactivate");
    assert!(deactivated.status().is_success());
    assert_eq!(supervisor.active_count(), 0);
    assert_eq!(automation.open_handles(), 0);
    server.abort();
}

#[tokio::test]
async fn integration_provider_failure_keeps_room_silent_and_session_alive() {
    let automation = ScriptedRoomAutomation::new();
    let provider = ScriptedProvider::with_responses(&[]);
    let supervisor = SessionSupervisor::new(
        OrchestratorConfig {
            poll_interval: Duration::from_millis(10),
            post_send_delay: Duration::ZERO,
            greeting: None,
            ..OrchestratorConfig::default()
        },
        Arc::new(CredentialVault::new("integration-base-secret").expect("vault")),
        Arc::new(automation.clone()),
        SessionTemplate::new(json!({})),
        Arc::new(GeminiCompanion::new(
            Arc::new(ScriptedFactory {
                provider: provider.clone(),
            }),
            CompanionConfig::default(),
        )),
    );
    supervisor
        .activate(spirit_orchestrator::ActivationRequest {
            tenant_id: "tenant-quiet".to_string(),
            room_link: "room/quiet".to_string(),
            credential: "AIza-quiet".to_string(),
        })
        .await
        .expect("activate");

    automation.push_event("quiet", RoomEvent::public("Mia", "bot, are you there?"));
    assert!(wait_until(|| provider.requests().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(automation.sent_texts("quiet").is_empty());
    assert!(supervisor.registry().contains("tenant-quiet"));

    let report = supervisor.shutdown_all().await;
    assert_eq!(report.stopped, 1);
}
