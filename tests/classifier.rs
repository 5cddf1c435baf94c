use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use vigil::app::classifier::{
    ChatRequest, ChatTransport, ClassifierClient, ClassifierError, RetryPolicy,
    TransportResponse, VisionClassifier,
};

const IMAGE_URL: &str = "https://cdn.example.com/photo.jpg";

/// Replays canned responses and records when each request arrived.
struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    calls: Mutex<Vec<(Instant, ChatRequest)>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<TransportResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }
}

#[async_trait]
impl<'a> ChatTransport for &'a ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ClassifierError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClassifierError::Request("script exhausted".to_string()))
    }
}

fn status(code: u16) -> TransportResponse {
    TransportResponse {
        status: code,
        body: json!({ "error": { "message": "try later" } }).to_string(),
    }
}

fn completion(content: &str) -> TransportResponse {
    TransportResponse {
        status: 200,
        body: json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string(),
    }
}

const VERDICT: &str = r#"{
    "is_safe": false,
    "overall_confidence": 0.82,
    "categories": {"nsfw": 0.1, "violence": 0.82},
    "reasoning": "visible weapon pointed at a person"
}"#;

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_then_give_up() {
    let transport = ScriptedTransport::new(vec![status(429), status(429), status(429)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let err = client.analyze(IMAGE_URL).await.unwrap_err();
    assert_eq!(
        err,
        ClassifierError::ExhaustedRetries {
            attempts: 3,
            last_status: 429
        }
    );

    let times = transport.call_times();
    assert_eq!(times.len(), 3);
    assert_eq!(times[1] - times[0], Duration::from_secs(1));
    assert_eq!(times[2] - times[1], Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn custom_retry_policy_bounds_attempts() {
    let transport = ScriptedTransport::new(vec![status(502), status(502), completion(VERDICT)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini").with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
    });
    assert_eq!(client.model(), "gpt-4o-mini");

    let err = client.analyze(IMAGE_URL).await.unwrap_err();
    assert_eq!(
        err,
        ClassifierError::ExhaustedRetries {
            attempts: 2,
            last_status: 502
        }
    );

    let times = transport.call_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn server_error_then_success() {
    let transport = ScriptedTransport::new(vec![status(503), completion(VERDICT)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let analysis = client.analyze(IMAGE_URL).await.unwrap();
    assert!(!analysis.is_safe);
    assert_eq!(analysis.overall_confidence, 0.82);
    assert_eq!(analysis.categories.violence, 0.82);
    assert_eq!(analysis.categories.hate, 0.0);
    assert_eq!(analysis.model_version, "gpt-4o-mini-2024-07-18");
    assert_eq!(transport.call_times().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let transport = ScriptedTransport::new(vec![status(400), completion(VERDICT)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let err = client.analyze(IMAGE_URL).await.unwrap_err();
    assert!(matches!(err, ClassifierError::Api { status: 400, .. }));
    assert!(!err.retryable());
    assert_eq!(transport.call_times().len(), 1);
}

#[tokio::test]
async fn prose_wrapped_verdict_is_parsed() {
    let content = format!("Here is my assessment:\n```json\n{}\n```\nLet me know.", VERDICT);
    let transport = ScriptedTransport::new(vec![completion(&content)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let analysis = client.analyze(IMAGE_URL).await.unwrap();
    assert_eq!(analysis.categories.dominant().1, 0.82);
    assert_eq!(analysis.reasoning, "visible weapon pointed at a person");
}

#[tokio::test]
async fn unparseable_content_is_malformed() {
    let transport = ScriptedTransport::new(vec![completion("I cannot help with that.")]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let err = client.analyze(IMAGE_URL).await.unwrap_err();
    assert!(matches!(err, ClassifierError::Malformed(_)));
    assert_eq!(transport.call_times().len(), 1);
}

#[tokio::test]
async fn missing_model_falls_back_to_configured() {
    let transport = ScriptedTransport::new(vec![TransportResponse {
        status: 200,
        body: json!({ "choices": [{ "message": { "content": VERDICT } }] }).to_string(),
    }]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let analysis = client.analyze(IMAGE_URL).await.unwrap();
    assert_eq!(analysis.model_version, "gpt-4o-mini");
}

#[tokio::test]
async fn invalid_url_never_reaches_transport() {
    let transport = ScriptedTransport::new(vec![completion(VERDICT)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");

    let err = client.analyze("file:///etc/passwd").await.unwrap_err();
    assert!(matches!(err, ClassifierError::InvalidImageUrl(_)));
    assert!(transport.call_times().is_empty());
}

#[tokio::test]
async fn request_uses_low_detail_and_fixed_sampling() {
    let transport = ScriptedTransport::new(vec![completion(VERDICT)]);
    let client = ClassifierClient::new(&transport, "gpt-4o-mini");
    client.analyze(IMAGE_URL).await.unwrap();

    let requests = transport.requests();
    let body = serde_json::to_value(&requests[0]).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["max_tokens"], 500);
    assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    assert_eq!(body["response_format"]["type"], "json_object");

    let content = body["messages"][0]["content"].as_array().unwrap();
    assert_eq!(content[0]["type"], "text");
    assert!(content[0]["text"].as_str().unwrap().contains("self_harm"));
    assert_eq!(content[1]["type"], "image_url");
    assert_eq!(content[1]["image_url"]["url"], IMAGE_URL);
    assert_eq!(content[1]["image_url"]["detail"], "low");
}
