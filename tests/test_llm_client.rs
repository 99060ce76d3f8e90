//! LLM-backed collaborators against an in-process mock of the
//! chat-completions endpoint.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use hirepipe::collaborators::{LlmOfferRenderer, OfferLetters};
use hirepipe::evaluator::{EvalContext, Evaluator, GuardedEvaluator, LlmEvaluator, ScoringMode};
use hirepipe::llm::{LlmClient, LlmError, LlmSettings};
use hirepipe::pipeline::types::{JobProfile, ResumeUpload};
use hirepipe::pipeline::{Application, CandidateRecord, Recommendation, Stage};
use hirepipe::questions::{LlmQuestionSource, QuestionGenerator, QuestionPool};

fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).into_owned();
        if let Some(end) = text.find("\r\n\r\n") {
            let len = text[..end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    if k.eq_ignore_ascii_case("content-length") {
                        v.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if data.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Serve one canned response per connection, in order, and hand back the
/// raw requests once every response was used.
fn spawn_mock_server(responses: Vec<(u16, String)>) -> (String, std::thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = std::thread::spawn(move || {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            requests.push(read_request(&mut stream));
            let reason = match status {
                200 => "OK",
                401 => "Unauthorized",
                429 => "Too Many Requests",
                _ => "Internal Server Error",
            };
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
        requests
    });
    (url, handle)
}

fn chat_reply(content: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
    .to_string()
}

fn client_for(url: &str) -> LlmClient {
    let mut settings = LlmSettings::new("sk-test");
    settings.base_url = url.to_string();
    settings.timeout = Duration::from_secs(5);
    LlmClient::new(settings).unwrap()
}

fn record() -> CandidateRecord {
    let app = Application {
        name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        skills: "python".into(),
        resume: Some(ResumeUpload {
            filename: "cv.txt".into(),
            bytes: Vec::new(),
        }),
    };
    CandidateRecord::new(&app, "Python developer".into())
}

#[tokio::test]
async fn complete_sends_bearer_and_model() {
    let (url, handle) = spawn_mock_server(vec![(200, chat_reply("Hello there"))]);
    let client = client_for(&url);

    let reply = client.complete("system", "say hello").await.unwrap();
    assert_eq!(reply, "Hello there");

    let requests = handle.join().unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("post /chat/completions"));
    assert!(request.contains("authorization: bearer sk-test"));
    assert!(requests[0].contains("\"model\":\"gpt-4o\""));
    assert!(requests[0].contains("say hello"));
}

#[tokio::test]
async fn api_error_message_is_extracted() {
    let body = serde_json::json!({ "error": { "message": "Incorrect API key provided" } }).to_string();
    let (url, handle) = spawn_mock_server(vec![(401, body)]);

    let err = client_for(&url).complete("s", "p").await.unwrap_err();
    match &err {
        LlmError::Api { status, message } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.is_unavailable());
    handle.join().unwrap();
}

#[tokio::test]
async fn quota_errors_count_as_unavailable() {
    let (url, handle) = spawn_mock_server(vec![(429, "{}".to_string())]);
    let err = client_for(&url).complete("s", "p").await.unwrap_err();
    assert!(err.is_unavailable());
    handle.join().unwrap();
}

#[tokio::test]
async fn empty_choices_are_an_error() {
    let (url, handle) = spawn_mock_server(vec![(200, r#"{"choices": []}"#.to_string())]);
    let err = client_for(&url).complete("s", "p").await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyContent));
    handle.join().unwrap();
}

#[tokio::test]
async fn scored_judgment_ignores_model_recommendation() {
    let content = "```json\n{\"score\": 72, \"feedback\": \"Decent but shallow\", \"recommendation\": \"PASS\"}\n```";
    let (url, handle) = spawn_mock_server(vec![(200, chat_reply(content))]);
    let evaluator = LlmEvaluator::new(client_for(&url), ScoringMode::default()).unwrap();

    let analysis = evaluator
        .evaluate(
            Stage::TechInterview,
            "Explain the difference between a list and a tuple in Python.",
            "Tuples are immutable.",
            &EvalContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(analysis.score, 72);
    assert_eq!(analysis.recommendation, Recommendation::Fail);
    assert_eq!(analysis.feedback, "Decent but shallow");
    handle.join().unwrap();
}

#[tokio::test]
async fn binary_judgment_reports_verdict() {
    let content = r#"{"verdict": "Yes", "feedback": "Meets the bar"}"#;
    let (url, handle) = spawn_mock_server(vec![(200, chat_reply(content))]);
    let evaluator = LlmEvaluator::new(client_for(&url), ScoringMode::Binary).unwrap();

    let analysis = evaluator
        .evaluate(Stage::HrInterview, "q", "a thoughtful answer", &EvalContext::default())
        .await
        .unwrap();
    assert_eq!(analysis.score, 100);
    assert!(analysis.passed());
    handle.join().unwrap();
}

#[tokio::test]
async fn guarded_evaluator_falls_back_on_quota() {
    let (url, handle) = spawn_mock_server(vec![(429, "{}".to_string())]);
    let primary = LlmEvaluator::new(client_for(&url), ScoringMode::default()).unwrap();
    let guarded = GuardedEvaluator::new(Arc::new(primary), ScoringMode::default(), Duration::from_secs(5));

    let analysis = guarded
        .evaluate(
            Stage::TechInterview,
            "Explain the difference between a list and a tuple in Python.",
            "A list is mutable and can grow, while a tuple is immutable once it has been created.",
            &EvalContext::default(),
        )
        .await;
    assert!(analysis.feedback.starts_with("Fallback evaluation"));
    assert!(analysis.passed());
    handle.join().unwrap();
}

#[tokio::test]
async fn guarded_evaluator_falls_back_when_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let primary = LlmEvaluator::new(client_for(&url), ScoringMode::default()).unwrap();
    let guarded = GuardedEvaluator::new(Arc::new(primary), ScoringMode::default(), Duration::from_secs(5));

    let analysis = guarded
        .evaluate(Stage::HrInterview, "q", "I handled it.", &EvalContext::default())
        .await;
    assert!(analysis.feedback.starts_with("Fallback evaluation"));
    assert_eq!(analysis.score, 70);
    assert_eq!(analysis.recommendation, Recommendation::Fail);
}

#[tokio::test]
async fn guarded_evaluator_fails_on_unusable_reply() {
    let (url, handle) = spawn_mock_server(vec![(200, chat_reply("I would rather not grade this."))]);
    let primary = LlmEvaluator::new(client_for(&url), ScoringMode::default()).unwrap();
    let guarded = GuardedEvaluator::new(Arc::new(primary), ScoringMode::default(), Duration::from_secs(5));

    let analysis = guarded
        .evaluate(Stage::CodingTest, "q", "def f(): return 1", &EvalContext::default())
        .await;
    assert_eq!(analysis.score, 0);
    assert!(analysis.feedback.starts_with("Error during evaluation"));
    handle.join().unwrap();
}

#[tokio::test]
async fn generated_question_is_used_before_the_pool() {
    let content = r#"{"question": "Read two integers and print their sum.", "expected_output": "5"}"#;
    let (url, handle) = spawn_mock_server(vec![(200, chat_reply(content))]);
    let generator = QuestionGenerator::new()
        .with_source(Arc::new(LlmQuestionSource::new(client_for(&url), JobProfile::default())))
        .with_source(Arc::new(QuestionPool::default()));
    assert_eq!(generator.source_names(), vec!["llm", "pool"]);

    let q = generator.generate(Stage::CodingTest, "tok", &record()).await;
    assert_eq!(q.text, "Read two integers and print their sum.");
    assert_eq!(q.expected_output.as_deref(), Some("5"));

    let requests = handle.join().unwrap();
    assert!(requests[0].contains("Python Developer"));
}

#[tokio::test]
async fn question_generation_falls_back_to_the_pool() {
    let (url, handle) = spawn_mock_server(vec![(500, "{}".to_string())]);
    let generator = QuestionGenerator::new()
        .with_source(Arc::new(LlmQuestionSource::new(client_for(&url), JobProfile::default())))
        .with_source(Arc::new(QuestionPool::default()));

    let q = generator.generate(Stage::TechInterview, "tok", &record()).await;
    let expected = QuestionPool::default()
        .pick(Stage::TechInterview, "tok", &record())
        .unwrap();
    assert_eq!(q.text, expected.text);
    assert!(q.expected_output.is_none());
    handle.join().unwrap();
}

#[tokio::test]
async fn drafted_offer_letter_is_sanitized() {
    let content = "```html\n<h1>Welcome aboard</h1><p>Dear Ada</p><script>alert(1)</script>\n```";
    let (url, handle) = spawn_mock_server(vec![(200, chat_reply(content))]);
    let letters = OfferLetters::new(Some(Arc::new(LlmOfferRenderer::new(client_for(&url)))));

    let html = letters.render(&record(), &JobProfile::default()).await;
    assert!(html.contains("Welcome aboard"));
    assert!(html.contains("Dear Ada"));
    assert!(!html.contains("<script>"));
    handle.join().unwrap();
}

#[tokio::test]
async fn offer_letter_falls_back_to_template() {
    let (url, handle) = spawn_mock_server(vec![(500, "{}".to_string())]);
    let letters = OfferLetters::new(Some(Arc::new(LlmOfferRenderer::new(client_for(&url)))));

    let html = letters.render(&record(), &JobProfile::default()).await;
    assert!(html.contains("Dear Ada Lovelace"));
    assert!(html.contains("Python Developer"));
    handle.join().unwrap();
}
