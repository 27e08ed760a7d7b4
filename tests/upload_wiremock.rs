mod support;

use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use secrecy::SecretString;
use statement_analyzer::client::ApiClient;
use statement_analyzer::config::ResolvedConfig;
use statement_analyzer::error::AnalysisError;
use statement_analyzer::pipeline::{Analyzer, StatementFile, UploadState};
use support::{pdf, SAMPLE_RESULT};
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn analyzer(server: &MockServer) -> Analyzer {
    let client = ApiClient::with_client(reqwest::Client::new(), server.uri());
    Analyzer::new(client, &ResolvedConfig::default())
}

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn non_pdf_is_rejected_without_a_request() -> Result<()> {
    let server = MockServer::start().await;
    let mut analyzer = analyzer(&server);

    let file = StatementFile::new("notes.txt", "text/plain", b"hello".to_vec());
    let err = analyzer.analyze(&file, None).await.unwrap_err();

    assert_eq!(
        err,
        AnalysisError::InvalidFileType {
            content_type: "text/plain".to_string()
        }
    );
    assert_eq!(analyzer.state(), UploadState::Failed);
    assert_eq!(request_count(&server).await, 0, "expected no HTTP requests");
    Ok(())
}

#[tokio::test]
async fn oversized_pdf_is_rejected_without_a_request() -> Result<()> {
    let server = MockServer::start().await;
    let mut analyzer = analyzer(&server);

    let size = 60 * 1024 * 1024;
    let err = analyzer.analyze(&pdf("big.pdf", size), None).await.unwrap_err();

    assert_eq!(err, AnalysisError::FileTooLarge { size: size as u64 });
    assert_eq!(request_count(&server).await, 0, "expected no HTTP requests");
    Ok(())
}

#[tokio::test]
async fn payload_too_large_status_maps_to_file_too_large() -> Result<()> {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(413)).await;
    let mut analyzer = analyzer(&server);

    let err = analyzer.analyze(&pdf("a.pdf", 2048), None).await.unwrap_err();
    assert_eq!(err, AnalysisError::FileTooLarge { size: 2048 });
    Ok(())
}

#[tokio::test]
async fn envelope_success_carries_metadata_and_csv() -> Result<()> {
    let server = MockServer::start().await;
    let body = format!(
        r#"{{
            "extracted": {SAMPLE_RESULT},
            "metadata": {{"income_count": 2, "expense_count": 7, "extraction_confidence": 0.95}},
            "csv_exports": {{"income.csv": "date,description,amount\n05JAN2024,SALARY JAN,250000\n"}}
        }}"#
    );
    mount(
        &server,
        ResponseTemplate::new(200).set_body_raw(body, "application/json"),
    )
    .await;
    let mut analyzer = analyzer(&server);

    let analysis = analyzer.analyze(&pdf("jan.pdf", 1024), None).await?;

    assert_eq!(analyzer.state(), UploadState::Succeeded);
    assert!(!analyzer.is_uploading());
    assert_eq!(analysis.result.transactions.income.len(), 2);
    assert_eq!(analysis.result.transactions.expenses.len(), 7);
    assert_eq!(analysis.result.final_balance, Decimal::from(154_181));
    assert_eq!(analysis.metadata.and_then(|m| m.expense_count), Some(7));
    assert!(analysis.csv_exports["income.csv"].starts_with("date,description,amount"));
    Ok(())
}

#[tokio::test]
async fn bare_success_matches_envelope() -> Result<()> {
    let bare_server = MockServer::start().await;
    mount(
        &bare_server,
        ResponseTemplate::new(200).set_body_raw(SAMPLE_RESULT, "application/json"),
    )
    .await;
    let envelope_server = MockServer::start().await;
    mount(
        &envelope_server,
        ResponseTemplate::new(200).set_body_raw(
            format!(r#"{{"extracted": {SAMPLE_RESULT}}}"#),
            "application/json",
        ),
    )
    .await;

    let file = pdf("jan.pdf", 512);
    let bare = analyzer(&bare_server).analyze(&file, None).await?;
    let envelope = analyzer(&envelope_server).analyze(&file, None).await?;

    assert_eq!(bare.result, envelope.result);
    assert!(bare.metadata.is_none());
    assert!(bare.csv_exports.is_empty());
    Ok(())
}

#[tokio::test]
async fn multipart_carries_file_and_password() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SAMPLE_RESULT, "application/json"))
        .mount(&server)
        .await;
    let mut analyzer = analyzer(&server);

    let password = SecretString::from("s3cret-pw".to_string());
    analyzer
        .analyze(&pdf("locked.pdf", 256), Some(&password))
        .await?;
    analyzer.analyze(&pdf("open.pdf", 256), None).await?;

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);

    let locked = String::from_utf8_lossy(&requests[0].body);
    assert!(locked.contains(r#"name="file"; filename="locked.pdf""#));
    assert!(locked.contains(r#"name="password""#));
    assert!(locked.contains("s3cret-pw"));

    let open = String::from_utf8_lossy(&requests[1].body);
    assert!(open.contains(r#"filename="open.pdf""#));
    assert!(!open.contains(r#"name="password""#));
    Ok(())
}

#[tokio::test]
async fn empty_password_is_not_sent() -> Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_raw(SAMPLE_RESULT, "application/json"),
    )
    .await;
    let mut analyzer = analyzer(&server);

    let password = SecretString::from(String::new());
    analyzer.analyze(&pdf("a.pdf", 64), Some(&password)).await?;

    let requests = server.received_requests().await.unwrap_or_default();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(!body.contains(r#"name="password""#));
    Ok(())
}

#[tokio::test]
async fn service_overloaded_keeps_backend_message() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "error": "The AI service is temporarily overloaded. Please try again in a few moments.",
        "error_type": "service_overloaded",
        "suggestions": ["Wait 30 seconds and retry"]
    }"#;
    mount(
        &server,
        ResponseTemplate::new(503).set_body_raw(body, "application/json"),
    )
    .await;
    let mut analyzer = analyzer(&server);

    let err = analyzer.analyze(&pdf("a.pdf", 64), None).await.unwrap_err();

    assert_eq!(err.kind(), "service_overloaded");
    assert_eq!(
        err.to_string(),
        "The AI service is temporarily overloaded. Please try again in a few moments."
    );
    assert_eq!(err.suggestions(), ["Wait 30 seconds and retry".to_string()]);
    assert_eq!(analyzer.state(), UploadState::Failed);
    Ok(())
}

#[tokio::test]
async fn error_body_wins_over_success_status() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{"error": "Invalid API key configured", "error_type": "invalid_api_key"}"#;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_raw(body, "application/json"),
    )
    .await;

    let err = analyzer(&server)
        .analyze(&pdf("a.pdf", 64), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidApiKey(_)));
    Ok(())
}

#[tokio::test]
async fn invalid_statement_carries_confidence() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "error": "The uploaded file does not appear to be a bank statement",
        "error_type": "invalid_bank_statement",
        "analysis": {"confidence": 0.15, "matched_keywords": ["balance"]}
    }"#;
    mount(
        &server,
        ResponseTemplate::new(400).set_body_raw(body, "application/json"),
    )
    .await;

    let err = analyzer(&server)
        .analyze(&pdf("menu.pdf", 64), None)
        .await
        .unwrap_err();
    match err {
        AnalysisError::InvalidBankStatement {
            confidence,
            matched_keywords,
            ..
        } => {
            assert_eq!(confidence, Some(0.15));
            assert_eq!(matched_keywords, vec!["balance"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn plain_server_error_maps_to_server_error() -> Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(500).set_body_string("Internal Server Error"),
    )
    .await;

    let err = analyzer(&server)
        .analyze(&pdf("a.pdf", 64), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::ServerError {
            status: Some(500),
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() -> Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(429)
            .set_body_raw(r#"{"detail": "Slow down"}"#, "application/json"),
    )
    .await;

    let err = analyzer(&server)
        .analyze(&pdf("a.pdf", 64), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "rate_limited");
    assert_eq!(err.to_string(), "Slow down");
    Ok(())
}

#[tokio::test]
async fn unparseable_success_is_unknown() -> Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_raw("<html>oops</html>", "text/html"),
    )
    .await;

    let err = analyzer(&server)
        .analyze(&pdf("a.pdf", 64), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unknown");
    assert_eq!(
        err.to_string(),
        "Failed to analyze bank statement. Please try again."
    );
    Ok(())
}

#[tokio::test]
async fn slow_backend_times_out() -> Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .set_body_raw(SAMPLE_RESULT, "application/json")
            .set_delay(Duration::from_secs(2)),
    )
    .await;
    let mut analyzer = analyzer(&server).with_timeout(Duration::from_millis(100));

    let err = analyzer.analyze(&pdf("a.pdf", 64), None).await.unwrap_err();
    assert_eq!(err, AnalysisError::RequestTimedOut);
    assert_eq!(analyzer.state(), UploadState::Failed);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_network_error() -> Result<()> {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    let client = ApiClient::with_client(reqwest::Client::new(), format!("http://{addr}"));
    let mut analyzer = Analyzer::new(client, &ResolvedConfig::default());

    let err = analyzer.analyze(&pdf("a.pdf", 64), None).await.unwrap_err();
    assert_eq!(err.kind(), "network_error");
    Ok(())
}

#[tokio::test]
async fn failed_attempt_then_success_updates_state() -> Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_raw(SAMPLE_RESULT, "application/json"),
    )
    .await;
    let mut analyzer = analyzer(&server).with_max_file_size(1024);
    assert_eq!(analyzer.state(), UploadState::Idle);

    assert!(analyzer.analyze(&pdf("a.pdf", 4096), None).await.is_err());
    assert_eq!(analyzer.state(), UploadState::Failed);

    analyzer.analyze(&pdf("a.pdf", 512), None).await?;
    assert_eq!(analyzer.state(), UploadState::Succeeded);
    assert_eq!(request_count(&server).await, 1);
    Ok(())
}
