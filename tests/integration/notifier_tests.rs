use super::*;
use cita_watcher::config::TelegramSettings;
use cita_watcher::plugins::notifiers::TelegramNotifier;

fn telegram_settings(server: &MockServer) -> TelegramSettings {
    TelegramSettings {
        enabled: true,
        bot_token: Some("123:abc".to_string()),
        chat_id: Some("42".to_string()),
        api_base: server.uri(),
    }
}

fn create_test_telegram(server: &MockServer) -> TelegramNotifier {
    TelegramNotifier::new(
        &telegram_settings(server),
        Arc::new(test_profile()),
        "https://icp.administracionelectronica.gob.es/icpplus/index.html",
    )
    .unwrap()
}

#[tokio::test]
async fn test_telegram_appointment_alert() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "ok": true, "result": { "message_id": 77 } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let notifier = create_test_telegram(&server);
    let result = AppointmentResult::available(
        Province::new("Cádiz"),
        vec!["2024-05-06 09:30".to_string()],
        Some("CNP Algeciras".to_string()),
        false,
        "https://icp.example/icpplus/acValidarEntrada",
    );
    let sent = notifier.notify(&result.province, &result).await?;

    assert!(sent.success);
    assert_eq!(sent.message_id.as_deref(), Some("77"));

    let requests = requests_to(&server, "POST", "/bot123:abc/sendMessage").await;
    let payload: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(payload["chat_id"], "42");
    assert_eq!(payload["parse_mode"], "HTML");
    assert_eq!(payload["disable_web_page_preview"], true);
    let text = payload["text"].as_str().unwrap_or_default();
    assert!(text.contains("<b>Province:</b> Cádiz"));
    assert!(text.contains("• 2024-05-06 09:30"));
    assert!(text.contains("Manual booking required"));

    Ok(())
}

#[tokio::test]
async fn test_telegram_rejection_is_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let notifier = create_test_telegram(&server);
    let sent = notifier.send_status("Monitoring started").await?;

    assert!(!sent.success);
    assert!(sent.error.as_deref().unwrap_or_default().contains("400"));

    Ok(())
}

#[tokio::test]
async fn test_hub_reports_each_notifier() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bot123:abc/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .mount(&server)
        .await;

    let hub = cita_watcher::plugins::NotifierHub::new();
    let recorder = Arc::new(RecordingNotifier::default());
    hub.register_notifier(Arc::new(create_test_telegram(&server))).await?;
    hub.register_notifier(recorder.clone()).await?;

    let deliveries = hub.broadcast_error("Monitoring error: cycle panicked").await;
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].notifier, "telegram");
    assert!(!deliveries[0].result.success);
    assert!(deliveries[1].result.success);
    assert_eq!(recorder.statuses(), vec!["Monitoring error: cycle panicked"]);

    let reachable = hub.test_all().await;
    assert_eq!(
        reachable,
        vec![("telegram".to_string(), true), ("recording".to_string(), true)]
    );

    Ok(())
}
