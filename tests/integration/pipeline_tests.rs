use super::*;
use cita_watcher::pipeline::{PipelineContext, PipelineStep, StepFailure};

#[tokio::test]
async fn test_province_selection_retries_server_errors() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENTRY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;

    let pipeline = create_test_pipeline(&server);
    let mut ctx = PipelineContext::new(Province::new("Almería"));
    pipeline.select_province(&mut ctx).await?;

    assert_eq!(ctx.step, PipelineStep::ProvinceSelected);
    assert!(ctx.page.url.ends_with("/icpplus/citar?p=4&locale=es"));
    assert_eq!(ctx.fields.get("provincia"), Some("4"));

    assert_eq!(requests_to(&server, "GET", ENTRY_PATH).await.len(), 3);
    let posts = requests_to(&server, "POST", "/icpplus/citar").await;
    assert_eq!(posts.len(), 1);
    let body = body_of(&posts[0]);
    assert!(body.contains("provincia=4"), "province form body was {}", body);
    assert!(body.contains("btnAceptar=Aceptar"));

    Ok(())
}

#[tokio::test]
async fn test_full_check_without_appointments() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;

    let pipeline = create_test_pipeline(&server);
    let result = pipeline.check_province(&Province::new("Almería")).await?;

    assert!(!result.available);
    assert!(result.dates.is_empty());
    assert!(!result.booking_attempted);
    assert!(result.page_url.ends_with("/icpplus/acValidarEntrada"));

    let services = requests_to(&server, "POST", "/icpplus/acTipo").await;
    assert!(body_of(&services[0]).contains("tipoTramite=CNP"));
    let asylum = requests_to(&server, "POST", "/icpplus/acServicio").await;
    assert!(body_of(&asylum[0]).contains("tramiteGrupo=4078"));

    let identity = body_of(&requests_to(&server, "POST", "/icpplus/acValidarEntrada").await[0]);
    for expected in [
        "rdbTipoDoc=PASAPORTE",
        "txtIdCitado=X1234567",
        "txtDesCitado=TEST+PERSON",
        "txtAnnoCitado=1990",
        "txtPaisNac=239",
    ] {
        assert!(identity.contains(expected), "missing {} in {}", expected, identity);
    }

    Ok(())
}

#[tokio::test]
async fn test_available_slots_are_extracted_and_booked() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_portal(&server, SLOTS_HTML).await;
    mount_booking(&server).await;

    let pipeline = create_test_pipeline(&server);
    let result = pipeline.check_province(&Province::new("Almería")).await?;

    assert!(result.available);
    assert_eq!(
        result.dates,
        vec!["2024-05-06 09:30", "2024-05-06 10:00", "2024-05-07 11:15"]
    );
    assert_eq!(result.office.as_deref(), Some("CNP Almería, Calle Santos Zárate 11"));
    assert!(result.booking_attempted);

    let slot = body_of(&requests_to(&server, "POST", "/icpplus/acCitar").await[0]);
    assert!(slot.contains("rdbFecha=2024-05-06+09%3A30"), "slot body was {}", slot);
    let contact = body_of(&requests_to(&server, "POST", "/icpplus/acGrabarCita").await[0]);
    assert!(contact.contains("emailUNO=someone%40example.com"));
    assert!(contact.contains("txtTelefonoCitado=600000000"));
    assert!(contact.contains("btnEnviar=Enviar"));

    Ok(())
}

#[tokio::test]
async fn test_auto_book_disabled_only_reports() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_portal(&server, SLOTS_HTML).await;
    mount_booking(&server).await;

    let pipeline = create_test_pipeline(&server).with_auto_book(false);
    let result = pipeline.check_province(&Province::new("Almería")).await?;

    assert!(result.available);
    assert!(!result.booking_attempted);
    assert!(requests_to(&server, "POST", "/icpplus/acCitar").await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_booking_keeps_availability() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_portal(&server, SLOTS_HTML).await;
    Mock::given(method("POST"))
        .and(path("/icpplus/acCitar"))
        .respond_with(html(SESSION_EXPIRED_HTML))
        .mount(&server)
        .await;

    let pipeline = create_test_pipeline(&server);
    let result = pipeline.check_province(&Province::new("Almería")).await?;

    assert!(result.available);
    assert_eq!(result.dates.len(), 3);
    assert!(!result.booking_attempted);

    Ok(())
}

#[tokio::test]
async fn test_unknown_province_fails_after_one_fetch() {
    let server = MockServer::start().await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;

    let pipeline = create_test_pipeline(&server);
    let err = pipeline.check_province(&Province::new("Narnia")).await.unwrap_err();

    assert_eq!(err.step, PipelineStep::ProvinceSelected);
    assert_eq!(
        err.failure,
        StepFailure::LabelNotFound {
            field: "provincia".to_string(),
            label: "Narnia".to_string(),
        }
    );
    assert!(!err.is_transport());
    assert_eq!(requests_to(&server, "GET", ENTRY_PATH).await.len(), 1);
    assert!(requests_to(&server, "POST", "/icpplus/citar").await.is_empty());
}

#[tokio::test]
async fn test_run_leaves_context_aborted_or_done() {
    let server = MockServer::start().await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;
    let pipeline = create_test_pipeline(&server);

    let mut ctx = PipelineContext::new(Province::new("Narnia"));
    let err = pipeline.run(&mut ctx).await.unwrap_err();
    assert_eq!(err.step, PipelineStep::ProvinceSelected);
    assert_eq!(ctx.step, PipelineStep::Aborted);

    let mut ctx = PipelineContext::new(Province::new("Almería"));
    let result = pipeline.run(&mut ctx).await.unwrap();
    assert!(!result.available);
    assert_eq!(ctx.step, PipelineStep::Done);
    assert_eq!(ctx.fields.get("txtIdCitado"), Some("X1234567"));
}

#[tokio::test]
async fn test_unexpected_page_at_service_selection() {
    let server = MockServer::start().await;
    mount_expired_service(&server, "11").await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;

    let pipeline = create_test_pipeline(&server);
    let err = pipeline.check_province(&Province::new("Cádiz")).await.unwrap_err();

    assert_eq!(err.step, PipelineStep::ServiceSelected);
    match &err.failure {
        StepFailure::UnexpectedPage { actual_url, .. } => assert!(actual_url.ends_with("/icpplus/index.html")),
        other => panic!("expected an unexpected page, got {:?}", other),
    }
    // Not retried: the page is complete, just the wrong one.
    assert_eq!(requests_to(&server, "POST", "/icpplus/acCaducada").await.len(), 1);
}

#[tokio::test]
async fn test_persistent_outage_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENTRY_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let pipeline = create_test_pipeline(&server);
    let err = pipeline.check_province(&Province::new("Almería")).await.unwrap_err();

    assert_eq!(err.step, PipelineStep::ProvinceSelected);
    assert!(err.is_transport());
    assert_eq!(requests_to(&server, "GET", ENTRY_PATH).await.len(), 3);
}
