use super::*;
use cita_watcher::models::ProvinceOutcome;
use cita_watcher::pipeline::PipelineStep;
use cita_watcher::plugins::NotifierHub;
use cita_watcher::scheduler::Monitor;

async fn create_test_monitor(server: &MockServer, provinces: &[&str]) -> (Monitor, Arc<RecordingNotifier>) {
    let recorder = Arc::new(RecordingNotifier::default());
    let hub = NotifierHub::new();
    hub.register_notifier(recorder.clone()).await.unwrap();

    let provinces = provinces.iter().map(|p| Province::new(*p)).collect();
    let monitor = Monitor::new(create_test_pipeline(server), hub, provinces, test_scheduler_config());
    (monitor, recorder)
}

#[tokio::test]
async fn test_cycle_continues_past_an_aborted_province() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_expired_service(&server, "11").await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;

    let (monitor, recorder) = create_test_monitor(&server, &["Almería", "Cádiz", "Albacete"]).await;
    let report = monitor.run_cycle().await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.results().count(), 2);
    assert_eq!(report.aborted_count(), 1);
    assert_eq!(report.transport_failures, 0);
    assert!(!report.all_transport_failures());

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.province().as_str()).collect();
    assert_eq!(names, vec!["Almería", "Cádiz", "Albacete"]);
    match &report.outcomes[1] {
        ProvinceOutcome::Aborted { step, error, .. } => {
            assert_eq!(*step, PipelineStep::ServiceSelected);
            assert!(error.starts_with("service selection failed"), "error was {}", error);
        }
        other => panic!("Cádiz should have aborted, got {:?}", other),
    }
    assert!(report.results().all(|r| !r.available));
    assert!(recorder.alerts().is_empty());

    let stats = monitor.stats().await;
    assert_eq!(stats.cycles_run, 1);
    assert_eq!(stats.checks_run, 3);
    assert_eq!(stats.aborted_checks, 1);
    assert_eq!(stats.consecutive_transport_failures, 0);

    // Each province opened its own session.
    assert_eq!(requests_to(&server, "GET", ENTRY_PATH).await.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_available_province_is_notified() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_portal(&server, SLOTS_HTML).await;
    mount_booking(&server).await;

    let (monitor, recorder) = create_test_monitor(&server, &["Almería"]).await;
    let report = monitor.run_cycle().await;

    assert_eq!(report.available().count(), 1);
    let alerts = recorder.alerts();
    assert_eq!(alerts.len(), 1);
    let (province, result) = &alerts[0];
    assert_eq!(province.as_str(), "Almería");
    assert_eq!(result.dates.len(), 3);
    assert!(result.booking_attempted);
    assert_eq!(monitor.stats().await.appointments_found, 1);

    Ok(())
}

#[tokio::test]
async fn test_run_forever_announces_start_and_stop() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_portal(&server, NO_APPOINTMENTS_HTML).await;

    let (monitor, recorder) = create_test_monitor(&server, &["Almería"]).await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    shutdown_tx.send(true)?;

    let stats = monitor.run_forever(shutdown_rx).await;

    assert_eq!(stats.cycles_run, 1);
    let statuses = recorder.statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[0].contains("Provinces: Almería"));
    assert!(statuses[0].contains("Transport: http"));
    assert!(statuses[1].contains("stopped"));

    Ok(())
}
