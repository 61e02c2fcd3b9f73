// Integration tests for Cita Watcher
// A mock ICP portal served by wiremock, driven through the real HTTP transport.

pub mod monitor_tests;
pub mod notifier_tests;
pub mod pipeline_tests;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use cita_watcher::config::SchedulerConfig;
use cita_watcher::models::{AppointmentResult, Province, UserProfile};
use cita_watcher::pipeline::AppointmentPipeline;
use cita_watcher::plugins::{NotificationResult, NotifierPlugin};
use cita_watcher::retry::RetryPolicy;
use cita_watcher::transport::{HttpTransport, TransportSettings};
use cita_watcher::utils::error::AppError;

pub const ENTRY_PATH: &str = "/icpplus/acOpcDirect";

pub const ENTRY_HTML: &str = r#"<html><body>
<form action="/icpplus/citar" method="post" id="portadaForm">
  <label for="form">Provincias disponibles</label>
  <select name="provincia" id="form">
    <option value="/icpplus/citar?p=0">Seleccione la provincia</option>
    <option value="2">Albacete</option>
    <option value="4">Almería</option>
    <option value="11">Cádiz</option>
  </select>
  <input type="submit" id="btnAceptar" name="btnAceptar" value="Aceptar">
</form>
</body></html>"#;

pub const POLICE_HTML: &str = r#"<html><body>
<form action="/icpplus/acTipo" method="post">
  <input type="hidden" name="sede" value="99">
  <input type="radio" name="tipoTramite" value="EXT" id="ext"><label for="ext">TRÁMITES OFICINAS DE EXTRANJERÍA</label><br>
  <input type="radio" name="tipoTramite" value="CNP" id="cnp"><label for="cnp">TRÁMITES CUERPO NACIONAL DE POLICÍA</label><br>
  <input type="submit" name="btnAceptar" value="Aceptar">
  <input type="submit" name="btnSalir" value="Salir">
</form>
</body></html>"#;

pub const ASYLUM_HTML: &str = r#"<html><body>
<form action="/icpplus/acServicio" method="post">
  <input type="radio" name="tramiteGrupo" value="4010" id="t1"><label for="t1">POLICÍA-TOMA DE HUELLAS (EXPEDICIÓN DE TARJETA)</label><br>
  <input type="radio" name="tramiteGrupo" value="4078" id="t2"><label for="t2">POLICÍA - SOLICITUD ASILO</label><br>
  <input type="submit" name="btnAceptar" value="Aceptar">
</form>
</body></html>"#;

pub const INFO_HTML: &str = r#"<html><body>
<p>Para solicitar cita previa necesitará su pasaporte.</p>
<form action="/icpplus/acEntrada" method="post">
  <input type="submit" name="btnEntrar" value="Entrar">
</form>
</body></html>"#;

pub const USER_DATA_HTML: &str = r#"<html><body>
<form action="/icpplus/acValidarEntrada" method="post">
  <input type="radio" name="rdbTipoDoc" value="N.I.E." id="rdbTipoDocNie" checked><label for="rdbTipoDocNie">N.I.E.</label>
  <input type="radio" name="rdbTipoDoc" value="PASAPORTE" id="rdbTipoDocPas"><label for="rdbTipoDocPas">Pasaporte</label>
  <input type="text" name="txtIdCitado" value="">
  <input type="text" name="txtDesCitado" value="">
  <input type="text" name="txtAnnoCitado" value="">
  <select name="txtPaisNac">
    <option value="">Seleccionar</option>
    <option value="239">COLOMBIA</option>
    <option value="248">VENEZUELA</option>
  </select>
  <input type="submit" name="btnAceptar" value="Aceptar">
</form>
</body></html>"#;

pub const NO_APPOINTMENTS_HTML: &str = r#"<html><body>
<p class="mf-msg__info">En este momento no hay citas disponibles.</p>
<form action="/icpplus/acSalir" method="post"><input type="submit" name="btnSalir" value="Salir"></form>
</body></html>"#;

pub const SLOTS_HTML: &str = r#"<html><body>
<span class="oficina">CNP Almería, Calle Santos Zárate 11</span>
<form action="/icpplus/acCitar" method="post">
  <input type="radio" name="rdbFecha" value="2024-05-06 09:30">
  <input type="radio" name="rdbFecha" value="2024-05-06 10:00">
  <input type="radio" name="rdbFecha" value="2024-05-07 11:15">
  <input type="submit" name="btnSiguiente" value="Siguiente">
</form>
</body></html>"#;

pub const CONTACT_HTML: &str = r#"<html><body>
<form action="/icpplus/acGrabarCita" method="post">
  <input type="tel" name="txtTelefonoCitado" value="">
  <input type="email" name="emailUNO" value="">
  <input type="submit" name="btnEnviar" value="Enviar">
</form>
</body></html>"#;

pub const CONFIRMATION_HTML: &str = "<html><body><p>Su cita ha sido reservada.</p></body></html>";

pub const EXPIRED_SERVICE_HTML: &str = r#"<html><body>
<form action="/icpplus/acCaducada" method="post">
  <input type="radio" name="tipoTramite" value="CNP" id="cnp"><label for="cnp">TRÁMITES CUERPO NACIONAL DE POLICÍA</label>
  <input type="submit" name="btnAceptar" value="Aceptar">
</form>
</body></html>"#;

pub const SESSION_EXPIRED_HTML: &str = "<html><body><p>Su sesión ha caducado.</p></body></html>";

pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

pub fn redirect(to: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", to)
}

/// Mount the happy path, ending on `final_page` after the identity form.
pub async fn mount_portal(server: &MockServer, final_page: &str) {
    let routes = [
        ("GET", ENTRY_PATH, html(ENTRY_HTML)),
        ("POST", "/icpplus/citar", redirect("/icpplus/citar?p=4&locale=es")),
        ("GET", "/icpplus/citar", html(POLICE_HTML)),
        ("POST", "/icpplus/acTipo", html(ASYLUM_HTML)),
        ("POST", "/icpplus/acServicio", redirect("/icpplus/acInfo")),
        ("GET", "/icpplus/acInfo", html(INFO_HTML)),
        ("POST", "/icpplus/acEntrada", html(USER_DATA_HTML)),
        ("POST", "/icpplus/acValidarEntrada", html(final_page)),
    ];
    for (verb, route, response) in routes {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }
}

/// Slot selection and contact form of the booking flow.
pub async fn mount_booking(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/icpplus/acCitar"))
        .respond_with(html(CONTACT_HTML))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/icpplus/acGrabarCita"))
        .respond_with(html(CONFIRMATION_HTML))
        .mount(server)
        .await;
}

/// Send the province with `province_value` down a service page whose form
/// lands on an expired-session page. Mount before [`mount_portal`] so these
/// routes take precedence.
pub async fn mount_expired_service(server: &MockServer, province_value: &str) {
    Mock::given(method("POST"))
        .and(path("/icpplus/citar"))
        .and(body_string_contains(format!("provincia={}", province_value)))
        .respond_with(redirect("/icpplus/citar?p=4&locale=es&fase=caducada"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/icpplus/citar"))
        .and(query_param("fase", "caducada"))
        .respond_with(html(EXPIRED_SERVICE_HTML))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/icpplus/acCaducada"))
        .respond_with(redirect("/icpplus/index.html"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/icpplus/index.html"))
        .respond_with(html(SESSION_EXPIRED_HTML))
        .mount(server)
        .await;
}

/// Requests the server received for `verb` on `route`, in arrival order.
pub async fn requests_to(server: &MockServer, verb: &str, route: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.to_string().eq_ignore_ascii_case(verb) && r.url.path() == route)
        .collect()
}

pub fn body_of(request: &Request) -> String {
    String::from_utf8_lossy(&request.body).to_string()
}

pub fn test_profile() -> UserProfile {
    UserProfile {
        passport_number: "X1234567".to_string(),
        full_name: "TEST PERSON".to_string(),
        birth_year: "1990".to_string(),
        nationality: "COLOMBIA".to_string(),
        email: "someone@example.com".to_string(),
        phone: "600000000".to_string(),
    }
}

pub fn transport_settings() -> TransportSettings {
    TransportSettings {
        user_agent: "CitaWatcher-Test/1.0".to_string(),
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        element_timeout: Duration::from_secs(2),
    }
}

/// Retry backoff in milliseconds so failing routes do not slow the suite down.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3).with_unit(Duration::from_millis(1))
}

pub fn entry_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}{}", server.uri(), ENTRY_PATH)).unwrap()
}

pub fn create_test_pipeline(server: &MockServer) -> AppointmentPipeline {
    let transport = HttpTransport::new(transport_settings()).unwrap();
    AppointmentPipeline::new(Arc::new(transport), fast_retry(), Arc::new(test_profile()), entry_url(server))
}

pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        check_interval_secs: 300,
        province_pause_secs: 0,
        error_backoff_secs: 60,
        status_every_cycles: 12,
    }
}

/// Notifier that keeps everything it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(Province, AppointmentResult)>>,
    statuses: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<(Province, AppointmentResult)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn name(&self) -> &'static str {
        "Recording Notifier"
    }

    fn plugin_type(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, province: &Province, result: &AppointmentResult) -> Result<NotificationResult, AppError> {
        self.alerts.lock().unwrap().push((province.clone(), result.clone()));
        Ok(NotificationResult::delivered(None))
    }

    async fn send_status(&self, status: &str) -> Result<NotificationResult, AppError> {
        self.statuses.lock().unwrap().push(status.to_string());
        Ok(NotificationResult::delivered(None))
    }

    async fn send_error(&self, error: &str) -> Result<NotificationResult, AppError> {
        self.statuses.lock().unwrap().push(error.to_string());
        Ok(NotificationResult::delivered(None))
    }

    async fn test_connection(&self) -> Result<bool, AppError> {
        Ok(true)
    }
}
