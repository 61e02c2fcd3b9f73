//! Field names, labels and page markers of the ICP "cita previa" workflow.
//! A change on the portal side breaks these.

pub const DEFAULT_ENTRY_URL: &str = "https://icp.administracionelectronica.gob.es/icpplus/acOpcDirect";

pub const PROVINCE_FIELD: &str = "provincia";
pub const PROVINCE_PAGE: &str = "citar?p=4&locale=es";

pub const POLICE_MARKER: &str = "POLICIA";
pub const ASYLUM_MARKER: &str = "ASILO";
pub const INFO_PAGE: &str = "acInfo";

pub const ENTRY_PAGE: &str = "acEntrada";

pub const DOCUMENT_TYPE_FIELD: &str = "rdbTipoDoc";
pub const DOCUMENT_TYPE_LABEL: &str = "Pasaporte";
pub const PASSPORT_FIELD: &str = "txtIdCitado";
pub const FULL_NAME_FIELD: &str = "txtDesCitado";
pub const BIRTH_YEAR_FIELD: &str = "txtAnnoCitado";
pub const NATIONALITY_FIELD: &str = "txtPaisNac";

pub const ACCEPT_CAPTIONS: &[&str] = &["Aceptar"];
pub const ENTER_CAPTIONS: &[&str] = &["Entrar"];
