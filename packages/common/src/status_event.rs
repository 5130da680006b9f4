#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a status log entry, used by the feed for colouring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "info"))]
    Info,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "success"))]
    Success,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "warning"))]
    Warning,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "error"))]
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a status log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
pub enum EventSource {
    #[serde(rename = "frontend")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "frontend"))]
    Frontend,
    #[serde(rename = "backend")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "backend"))]
    Backend,
    /// The external workflow engine.
    #[serde(rename = "n8n")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "n8n"))]
    Engine,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Engine => "n8n",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display tuple for a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub code: &'static str,
    pub label: &'static str,
    pub severity: Severity,
    pub icon: &'static str,
}

/// Well-known status codes.
pub mod codes {
    pub const UPLOAD_RECEIVED: &str = "UPLOAD_RECEIVED";
    pub const UPLOAD_FORWARDED: &str = "UPLOAD_FORWARDED";
    pub const UPLOAD_FORWARD_FAILED: &str = "UPLOAD_FORWARD_FAILED";
    pub const WORKFLOW_STARTED: &str = "WORKFLOW_STARTED";
    pub const WORKFLOW_UPDATE_STARTED: &str = "WORKFLOW_UPDATE_STARTED";
    pub const ANALYSIS_DONE: &str = "ANALYSIS_DONE";
    pub const TEXT_DONE: &str = "TEXT_DONE";
    pub const IMAGE_DONE: &str = "IMAGE_DONE";
    pub const EDIT_READY: &str = "EDIT_READY";
    pub const EDIT_PUBLISHED: &str = "EDIT_PUBLISHED";
    pub const UPSCALE_DONE: &str = "UPSCALE_DONE";
    pub const STEP_FAILED: &str = "STEP_FAILED";
    pub const WORKFLOW_FINISHED: &str = "WORKFLOW_FINISHED";
    pub const WORKFLOW_FAILED: &str = "WORKFLOW_FAILED";
    pub const RUN_RESET: &str = "RUN_RESET";
    pub const UNKNOWN: &str = "UNKNOWN";
}

const fn event(
    code: &'static str,
    label: &'static str,
    severity: Severity,
    icon: &'static str,
) -> StatusEvent {
    StatusEvent {
        code,
        label,
        severity,
        icon,
    }
}

const CATALOGUE: &[StatusEvent] = &[
    event(codes::UPLOAD_RECEIVED, "Bild hochgeladen", Severity::Info, "upload"),
    event(
        codes::UPLOAD_FORWARDED,
        "Bild an Workflow übergeben",
        Severity::Info,
        "send",
    ),
    event(
        codes::UPLOAD_FORWARD_FAILED,
        "Bild konnte nicht übergeben werden",
        Severity::Warning,
        "alert-triangle",
    ),
    event(codes::WORKFLOW_STARTED, "Workflow gestartet", Severity::Info, "play"),
    event(
        codes::WORKFLOW_UPDATE_STARTED,
        "Bildbearbeitung gestartet",
        Severity::Info,
        "wand",
    ),
    event(codes::ANALYSIS_DONE, "Bildanalyse abgeschlossen", Severity::Success, "search"),
    event(codes::TEXT_DONE, "Produkttext erstellt", Severity::Success, "file-text"),
    event(codes::IMAGE_DONE, "Bild erstellt", Severity::Success, "image"),
    event(codes::EDIT_READY, "Bearbeitung bereit zur Freigabe", Severity::Info, "edit"),
    event(codes::EDIT_PUBLISHED, "Bearbeitung übernommen", Severity::Success, "check"),
    event(codes::UPSCALE_DONE, "Hochskalierung fertig", Severity::Success, "maximize"),
    event(codes::STEP_FAILED, "Schritt fehlgeschlagen", Severity::Error, "x-circle"),
    event(codes::WORKFLOW_FINISHED, "Workflow abgeschlossen", Severity::Success, "check-circle"),
    event(codes::WORKFLOW_FAILED, "Workflow fehlgeschlagen", Severity::Error, "x-octagon"),
    event(codes::RUN_RESET, "Manuell zurückgesetzt", Severity::Warning, "rotate-ccw"),
];

const UNKNOWN_EVENT: StatusEvent = event(codes::UNKNOWN, "Statusmeldung", Severity::Info, "info");

/// Map an opaque status code to its display tuple.
///
/// Lookup is case-insensitive. Unknown codes resolve to the `UNKNOWN` entry.
pub fn resolve_status_event(code: &str) -> StatusEvent {
    let code = code.trim();
    CATALOGUE
        .iter()
        .find(|e| e.code.eq_ignore_ascii_case(code))
        .copied()
        .unwrap_or(UNKNOWN_EVENT)
}

/// Whether the code appears in the catalogue.
pub fn is_known_code(code: &str) -> bool {
    resolve_status_event(code).code != codes::UNKNOWN
}
