use std::collections::HashMap;

use common::{ImageBadge, RunStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::utils::form::{parse_flag, parse_optional_id, position_from_step_type};

/// Normalised fields of an engine callback, shared by the image and status endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFields {
    pub run_id: i32,
    pub user_id: i32,
    pub step_type: String,
    pub succeeded: bool,
    /// `isrunning = false`: the workflow reports its last step.
    pub terminal: bool,
    /// Variant badge; `None` for main callbacks.
    pub badge: Option<ImageBadge>,
    pub note_id: Option<i32>,
    pub position: Option<i32>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub prompt: Option<String>,
}

impl CallbackFields {
    /// Slot of a main result: explicit position, else `image_N`, else 1.
    pub fn slot(&self) -> i32 {
        self.position
            .or_else(|| position_from_step_type(&self.step_type))
            .unwrap_or(1)
    }

    pub fn is_main(&self) -> bool {
        self.badge.is_none()
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn required_id(fields: &HashMap<String, String>, name: &str) -> Result<i32, AppError> {
    let raw = fields.get(name).map(String::as_str).unwrap_or("");
    parse_optional_id(raw)
        .map_err(|e| AppError::Validation(format!("{name}: {e}")))?
        .ok_or_else(|| AppError::Validation(format!("Missing '{name}' field")))
}

fn optional_id(fields: &HashMap<String, String>, name: &str) -> Result<Option<i32>, AppError> {
    match fields.get(name) {
        Some(raw) => parse_optional_id(raw).map_err(|e| AppError::Validation(format!("{name}: {e}"))),
        None => Ok(None),
    }
}

fn flag(fields: &HashMap<String, String>, name: &str, default: bool) -> Result<bool, AppError> {
    match fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => parse_flag(raw)
            .ok_or_else(|| AppError::Validation(format!("{name}: '{raw}' is not a boolean"))),
        None => Ok(default),
    }
}

fn check_position(position: Option<i32>) -> Result<Option<i32>, AppError> {
    match position {
        Some(p) if !(1..=3).contains(&p) => Err(AppError::Validation(
            "position must be between 1 and 3".into(),
        )),
        p => Ok(p),
    }
}

/// Parse the text fields of a `multipart/form-data` image callback.
pub fn parse_image_callback(fields: &HashMap<String, String>) -> Result<CallbackFields, AppError> {
    Ok(CallbackFields {
        run_id: required_id(fields, "run_id")?,
        user_id: required_id(fields, "user_id")?,
        step_type: fields
            .get("step_type")
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        succeeded: flag(fields, "executed_successfully", true)?,
        terminal: !flag(fields, "isrunning", true)?,
        badge: fields
            .get("badge")
            .and_then(|b| ImageBadge::from_callback(b)),
        note_id: optional_id(fields, "note_id")?,
        position: check_position(optional_id(fields, "position")?)?,
        code: non_blank(fields.get("code")),
        message: non_blank(fields.get("message")),
        prompt: non_blank(fields.get("prompt")),
    })
}

/// Accepts JSON booleans, numbers and the string spellings of [`parse_flag`].
fn flexible_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => Ok(Some(n.as_i64().unwrap_or(0) != 0)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_flag(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("'{s}' is not a boolean"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a boolean, got {other}"
        ))),
    }
}

/// Accepts ids sent as numbers or numeric strings.
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .filter(|v| *v > 0)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("'{n}' is not a valid id"))),
        Some(Value::String(s)) => parse_optional_id(&s).map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected an id, got {other}"
        ))),
    }
}

/// JSON status callback from the workflow engine.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct StatusCallback {
    #[serde(default, deserialize_with = "flexible_id")]
    #[schema(value_type = i32, example = 17)]
    pub run_id: Option<i32>,
    #[serde(default, deserialize_with = "flexible_id")]
    #[schema(value_type = i32, example = 42)]
    pub user_id: Option<i32>,
    #[schema(example = "TEXT_DONE")]
    pub code: Option<String>,
    pub message: Option<String>,
    #[schema(example = "text")]
    pub step_type: Option<String>,
    #[serde(default, deserialize_with = "flexible_flag")]
    #[schema(value_type = Option<bool>)]
    pub executed_successfully: Option<bool>,
    #[serde(default, deserialize_with = "flexible_flag")]
    #[schema(value_type = Option<bool>)]
    pub isrunning: Option<bool>,
    pub product_name: Option<String>,
    pub product_description: Option<String>,
}

impl StatusCallback {
    pub fn fields(&self) -> Result<CallbackFields, AppError> {
        Ok(CallbackFields {
            run_id: self
                .run_id
                .ok_or_else(|| AppError::Validation("Missing 'run_id' field".into()))?,
            user_id: self
                .user_id
                .ok_or_else(|| AppError::Validation("Missing 'user_id' field".into()))?,
            step_type: self
                .step_type
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .to_string(),
            succeeded: self.executed_successfully.unwrap_or(true),
            terminal: !self.isrunning.unwrap_or(true),
            badge: None,
            note_id: None,
            position: None,
            code: non_blank(self.code.as_ref()),
            message: non_blank(self.message.as_ref()),
            prompt: None,
        })
    }

    pub fn product_name(&self) -> Option<String> {
        non_blank(self.product_name.as_ref())
    }

    pub fn product_description(&self) -> Option<String> {
        non_blank(self.product_description.as_ref())
    }
}

/// What a callback changed.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CallbackResponse {
    pub success: bool,
    #[schema(example = 17)]
    pub run_id: i32,
    /// Run status after the callback.
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_id: Option<i32>,
    /// Credits debited for this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charged: Option<i64>,
    /// The callback arrived after the run had already ended.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}
