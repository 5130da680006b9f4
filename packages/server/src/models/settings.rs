use serde::{Deserialize, Serialize};

use super::shared::double_option;
use crate::entity::user;
use crate::error::AppError;

/// Aspect ratios the workflow engine can render.
pub const ALLOWED_RATIOS: &[&str] = &["1:1", "4:5", "3:4", "16:9", "9:16"];

#[derive(Serialize, utoipa::ToSchema)]
pub struct SettingsResponse {
    pub success: bool,
    /// Product category passed to the workflow engine.
    #[schema(example = "Schuhe")]
    pub category: Option<String>,
    #[schema(example = "1:1")]
    pub image_ratio: String,
}

impl From<user::Model> for SettingsResponse {
    fn from(user: user::Model) -> Self {
        Self {
            success: true,
            category: user.category,
            image_ratio: user.image_ratio,
        }
    }
}

/// Partial update; absent fields are left unchanged, `category: null` clears it.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateSettingsRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "Schuhe")]
    pub category: Option<Option<String>>,
    #[schema(example = "4:5")]
    pub image_ratio: Option<String>,
}

pub fn validate_update_settings_request(payload: &UpdateSettingsRequest) -> Result<(), AppError> {
    if let Some(Some(category)) = &payload.category
        && category.trim().chars().count() > 64
    {
        return Err(AppError::Validation(
            "Category must be at most 64 characters".into(),
        ));
    }
    if let Some(ratio) = &payload.image_ratio
        && !ALLOWED_RATIOS.contains(&ratio.trim())
    {
        return Err(AppError::Validation(format!(
            "image_ratio must be one of: {}",
            ALLOWED_RATIOS.join(", ")
        )));
    }
    Ok(())
}
