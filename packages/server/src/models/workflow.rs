use common::ImageAction;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct StartWorkflowRequest {
    #[schema(example = 17)]
    pub run_id: i32,
    /// Must match the session user when sent.
    #[schema(example = 42)]
    pub user_id: Option<i32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateWorkflowRequest {
    #[schema(example = 17)]
    pub run_id: i32,
    #[schema(example = 311)]
    pub image_id: i32,
    /// Slot position (1-3). Defaults to the image's own position.
    #[schema(example = 2)]
    pub position: Option<i32>,
    pub action: ImageAction,
    /// Edit instruction; required for `edit`.
    #[schema(example = "Hintergrund weiß")]
    pub userprompt: Option<String>,
}

pub fn validate_update_workflow_request(payload: &UpdateWorkflowRequest) -> Result<(), AppError> {
    if payload.run_id <= 0 || payload.image_id <= 0 {
        return Err(AppError::Validation(
            "run_id and image_id must be positive integers".into(),
        ));
    }
    if let Some(position) = payload.position
        && !(1..=3).contains(&position)
    {
        return Err(AppError::Validation("position must be between 1 and 3".into()));
    }
    let prompt = payload.userprompt.as_deref().map(str::trim).unwrap_or("");
    if payload.action.requires_prompt() && prompt.is_empty() {
        return Err(AppError::Validation(
            "userprompt is required for edit requests".into(),
        ));
    }
    if prompt.chars().count() > 2000 {
        return Err(AppError::Validation(
            "userprompt must be at most 2000 characters".into(),
        ));
    }
    Ok(())
}

/// Acknowledgement of a forwarded workflow request.
#[derive(Serialize, utoipa::ToSchema)]
pub struct WorkflowResponse {
    pub success: bool,
    #[schema(example = 17)]
    pub run_id: i32,
    /// HTTP status the workflow engine answered with.
    #[schema(example = 200)]
    pub webhook_status: u16,
}
