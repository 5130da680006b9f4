use serde::Serialize;

/// Result of an accepted upload.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// Run the upload was attached to (existing or newly created).
    #[schema(example = 17)]
    pub run_id: i32,
    #[schema(example = 42)]
    pub user_id: i32,
    /// Public URL of the stored image.
    #[schema(example = "http://localhost:3000/uploads/users/42/runs/17/20250101120000_a1b2c3d4e5f6.jpg")]
    pub url: String,
    /// Original client filename.
    #[schema(example = "shoe.jpg")]
    pub name: String,
}
