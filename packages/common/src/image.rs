#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag on a stored image that separates the main result from variants.
///
/// A missing badge marks a main result generated by the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
pub enum ImageBadge {
    /// Published edit of a main image.
    #[serde(rename = "edit")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "edit"))]
    Edit,
    #[serde(rename = "2k")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "2k"))]
    Upscale2k,
    #[serde(rename = "4k")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "4k"))]
    Upscale4k,
    /// Placeholder inserted when the main workflow failed.
    #[serde(rename = "error")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "error"))]
    Error,
}

impl ImageBadge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Upscale2k => "2k",
            Self::Upscale4k => "4k",
            Self::Error => "error",
        }
    }

    /// Reads the badge a workflow callback reports.
    ///
    /// Only variant badges are recognised; anything else (empty, `null`,
    /// free text, or `error`) denotes a main callback and yields `None`.
    pub fn from_callback(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "edit" => Some(Self::Edit),
            "2k" => Some(Self::Upscale2k),
            "4k" => Some(Self::Upscale4k),
            _ => None,
        }
    }

    pub fn is_upscale(&self) -> bool {
        matches!(self, Self::Upscale2k | Self::Upscale4k)
    }
}

impl fmt::Display for ImageBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billable follow-up action on an existing image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ImageAction {
    #[serde(rename = "2k")]
    Upscale2k,
    #[serde(rename = "4k")]
    Upscale4k,
    #[serde(rename = "edit")]
    Edit,
}

impl ImageAction {
    pub const ALL: &'static [ImageAction] = &[Self::Upscale2k, Self::Upscale4k, Self::Edit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upscale2k => "2k",
            Self::Upscale4k => "4k",
            Self::Edit => "edit",
        }
    }

    /// Price key used to look the action up in the credit price table.
    pub fn step_type(&self) -> &'static str {
        match self {
            Self::Upscale2k => "upscale_2k",
            Self::Upscale4k => "upscale_4k",
            Self::Edit => "edit",
        }
    }

    /// Badge the engine will attach to the resulting image.
    pub fn badge(&self) -> ImageBadge {
        match self {
            Self::Upscale2k => ImageBadge::Upscale2k,
            Self::Upscale4k => ImageBadge::Upscale4k,
            Self::Edit => ImageBadge::Edit,
        }
    }

    pub fn requires_prompt(&self) -> bool {
        matches!(self, Self::Edit)
    }
}

impl fmt::Display for ImageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionError {
    invalid: String,
}

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid action '{}'. Valid values: {}",
            self.invalid,
            ImageAction::ALL
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseActionError {}

impl FromStr for ImageAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2k" => Ok(Self::Upscale2k),
            "4k" => Ok(Self::Upscale4k),
            "edit" => Ok(Self::Edit),
            _ => Err(ParseActionError {
                invalid: s.to_string(),
            }),
        }
    }
}

/// Image formats accepted for upload and from workflow callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Detect the format from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// Map a filename extension onto an accepted format via its MIME type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let mime = mime_guess::from_ext(&ext.to_ascii_lowercase()).first()?;
        match mime.essence_str() {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}
