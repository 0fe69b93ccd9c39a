//! UI element types and calibration methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed set of UI controls that can be calibrated.
///
/// Serialized as `snake_case` strings (`"main_plus_button"`, `"title_field"`, ...)
/// both on disk and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    MainPlusButton,
    WriteMenuBlog,
    TitleField,
    ContentField,
    ImageButton,
    TextSizeButton,
    TextSizeSmallest,
    LinkButton,
    PublishButton,
    ConfirmButton,
    ShareButton,
    CopyUrlButton,
    MenuButton,
    PublishSettingsButton,
    CancelButton,
    GalleryFirstImage,
    GallerySelectButton,
}

impl ElementType {
    /// Every element type, in declaration order.
    pub const ALL: [ElementType; 17] = [
        ElementType::MainPlusButton,
        ElementType::WriteMenuBlog,
        ElementType::TitleField,
        ElementType::ContentField,
        ElementType::ImageButton,
        ElementType::TextSizeButton,
        ElementType::TextSizeSmallest,
        ElementType::LinkButton,
        ElementType::PublishButton,
        ElementType::ConfirmButton,
        ElementType::ShareButton,
        ElementType::CopyUrlButton,
        ElementType::MenuButton,
        ElementType::PublishSettingsButton,
        ElementType::CancelButton,
        ElementType::GalleryFirstImage,
        ElementType::GallerySelectButton,
    ];

    /// Returns the wire name of this element type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::MainPlusButton => "main_plus_button",
            ElementType::WriteMenuBlog => "write_menu_blog",
            ElementType::TitleField => "title_field",
            ElementType::ContentField => "content_field",
            ElementType::ImageButton => "image_button",
            ElementType::TextSizeButton => "text_size_button",
            ElementType::TextSizeSmallest => "text_size_smallest",
            ElementType::LinkButton => "link_button",
            ElementType::PublishButton => "publish_button",
            ElementType::ConfirmButton => "confirm_button",
            ElementType::ShareButton => "share_button",
            ElementType::CopyUrlButton => "copy_url_button",
            ElementType::MenuButton => "menu_button",
            ElementType::PublishSettingsButton => "publish_settings_button",
            ElementType::CancelButton => "cancel_button",
            ElementType::GalleryFirstImage => "gallery_first_image",
            ElementType::GallerySelectButton => "gallery_select_button",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown element type name.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown element type: {0}")]
pub struct UnknownElementType(pub String);

impl FromStr for ElementType {
    type Err = UnknownElementType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownElementType(s.to_string()))
    }
}

/// How a coordinate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// The operator clicked the element on a streamed screenshot.
    UserClick,
    /// The operator typed the coordinate.
    ManualInput,
    /// Produced by an automated detector (never by this system).
    AiVision,
    /// Seeded from the plan's default position ratios.
    #[default]
    Default,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
