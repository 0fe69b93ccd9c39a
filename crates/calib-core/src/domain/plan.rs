//! The ordered calibration plan.
//!
//! A [`CalibrationPlan`] is configuration data: an ordered list of
//! [`PlanStep`]s, one per UI element the operator must point at.  Its length
//! defines a session's `total_steps`.  The plan is injected into the session
//! service at construction so tests can use plans of any length; production
//! uses [`CalibrationPlan::reference`] unless the console configuration
//! overrides it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::element::ElementType;
use super::profile::{CoordinateConfig, Resolution};

/// Errors raised when constructing a plan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("calibration plan has no steps")]
    Empty,

    #[error("element type {0} appears more than once in the plan")]
    DuplicateElement(ElementType),

    #[error("default position ({0}, {1}) for {2} is outside [0, 1]")]
    InvalidDefaultPosition(f64, f64, ElementType),
}

/// One step of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub element_type: ElementType,
    pub element_name: String,
    pub instructions: String,
    #[serde(default)]
    pub help_text: String,
    /// Optional elements do not gate the profile's `calibrated` flag.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Typical position as `(x, y)` ratios of the screen width and height.
    #[serde(default = "default_position")]
    pub default_position: (f64, f64),
}

fn default_required() -> bool {
    true
}
fn default_position() -> (f64, f64) {
    (0.5, 0.5)
}

/// One entry of the operator guide (1-based step numbers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideEntry {
    pub step_number: usize,
    pub element_type: ElementType,
    pub element_name: String,
    pub instructions: String,
    pub help_text: String,
}

/// A validated, ordered list of calibration steps.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPlan {
    steps: Vec<PlanStep>,
}

impl CalibrationPlan {
    /// Builds a plan from explicit steps.
    ///
    /// # Errors
    ///
    /// - [`PlanError::Empty`] when `steps` is empty.
    /// - [`PlanError::DuplicateElement`] when an element type repeats.
    /// - [`PlanError::InvalidDefaultPosition`] when a ratio is outside `[0, 1]`.
    pub fn new(steps: Vec<PlanStep>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.element_type) {
                return Err(PlanError::DuplicateElement(step.element_type));
            }
            let (fx, fy) = step.default_position;
            if !(0.0..=1.0).contains(&fx) || !(0.0..=1.0).contains(&fy) {
                return Err(PlanError::InvalidDefaultPosition(fx, fy, step.element_type));
            }
        }
        Ok(Self { steps })
    }

    /// The reference blog-publishing plan (11 steps).
    pub fn reference() -> Self {
        Self {
            steps: REFERENCE_STEPS
                .iter()
                .map(|(element_type, name, instructions, help, required, pos)| PlanStep {
                    element_type: *element_type,
                    element_name: (*name).to_string(),
                    instructions: (*instructions).to_string(),
                    help_text: (*help).to_string(),
                    required: *required,
                    default_position: *pos,
                })
                .collect(),
        }
    }

    /// Number of steps; a session's `total_steps`.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always `false`: an empty plan cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Element types that must be validated before a profile counts as calibrated.
    pub fn required_elements(&self) -> impl Iterator<Item = ElementType> + '_ {
        self.steps.iter().filter(|s| s.required).map(|s| s.element_type)
    }

    /// The full operator guide.
    pub fn guide(&self) -> Vec<GuideEntry> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| GuideEntry {
                step_number: i + 1,
                element_type: s.element_type,
                element_name: s.element_name.clone(),
                instructions: s.instructions.clone(),
                help_text: s.help_text.clone(),
            })
            .collect()
    }

    /// Placeholder coordinates at each step's default position.
    ///
    /// Positions are `floor(width * fx), floor(height * fy)` kept inside the
    /// resolution.  The records are unvalidated with method `default`.
    pub fn default_coordinates(
        &self,
        profile_id: &str,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Vec<CoordinateConfig> {
        self.steps
            .iter()
            .map(|s| {
                let (fx, fy) = s.default_position;
                let x = ratio_to_pixel(fx, resolution.width);
                let y = ratio_to_pixel(fy, resolution.height);
                CoordinateConfig::from_default(profile_id, s.element_type, s.element_name.clone(), x, y, now)
            })
            .collect()
    }
}

fn ratio_to_pixel(ratio: f64, extent: u32) -> u32 {
    let max = extent.saturating_sub(1) as f64;
    (extent as f64 * ratio).floor().clamp(0.0, max) as u32
}

type ReferenceStep = (ElementType, &'static str, &'static str, &'static str, bool, (f64, f64));

const REFERENCE_STEPS: [ReferenceStep; 11] = [
    (
        ElementType::MainPlusButton,
        "+ icon (home screen)",
        "On the blog app home screen, click the '+' icon at the bottom right.",
        "The plus button in the lower-right corner. Clicking it opens a menu.",
        true,
        (0.85, 0.93),
    ),
    (
        ElementType::WriteMenuBlog,
        "Write blog post menu item",
        "In the menu, click 'Write blog post'.",
        "The option shown after pressing the + icon.",
        true,
        (0.5, 0.6),
    ),
    (
        ElementType::TitleField,
        "Title field",
        "In the editor, click the 'Enter a title' area.",
        "The title input at the top of the editor.",
        true,
        (0.5, 0.15),
    ),
    (
        ElementType::ContentField,
        "Body field",
        "In the editor, click the body input area.",
        "The large writing area below the title.",
        true,
        (0.5, 0.4),
    ),
    (
        ElementType::ImageButton,
        "Add image button",
        "In the editor's bottom toolbar, click the image button.",
        "Usually shown as a photo icon.",
        false,
        (0.15, 0.93),
    ),
    (
        ElementType::TextSizeButton,
        "Text size button",
        "In the editor's bottom toolbar, click the text size button.",
        "The icon that changes text size, usually shaped like 'A'.",
        true,
        (0.7, 0.93),
    ),
    (
        ElementType::TextSizeSmallest,
        "Smallest text size",
        "In the text size popup, click the smallest size.",
        "Usually 9pt, the leftmost option.",
        true,
        (0.2, 0.7),
    ),
    (
        ElementType::LinkButton,
        "Add link button",
        "With an image selected, click 'Add link'.",
        "The link icon that attaches a URL to the image.",
        false,
        (0.65, 0.85),
    ),
    (
        ElementType::PublishButton,
        "Publish button",
        "Click 'Publish' at the top right of the editor.",
        "Publishes the post once writing is finished.",
        true,
        (0.9, 0.08),
    ),
    (
        ElementType::ShareButton,
        "Share button",
        "After publishing, click 'Share'.",
        "Shares the published post.",
        true,
        (0.9, 0.08),
    ),
    (
        ElementType::CopyUrlButton,
        "Copy link button",
        "In the share menu, click 'Copy link'.",
        "Copies the post URL to the clipboard.",
        true,
        (0.5, 0.5),
    ),
];

// ── Tests ─────────────────────────────────────────────────────────────────────
