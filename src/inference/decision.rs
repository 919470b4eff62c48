//! Match probability to confidence band and rendering directive.

use image::Rgb;

use crate::config::InferenceSettings;
use crate::vision::BoundingBox;

pub const MATCH_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const POSSIBLE_MATCH_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
pub const NO_MATCH_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfidenceBand {
    Match,
    PossibleMatch,
    NoMatch,
}

impl ConfidenceBand {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBand::Match => "Match",
            ConfidenceBand::PossibleMatch => "Possible Match",
            ConfidenceBand::NoMatch => "No Match",
        }
    }

    pub fn color(self) -> Rgb<u8> {
        match self {
            ConfidenceBand::Match => MATCH_COLOR,
            ConfidenceBand::PossibleMatch => POSSIBLE_MATCH_COLOR,
            ConfidenceBand::NoMatch => NO_MATCH_COLOR,
        }
    }
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Band boundaries; `lower <= upper` is checked when configuration is
/// validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub lower: f32,
    pub upper: f32,
}

impl Thresholds {
    pub fn band(&self, probability: f32) -> ConfidenceBand {
        if probability >= self.upper {
            ConfidenceBand::Match
        } else if probability >= self.lower {
            ConfidenceBand::PossibleMatch
        } else {
            ConfidenceBand::NoMatch
        }
    }
}

impl From<&InferenceSettings> for Thresholds {
    fn from(settings: &InferenceSettings) -> Self {
        Self {
            lower: settings.lower,
            upper: settings.upper,
        }
    }
}

/// What to draw for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDirective {
    pub color: Rgb<u8>,
    /// Box outline, already expanded by the relief.
    pub outline: Option<BoundingBox>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub probability: f32,
    pub band: ConfidenceBand,
    pub render: RenderDirective,
}

/// Classify `probability` and decide how to annotate the frame.
///
/// With a known box the outline is drawn in the band colour; otherwise the
/// band name is shown as a caption. `show_probability` always captions
/// `"<band>, <p>"` and still draws the box when known. NaN falls into the
/// no-match band.
pub fn decide(probability: f32, bbox: Option<BoundingBox>, settings: &InferenceSettings) -> Decision {
    let band = Thresholds::from(settings).band(probability);
    let outline = bbox.map(|bbox| bbox.expanded(settings.relief));
    let caption = if settings.show_probability {
        Some(format!("{}, {:.5}", band.label(), probability))
    } else if outline.is_none() {
        Some(band.label().to_string())
    } else {
        None
    };
    Decision {
        probability,
        band,
        render: RenderDirective {
            color: band.color(),
            outline,
            caption,
        },
    }
}
