//! Image-side collaborators: preprocessing, feature extraction, region of
//! interest detection and augmentation.

pub mod augment;
pub mod bbox;
pub mod extractor;
pub mod preprocess;
pub mod roi;

pub use augment::{Augmenter, ImageAugmenter};
pub use bbox::BoundingBox;
pub use extractor::{DescriptorExtractor, ExtractError, FeatureExtractor, embed_frame, open_rgb};
pub use preprocess::{equalize_clahe, preprocess};
pub use roi::{BorderContrastDetector, RoiDetector};
