//! Raw metadata validation

use crate::domain::errors::ProbeError;
use crate::domain::model::{ContentRef, MediaMetadata, RawMetadata, Rotation};

/// Turns raw probe values into validated [`MediaMetadata`]
pub struct MetadataValidator;

impl MetadataValidator {
    /// Reject absent or non-positive duration and dimensions.
    ///
    /// Missing rotation means upright; rotation that is not a quarter turn is
    /// invalid.
    pub fn validate(content: &ContentRef, raw: &RawMetadata) -> Result<MediaMetadata, ProbeError> {
        let invalid = |detail: String| ProbeError::InvalidMetadata {
            reference: content.to_string(),
            detail,
        };

        let duration = match raw.duration {
            Some(duration) if duration > 0 => duration,
            Some(duration) => return Err(invalid(format!("non-positive duration {}", duration))),
            None => return Err(invalid("duration absent".to_string())),
        };

        let width = Self::dimension("width", raw.width).map_err(invalid)?;
        let height = Self::dimension("height", raw.height).map_err(invalid)?;

        let rotation = match raw.rotation {
            None => Rotation::Deg0,
            Some(degrees) => Rotation::from_degrees(degrees)
                .ok_or_else(|| invalid(format!("unsupported rotation {}", degrees)))?,
        };

        Ok(MediaMetadata {
            duration,
            width,
            height,
            rotation,
        })
    }

    fn dimension(name: &str, value: Option<i64>) -> Result<u32, String> {
        match value {
            None => Err(format!("{} absent", name)),
            Some(v) if v <= 0 => Err(format!("non-positive {} {}", name, v)),
            Some(v) => u32::try_from(v).map_err(|_| format!("{} {} out of range", name, v)),
        }
    }
}
