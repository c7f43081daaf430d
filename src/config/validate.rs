//! Configuration validation.

use crate::config::Config;
use crate::constants::{confidence, iou};
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    let defaults = &config.defaults;

    if !(iou::MIN..=iou::MAX).contains(&defaults.iou_threshold) {
        return Err(Error::InvalidRequest {
            message: format!(
                "iou_threshold must be between {} and {}, got {}",
                iou::MIN,
                iou::MAX,
                defaults.iou_threshold
            ),
        });
    }

    if !(confidence::MIN..=confidence::MAX).contains(&defaults.confidence_threshold) {
        return Err(Error::InvalidRequest {
            message: format!(
                "confidence_threshold must be between {} and {}, got {}",
                confidence::MIN,
                confidence::MAX,
                defaults.confidence_threshold
            ),
        });
    }

    if defaults.folds == 0 {
        return Err(Error::InvalidRequest {
            message: "folds must be at least 1".to_string(),
        });
    }

    if !(0.0..1.0).contains(&defaults.alpha) || defaults.alpha == 0.0 {
        return Err(Error::InvalidRequest {
            message: format!("alpha must be in (0, 1), got {}", defaults.alpha),
        });
    }

    Ok(())
}
