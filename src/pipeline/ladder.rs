
/// One rendition of the source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
}

impl Variant {
    pub fn new(label: &str, width: u32, height: u32, video_bitrate_kbps: u32) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            video_bitrate_kbps,
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Peak bandwidth advertised in the master playlist, in bits per second.
    pub fn bandwidth(&self) -> u64 {
        u64::from(self.video_bitrate_kbps) * 1000
    }
}

pub fn default_ladder() -> Vec<Variant> {
    vec![
        Variant::new("360p", 640, 360, 800),
        Variant::new("480p", 842, 480, 1400),
        Variant::new("720p", 1280, 720, 2800),
        Variant::new("1080p", 1920, 1080, 5000),
    ]
}

/// Labels become directory names and URL path segments, and must never
/// collide with the index-named staging directories.
pub fn validate_ladder(ladder: &[Variant]) -> Result<(), String> {
    if ladder.is_empty() {
        return Err("variant ladder is empty".to_string());
    }

    for (i, variant) in ladder.iter().enumerate() {
        let label = &variant.label;
        if label.is_empty()
            || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("variant label '{}' is not a safe path segment", label));
        }
        if label.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("variant label '{}' must not be purely numeric", label));
        }
        if variant.width == 0 || variant.height == 0 || variant.video_bitrate_kbps == 0 {
            return Err(format!("variant '{}' has a zero dimension or bitrate", label));
        }
        if ladder[..i].iter().any(|v| &v.label == label) {
            return Err(format!("variant label '{}' appears twice", label));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_is_valid() {
        let ladder = default_ladder();
        assert_eq!(ladder.len(), 4);
        assert!(validate_ladder(&ladder).is_ok());
        assert_eq!(ladder[2].resolution(), "1280x720");
        assert_eq!(ladder[2].bandwidth(), 2_800_000);
    }

    #[test]
    fn test_rejects_unsafe_labels() {
        assert!(validate_ladder(&[]).is_err());
        assert!(validate_ladder(&[Variant::new("../720p", 1280, 720, 2800)]).is_err());
        assert!(validate_ladder(&[Variant::new("1", 640, 360, 800)]).is_err());
        assert!(validate_ladder(&[
            Variant::new("360p", 640, 360, 800),
            Variant::new("360p", 640, 360, 900),
        ])
        .is_err());
        assert!(validate_ladder(&[Variant::new("zero", 0, 360, 800)]).is_err());
    }
}
