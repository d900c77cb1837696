use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::io::OutputFormat;
use crate::skew::SkewMode;
use crate::{Error, Result};

/// Named acquisition settings applied by `CaptureSource::configure`.
/// Unset fields leave the device default in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionProfile {
    #[serde(default)]
    pub name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub exposure_us: Option<f64>,
}

impl AcquisitionProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory under which the output folders are created.
    pub output_root: PathBuf,
    /// Per-retrieve bound; an elapsed timeout ends the session.
    pub timeout_ms: u64,
    /// Profile loaded on both cameras before streaming.
    pub profile: String,
    /// Width of the blank column between the two mosaics in the composite.
    pub gap_px: u32,
    pub image_format: OutputFormat,
    pub skew_mode: SkewMode,
    /// Stop cleanly after this many processed pairs.
    pub max_frames: Option<u64>,
    pub profiles: BTreeMap<String, AcquisitionProfile>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            timeout_ms: 25_000,
            profile: "UserSet3".to_string(),
            gap_px: 1500,
            image_format: OutputFormat::Png,
            skew_mode: SkewMode::Suffix,
            max_frames: None,
            profiles: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: SessionConfig =
            serde_yaml::from_str(s).map_err(|e| Error::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Configuration("timeout_ms must be positive".into()));
        }
        if self.profile.trim().is_empty() {
            return Err(Error::Configuration("profile name is empty".into()));
        }
        Ok(())
    }

    /// The selected profile; names absent from `profiles` resolve to an empty profile.
    pub fn active_profile(&self) -> AcquisitionProfile {
        match self.profiles.get(&self.profile) {
            Some(p) => AcquisitionProfile {
                name: self.profile.clone(),
                ..p.clone()
            },
            None => AcquisitionProfile::named(self.profile.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.timeout_ms, 25_000);
        assert_eq!(cfg.gap_px, 1500);
        assert_eq!(cfg.profile, "UserSet3");
        assert_eq!(cfg.image_format, OutputFormat::Png);
        assert_eq!(cfg.skew_mode, SkewMode::Suffix);
        assert!(cfg.max_frames.is_none());
    }

    #[test]
    fn yaml_overrides_and_profiles() {
        let yaml = r#"
timeout_ms: 500
profile: bench
skew_mode: wrap-aware
image_format: bmp
profiles:
  bench:
    width: 640
    height: 480
    fps: 30.0
"#;
        let cfg = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.timeout_ms, 500);
        assert_eq!(cfg.gap_px, 1500);
        assert_eq!(cfg.skew_mode, SkewMode::WrapAware);
        assert_eq!(cfg.image_format, OutputFormat::Bmp);
        let p = cfg.active_profile();
        assert_eq!(p.name, "bench");
        assert_eq!(p.width, Some(640));
        assert_eq!(p.exposure_us, None);
    }

    #[test]
    fn unknown_profile_is_empty() {
        let p = SessionConfig::default().active_profile();
        assert_eq!(p, AcquisitionProfile::named("UserSet3"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = SessionConfig::from_yaml_str("timeout_ms: 0").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
