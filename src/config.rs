//! Engine configuration, read from a TOML file.
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! quickmask_color = [255, 0, 0]
//! quickmask_opacity = 128
//! brush_opacity = 255
//! blend_precision = "float"   # or "fixed"
//! render_threads = 0          # 0 = one per core
//! log_level = "info"
//! ```

use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::canvas::{BlendPrecision, PixelRgba, RenderConfig};
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub quickmask_color: [u8; 3],
    pub quickmask_opacity: u8,
    pub brush_opacity: u8,
    pub blend_precision: BlendPrecision,
    pub render_threads: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quickmask_color: [255, 0, 0],
            quickmask_opacity: 128,
            brush_opacity: 255,
            blend_precision: BlendPrecision::Float,
            render_threads: 0,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The part of the configuration a `Document` carries.
    pub fn render_config(&self) -> RenderConfig {
        let [r, g, b] = self.quickmask_color;
        RenderConfig {
            quickmask_color: PixelRgba::opaque(r, g, b),
            quickmask_opacity: self.quickmask_opacity,
            precision: self.blend_precision,
        }
    }

    /// Parsed `log_level`; unknown names fall back to `Info`.
    pub fn log_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_file_overrides_named_keys() {
        let cfg = EngineConfig::from_toml_str(
            "quickmask_color = [0, 0, 255]\nblend_precision = \"fixed\"\nlog_level = \"trace\"\n",
        )
        .unwrap();
        assert_eq!(cfg.quickmask_color, [0, 0, 255]);
        assert_eq!(cfg.quickmask_opacity, 128);
        assert_eq!(cfg.blend_precision, BlendPrecision::Fixed);
        assert_eq!(cfg.log_level_filter(), LevelFilter::Trace);

        let rc = cfg.render_config();
        assert_eq!(rc.quickmask_color, PixelRgba::opaque(0, 0, 255));
        assert_eq!(rc.precision, BlendPrecision::Fixed);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = EngineConfig::from_toml_str("quickmask_opacity = 300").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
        let err = EngineConfig::from_toml_str("blend_precision = \"double\"").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "render_threads = 3").unwrap();
        let cfg = EngineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.render_threads, 3);

        let missing = file.path().with_extension("missing");
        assert!(matches!(EngineConfig::load(&missing), Err(crate::error::Error::Io(_))));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let cfg = EngineConfig { log_level: "loud".into(), ..Default::default() };
        assert_eq!(cfg.log_level_filter(), LevelFilter::Info);
    }
}
