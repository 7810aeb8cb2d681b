/// Application configuration
use anyhow::{bail, Context, Result};
use portatune_core::{CodecTools, SyncConfig, TargetCodec, MINIMUM_TRANSCODE_BITRATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk/environment configuration, merged with command line arguments
/// into a [`SyncConfig`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    pub source: Option<PathBuf>,

    pub dest: Option<PathBuf>,

    /// Absolute path prefixes excluded from the scan entirely
    #[serde(default)]
    pub exclude: Vec<PathBuf>,

    /// Absolute path prefixes excluded from transcoding only
    #[serde(default)]
    pub exclude_transcode: Vec<PathBuf>,

    pub codec: Option<TargetCodec>,

    pub min_transcode_bitrate: Option<u32>,

    /// Media catalog used as a duration/bitrate oracle
    pub catalog: Option<PathBuf>,

    pub temp_dir: Option<PathBuf>,

    pub workers: Option<usize>,

    #[serde(default)]
    pub album_artist_workaround: bool,

    #[serde(default)]
    pub tools: CodecTools,
}

impl AppConfig {
    /// Load configuration from file and environment.
    ///
    /// Without an explicit path, `config.toml` in the working directory is
    /// used when present. Environment variables prefixed with `PORTATUNE_`
    /// override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("PORTATUNE")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .context("failed to read configuration")?;
        config
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// Merge file/environment values with command line overrides into a
    /// complete sync configuration. Command line values win.
    pub fn into_sync_config(self, overrides: Overrides) -> Result<SyncConfig> {
        let Some(source) = overrides.source.or(self.source) else {
            bail!("no source directory given (argument, config file or PORTATUNE_SOURCE)");
        };
        let Some(dest) = overrides.dest.or(self.dest) else {
            bail!("no destination directory given (argument, config file or PORTATUNE_DEST)");
        };

        let mut config = SyncConfig::new(source, dest);
        config.exclude = self.exclude;
        config.exclude.extend(overrides.exclude);
        config.exclude_transcode = self.exclude_transcode;
        config.exclude_transcode.extend(overrides.exclude_transcode);
        config.codec = overrides
            .codec
            .or(self.codec)
            .unwrap_or(TargetCodec::Opus);
        config.min_transcode_bitrate = overrides
            .min_bitrate
            .or(self.min_transcode_bitrate)
            .unwrap_or(MINIMUM_TRANSCODE_BITRATE);
        config.confirm_remove = !overrides.assume_yes;
        config.album_artist_workaround =
            self.album_artist_workaround || overrides.album_artist_workaround;
        config.catalog_path = overrides.catalog.or(self.catalog);
        if let Some(temp_dir) = self.temp_dir {
            config.temp_dir = temp_dir;
        }
        if let Some(workers) = overrides.workers.or(self.workers) {
            if workers == 0 {
                bail!("workers must be at least 1");
            }
            config.workers = workers;
        }
        config.tools = self.tools;

        if !config.source.is_dir() {
            bail!("source is not a directory: {}", config.source.display());
        }
        if !config.dest.is_dir() {
            bail!("destination is not a directory: {}", config.dest.display());
        }

        Ok(config)
    }
}

/// Command line values that take precedence over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub source: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub exclude: Vec<PathBuf>,
    pub exclude_transcode: Vec<PathBuf>,
    pub codec: Option<TargetCodec>,
    pub min_bitrate: Option<u32>,
    pub catalog: Option<PathBuf>,
    pub workers: Option<usize>,
    pub album_artist_workaround: bool,
    pub assume_yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
source = "/music"
dest = "/mirror"
codec = "opus"
min_transcode_bitrate = 256
exclude = ["/music/Audiobooks"]

[tools]
mpg123 = "/opt/bin/mpg123"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.source, Some(PathBuf::from("/music")));
        assert_eq!(config.codec, Some(TargetCodec::Opus));
        assert_eq!(config.min_transcode_bitrate, Some(256));
        assert_eq!(config.exclude, vec![PathBuf::from("/music/Audiobooks")]);
        assert_eq!(config.tools.mpg123, "/opt/bin/mpg123");
        assert_eq!(config.tools.flac, "flac");
    }

    #[test]
    fn test_overrides_win() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let dest = temp.path().join("dst");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&dest).unwrap();

        let file = AppConfig {
            source: Some(PathBuf::from("/elsewhere")),
            codec: Some(TargetCodec::Opus),
            ..AppConfig::default()
        };
        let overrides = Overrides {
            source: Some(source.clone()),
            dest: Some(dest.clone()),
            codec: Some(TargetCodec::Aac),
            assume_yes: true,
            ..Overrides::default()
        };

        let config = file.into_sync_config(overrides).unwrap();
        assert_eq!(config.source, source);
        assert_eq!(config.codec, TargetCodec::Aac);
        assert!(!config.confirm_remove);
    }

    #[test]
    fn test_missing_roots_rejected() {
        let result = AppConfig::default().into_sync_config(Overrides::default());
        assert!(result.is_err());
    }
}
