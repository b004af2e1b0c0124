use std::env;
use std::path::PathBuf;

/// Well-known directories used by rewind
pub struct RewindPaths;

impl RewindPaths {
    /// Get XDG_CONFIG_HOME/rewind or fallback
    pub fn config_dir() -> PathBuf {
        env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
                    .unwrap_or_else(|| PathBuf::from(".config"))
            })
            .join("rewind")
    }

    /// Get the configuration file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Base directory for temporary spool files
    ///
    /// `REWIND_TMPDIR` takes precedence over the platform temp directory.
    pub fn temp_dir() -> PathBuf {
        env::var("REWIND_TMPDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_honors_xdg() {
        let temp = tempfile::TempDir::new().unwrap();
        env::set_var("XDG_CONFIG_HOME", temp.path());
        assert_eq!(RewindPaths::config_dir(), temp.path().join("rewind"));
        assert_eq!(
            RewindPaths::config_file(),
            temp.path().join("rewind").join("config.json")
        );
        env::remove_var("XDG_CONFIG_HOME");
    }

    #[test]
    #[serial]
    fn test_temp_dir_override() {
        env::set_var("REWIND_TMPDIR", "/var/spool/rewind");
        assert_eq!(RewindPaths::temp_dir(), PathBuf::from("/var/spool/rewind"));
        env::remove_var("REWIND_TMPDIR");
        assert_eq!(RewindPaths::temp_dir(), env::temp_dir());
    }
}
