use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tailsearch_merge::DEFAULT_DELIMITER;
use tailsearch_reader::DEFAULT_BUFFER_SIZE;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Node configuration for both roles.
///
/// `read_dir` is where log files are resolved; `temp_dir` holds partial and
/// merged result files; `delimiter` separates the epoch key from the line
/// body; `deadline` bounds how long the primary waits for agent responses.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub read_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub delimiter: char,
    pub buffer_size: usize,
    pub deadline: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_dir: PathBuf::from("."),
            temp_dir: env::temp_dir(),
            delimiter: DEFAULT_DELIMITER,
            buffer_size: DEFAULT_BUFFER_SIZE,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl ServerConfig {
    /// Read `READ_DIR`, `TEMP_DIR` and `DELIMITER` from the environment,
    /// falling back to defaults for anything unset or empty.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = non_empty_var("READ_DIR") {
            config.read_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_var("TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(delim) = non_empty_var("DELIMITER") {
            match delim.chars().next() {
                Some(c) if delim.chars().count() == 1 => config.delimiter = c,
                _ => log::warn!("DELIMITER must be a single character, keeping '{}'", config.delimiter),
            }
        }
        log::debug!(
            "config: read_dir={} temp_dir={} delimiter={:?}",
            config.read_dir.display(),
            config.temp_dir.display(),
            config.delimiter
        );
        config
    }

    pub fn with_read_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.read_dir = dir.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
