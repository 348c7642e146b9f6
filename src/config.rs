use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;

use crate::mpris::METADATA_FORMAT;
use crate::presence::DEFAULT_EMOJI;
use crate::publisher::DEFAULT_API_BASE;

/// Where metadata lines come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// Follow `playerctl` output
    Playerctl,
    /// Watch MPRIS signals on the session bus directly
    Dbus,
}

/// Configuration parsed from command-line arguments and the environment.
#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version,
    about = "Mirror the playing track into your custom status",
    long_about = None
)]
pub struct Config {
    /// Account token sent as the Authorization header
    #[arg(
        long = "token",
        env = "TOKEN",
        hide_env_values = true,
        required_unless_present = "dry_run"
    )]
    pub token: Option<String>,
    /// Base URL of the API that owns the settings endpoint
    #[arg(long = "api-base", env = "STATUS_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,
    /// Seconds without a new line before the status is re-sent; also the status lifetime
    #[arg(long = "age", default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    age_secs: u64,
    /// Emoji shown next to the status
    #[arg(long = "emoji", default_value = DEFAULT_EMOJI)]
    pub emoji: String,
    /// Metadata format passed to playerctl
    #[arg(long = "format", default_value = METADATA_FORMAT)]
    pub format: String,
    /// Ignore certain players (comma-separated list)
    #[arg(short = 'b', long = "blocked", value_delimiter = ',', default_value = "")]
    pub blocked: Vec<String>,
    /// Metadata source
    #[arg(long = "source", value_enum, default_value_t = SourceKind::Playerctl)]
    pub source: SourceKind,
    /// Timeout for a status update in seconds (0 waits forever)
    #[arg(long = "timeout", default_value_t = 30)]
    timeout_secs: u64,
    /// Print payloads to stdout instead of sending them
    #[arg(long = "dry-run", default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
    /// Debounce window (from age)
    #[arg(skip)]
    pub age: Duration,
    /// Request timeout (from timeout)
    #[arg(skip)]
    pub timeout: Option<Duration>,
}

impl Config {
    /// Parse arguments and compute derived fields.
    pub fn parse() -> Self {
        <Self as Parser>::parse().normalize()
    }

    /// Like [`Config::parse`], for an explicit argument list.
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args).map(Self::normalize)
    }

    fn normalize(mut self) -> Self {
        self.age = Duration::from_secs(self.age_secs);
        self.timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        // Normalize blocked list
        self.blocked = self
            .blocked
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.token = self.token.take().map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        self
    }
}
