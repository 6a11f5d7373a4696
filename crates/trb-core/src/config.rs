use std::{
    collections::HashMap,
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::info;

use crate::{
    errors::Error, security::AccessPolicy, session::SessionSource, transport::TransferLimits,
    Result,
};

pub const DEFAULT_SESSION_NAME: &str = "rename_user_session";

/// Which kind of Telegram account the bot runs as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Bot token over the Bot API.
    Bot,
    /// Logged-in user account over MTProto.
    User,
}

impl Mode {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "bot" => Ok(Mode::Bot),
            "user" => Ok(Mode::User),
            other => Err(Error::Config(format!(
                "MODE must be 'bot' or 'user' - current: {other}"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Bot => f.write_str("bot"),
            Mode::User => f.write_str("user"),
        }
    }
}

/// Typed configuration, built once at startup and shared read-only.
#[derive(Clone)]
pub struct Config {
    pub mode: Mode,

    // Credentials
    pub bot_token: Option<String>,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub session: Option<SessionSource>,
    pub session_name: String,

    // Access control
    pub owner_ids: Vec<i64>,
    pub allow_group_ids: Vec<i64>,

    // Runtime
    pub timezone: Option<String>,
    pub bot_api_url: Option<String>,
    pub work_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub progress_interval: Duration,
    pub status_linger: Duration,
    pub limits: TransferLimits,
}

// Credentials stay out of Debug output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("bot_token_set", &self.bot_token.is_some())
            .field("api_id_set", &self.api_id.is_some())
            .field("api_hash_set", &self.api_hash.is_some())
            .field("session", &self.session.as_ref().map(SessionSource::kind))
            .field("session_name", &self.session_name)
            .field("owner_ids", &self.owner_ids.len())
            .field("allow_group_ids", &self.allow_group_ids.len())
            .field("temp_dir", &self.temp_dir)
            .field("progress_interval", &self.progress_interval)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Config {
    /// Load from the process environment (and `.env` if present).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let work_dir = env::current_dir()?;
        Self::from_lookup(|key| env::var(key).ok(), work_dir)
    }

    /// Build a config from an arbitrary key lookup. `work_dir` is where session
    /// files live.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, work_dir: PathBuf) -> Result<Self> {
        let env = EnvReader { lookup: &lookup };

        let mode = Mode::parse(&env.str("MODE").unwrap_or_default())?;
        let bot_token = env.non_empty("BOT_TOKEN");
        let api_id_raw = env.non_empty("API_ID");
        let api_hash = env.non_empty("API_HASH");
        let session_string = env.non_empty("SESSION_STRING");
        let session_file_path = env.non_empty("SESSION_FILE_PATH").map(PathBuf::from);
        let session_name = env
            .non_empty("SESSION_NAME")
            .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());

        info!(
            %mode,
            bot_token_set = bot_token.is_some(),
            api_id_set = api_id_raw.is_some(),
            api_hash_set = api_hash.is_some(),
            session_string_set = session_string.is_some(),
            session_file_path_set = session_file_path.is_some(),
            "startup environment keys presence"
        );

        let api_id = match api_id_raw {
            Some(raw) => Some(raw.trim().parse::<i32>().map_err(|_| {
                Error::Config("API_ID must be an integer".to_string())
            })?),
            None => None,
        };

        let session = match mode {
            Mode::Bot => {
                if bot_token.is_none() {
                    return Err(Error::Config(
                        "BOT_TOKEN is required for bot mode".to_string(),
                    ));
                }
                None
            }
            Mode::User => {
                if api_id.is_none() || api_hash.is_none() {
                    return Err(Error::Config(
                        "API_ID and API_HASH are required for user mode".to_string(),
                    ));
                }
                let source = SessionSource::resolve(
                    session_string,
                    session_file_path.as_deref(),
                    &work_dir,
                    &session_name,
                );
                if source.is_none() {
                    return Err(Error::Config(
                        "user mode needs SESSION_STRING, an existing SESSION_FILE_PATH, or an existing <SESSION_NAME>.session file".to_string(),
                    ));
                }
                source
            }
        };

        let owner_ids = parse_owner_ids(env.str("OWNER_IDS"));
        let allow_group_ids = parse_csv_i64(env.str("ALLOW_GROUP_IDS"));

        let temp_dir = env
            .non_empty("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("tg-rename-bot"));

        let defaults = TransferLimits::default();
        let limits = TransferLimits {
            bot_max_file_size: env
                .u64("BOT_MAX_FILE_SIZE")
                .unwrap_or(defaults.bot_max_file_size),
            user_max_file_size: env
                .u64("USER_MAX_FILE_SIZE")
                .unwrap_or(defaults.user_max_file_size),
        };

        Ok(Self {
            mode,
            bot_token,
            api_id,
            api_hash,
            session,
            session_name,
            owner_ids,
            allow_group_ids,
            timezone: env.non_empty("TZ"),
            bot_api_url: env.non_empty("BOT_API_URL"),
            work_dir,
            temp_dir,
            progress_interval: Duration::from_millis(
                env.u64("PROGRESS_INTERVAL_MS").unwrap_or(3000),
            ),
            status_linger: Duration::from_millis(env.u64("STATUS_LINGER_MS").unwrap_or(1000)),
            limits,
        })
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            owner_ids: self.owner_ids.clone(),
            allow_group_ids: self.allow_group_ids.clone(),
        }
    }

    /// Cap for the download+reupload path in the configured mode.
    pub fn reupload_limit(&self) -> u64 {
        self.limits.reupload_limit(self.mode)
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn str(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.str(key).and_then(non_empty)
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.str(key).and_then(|s| s.trim().parse::<u64>().ok())
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.insert(key.to_string(), val);
    }
    out
}

/// Comma-separated integers; entries that do not parse are skipped.
fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

/// User ids are positive; signed or non-numeric entries are skipped.
fn parse_owner_ids(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
