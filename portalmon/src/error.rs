use thiserror::Error;

/// Missing or invalid startup configuration. Fatal: the process does not
/// start without a complete config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file '{0}' not found in this directory or any parent")]
    NotFound(&'static str),
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config section [{0}] is required")]
    MissingSection(&'static str),
    #[error("config value '{0}' must not be empty")]
    MissingField(&'static str),
    #[error("config value '{0}' is not a valid URL: {1}")]
    BadUrl(&'static str, url::ParseError),
    #[error("config value '{0}' must be positive")]
    NonPositive(&'static str),
}

/// The browser failed to launch or died mid-attempt. Fatal for the current
/// re-authentication attempt only; the session is dropped and the next tick
/// starts a fresh one.
#[derive(Debug, Error)]
#[error("browser session: {0}")]
pub struct SessionError(pub String);

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError(err.to_string())
    }
}

/// Every strategy in a locator spec came up empty. What that means is the
/// caller's call: a missing logout control is not the same situation as a
/// missing password field.
#[derive(Debug, Error)]
#[error("no strategy located '{target}' ({tried} tried)")]
pub struct LocateError {
    pub target: String,
    pub tried: usize,
}

/// One browser interaction failed (element gone, not interactable, script
/// threw). Absorbed by the action layer's fallback tiers; never escapes on
/// its own.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StepError(pub String);

/// Both the native interaction and its scripted fallback failed.
#[derive(Debug, Error)]
#[error("{action}: {detail}")]
pub struct ActionError {
    pub action: &'static str,
    pub detail: String,
}

/// What can end a re-authentication attempt early. Action failures are
/// logged and leave the monitor loop running; session failures additionally
/// discard the browser session.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Action(#[from] ActionError),
}
