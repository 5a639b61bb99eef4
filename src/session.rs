//! Credentials and the signed-in browser session.

use crate::config::{Environment, Lookup, ProcessEnv, Timeouts};
use crate::driver::{Cookie, Driver};
use crate::interact::{EntryMode, InteractionExecutor, PostCondition, ValueMatch, BUTTON_CHAIN};
use crate::resolve::ElementResolver;
use crate::targets::Field;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const URL_VARS: &[&str] = &["DY_URL", "DYN365_ORGURL"];
const USERNAME_VARS: &[&str] = &["DY_USERNAME", "DYN365_USERNAME"];
const PASSWORD_VARS: &[&str] = &["DY_PASSWORD", "DYN365_PASSWORD"];

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://([^/?#]+)([^?#]*)").expect("valid url pattern")
});

/// Marker left in template `.env` files for values nobody filled in.
const PLACEHOLDER: &str = "<<";

/// Tenant URL and sign-in details.
#[derive(Clone)]
pub struct Credentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Everything from `DY_*` variables, falling back to `DYN365_*`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&ProcessEnv)
    }

    pub fn from_lookup(env: &dyn Lookup) -> Result<Self> {
        Ok(Self {
            base_url: required("base URL", URL_VARS, first_set(env, URL_VARS))?,
            username: required("username", USERNAME_VARS, first_set(env, USERNAME_VARS))?,
            password: required("password", PASSWORD_VARS, first_set(env, PASSWORD_VARS))?,
        })
    }

    /// Config values first, environment for whatever the config leaves out.
    pub fn for_environment(environment: &Environment, env: &dyn Lookup) -> Result<Self> {
        // `${VAR}` left over from substitution counts as unset.
        let usable = |s: &String| !s.trim().is_empty() && !s.contains("${");
        let configured = |v: &Option<String>| v.clone().filter(usable);
        let base = Some(environment.base().to_string()).filter(usable);
        Ok(Self {
            base_url: required("base URL", URL_VARS, base.or_else(|| first_set(env, URL_VARS)))?
                .trim_end_matches('/')
                .to_string(),
            username: required(
                "username",
                USERNAME_VARS,
                configured(&environment.username).or_else(|| first_set(env, USERNAME_VARS)),
            )?,
            password: required(
                "password",
                PASSWORD_VARS,
                configured(&environment.password).or_else(|| first_set(env, PASSWORD_VARS)),
            )?,
        })
    }
}

fn first_set(env: &dyn Lookup, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| env.lookup(n))
        .find(|v| !v.trim().is_empty())
}

fn required(what: &str, vars: &[&str], value: Option<String>) -> Result<String> {
    match value {
        None => Err(Error::Structural(format!(
            "{} is not set (config or {})",
            what,
            vars.join("/")
        ))),
        Some(v) if v.contains(PLACEHOLDER) => Err(Error::Structural(format!(
            "{} still holds a '{}' placeholder",
            what, PLACEHOLDER
        ))),
        Some(v) => Ok(v.trim().to_string()),
    }
}

/// Contents of the storage-state file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

/// How the session came to be signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Saved cookies were still valid.
    Restored,
    /// Went through the sign-in pages.
    SignedIn,
}

/// Persists cookies between runs and signs in when they are stale.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    settle_ms: u64,
    login_ms: u64,
    poll_ms: u64,
    widget_ms: u64,
}

impl SessionStore {
    pub fn new(path: impl AsRef<Path>, timeouts: &Timeouts) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            settle_ms: timeouts.settle_ms,
            login_ms: timeouts.login_ms,
            poll_ms: timeouts.poll_ms.max(1),
            widget_ms: timeouts.widget_ms,
        }
    }

    /// Load saved cookies into the browser. Returns how many were restored.
    pub async fn restore(&self, driver: &dyn Driver) -> Result<usize> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let state: StorageState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable storage state {}: {}", self.path.display(), e);
                return Ok(0);
            }
        };
        driver.restore_cookies(&state.cookies).await?;
        debug!("Restored {} cookie(s)", state.cookies.len());
        Ok(state.cookies.len())
    }

    /// Write the browser's cookies to the storage-state file.
    pub async fn save(&self, driver: &dyn Driver) -> Result<()> {
        let state = StorageState {
            cookies: driver.cookies().await?,
        };
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&state)?)?;
        info!("Saved session state to {}", self.path.display());
        Ok(())
    }

    /// Make sure the browser is signed in to the tenant.
    pub async fn ensure_logged_in(
        &self,
        resolver: &ElementResolver,
        executor: &InteractionExecutor,
        credentials: &Credentials,
    ) -> Result<SessionOutcome> {
        let driver = resolver.driver().clone();
        self.restore(driver.as_ref()).await?;
        driver.goto(&credentials.base_url).await?;
        driver.pause(self.settle_ms).await;

        if self.signed_in(resolver).await {
            info!("Session restored for {}", credentials.username);
            return Ok(SessionOutcome::Restored);
        }

        info!("Signing in as {}", credentials.username);
        let email = resolver.resolve(&Field::LoginEmail.target()).await?.required()?;
        executor
            .enter_text(&email, &credentials.username, &[EntryMode::Fill, executor.typed()], ValueMatch::Exact)
            .await
            .into_result("enter username")?;
        let next = resolver.resolve(&Field::LoginNext.target()).await?.required()?;
        executor
            .click(&next, BUTTON_CHAIN, &PostCondition::Appears(Field::LoginPassword.target()))
            .await
            .into_result("submit username")?;

        let password = resolver.resolve(&Field::LoginPassword.target()).await?.required()?;
        enter_secret(driver.as_ref(), password.selector(), &credentials.password).await?;
        let submit = resolver.resolve(&Field::LoginNext.target()).await?.required()?;
        executor
            .click(&submit, BUTTON_CHAIN, &PostCondition::None)
            .await
            .into_result("submit password")?;

        let stay = resolver.with_budget(self.widget_ms).resolve(&Field::StaySignedInYes.target()).await?;
        if let Some(yes) = stay.first() {
            let outcome = executor.click(yes, BUTTON_CHAIN, &PostCondition::None).await;
            debug!("Stay signed in: {:?}", outcome);
        }

        if !self.wait_for_app(resolver).await {
            return Err(Error::Structural(format!(
                "sign-in did not reach the app within {}ms",
                self.login_ms
            )));
        }
        self.save(driver.as_ref()).await?;
        Ok(SessionOutcome::SignedIn)
    }

    async fn signed_in(&self, resolver: &ElementResolver) -> bool {
        let on_app = resolver
            .driver()
            .current_url()
            .await
            .map(|url| is_app_url(&url))
            .unwrap_or(false);
        on_app && resolver.is_visible(&Field::LoggedInIndicator.target()).await
    }

    async fn wait_for_app(&self, resolver: &ElementResolver) -> bool {
        let deadline = Instant::now() + Duration::from_millis(self.login_ms);
        loop {
            if self.signed_in(resolver).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            resolver.driver().pause(self.poll_ms).await;
        }
    }
}

/// A tenant page, as opposed to a sign-in page that merely redirects there.
fn is_app_url(url: &str) -> bool {
    let Some(caps) = URL_RE.captures(url) else {
        return false;
    };
    let host = caps
        .get(1)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let path = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let sign_in_host = host.starts_with("login.") || host.ends_with(".microsoftonline.com");
    !host.is_empty() && !sign_in_host && path.ends_with("/main.aspx")
}

/// Like a verified fill, but never logs the value.
async fn enter_secret(driver: &dyn Driver, selector: &str, secret: &str) -> Result<()> {
    driver.fill(selector, secret).await?;
    if driver.value_of(selector).await?.unwrap_or_default() == secret {
        return Ok(());
    }
    driver.fill(selector, "").await?;
    driver.focus(selector).await?;
    driver.type_text(secret).await?;
    if driver.value_of(selector).await?.unwrap_or_default() == secret {
        Ok(())
    } else {
        Err(Error::InteractionFailed {
            action: "enter password".into(),
            attempted: vec!["fill".into(), "type".into()],
        })
    }
}
