use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

static VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid variable pattern"));

/// `-P key=value` overrides for `${key}` references in a config.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse `key=value` pairs. The value may itself contain `=`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        args.iter().try_fold(Self::new(), |params, arg| {
            match arg.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => Ok(params.set(key.trim(), value)),
                _ => Err(Error::Config(format!(
                    "invalid param '{}', expected key=value",
                    arg
                ))),
            }
        })
    }
}

/// Parameter definition in config.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    /// Whether this parameter is required.
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,

    /// Description for documentation.
    pub description: Option<String>,
}

/// Where `${var}` values come from once explicit params are exhausted.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads the process environment (after any `.env` file was loaded).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Lookup for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Lookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Value for one `${name}`. `None` leaves the reference untouched.
fn resolve_var(
    name: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
    env: &dyn Lookup,
) -> Result<Option<String>> {
    if let Some(v) = params.get(name) {
        return Ok(Some(v.to_string()));
    }
    if let Some(v) = env.lookup(name) {
        return Ok(Some(v));
    }
    match defs.get(name) {
        None => Ok(None),
        Some(ParamDef {
            default: Some(default),
            ..
        }) => Ok(Some(default.clone())),
        Some(def) if def.required => Err(Error::Config(format!(
            "missing required parameter: {}",
            name
        ))),
        Some(_) => Ok(Some(String::new())),
    }
}

/// Substitute `${var}` patterns in a string.
///
/// Resolution order: explicit params, environment, then the param
/// definition's default. A required definition with no value is an error;
/// an unknown variable is left untouched. Substituted text is not rescanned.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
    env: &dyn Lookup,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in VAR_RE.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        match resolve_var(name.as_str(), params, defs, env)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Substitute every string inside a parsed YAML document.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
    env: &dyn Lookup,
) -> Result<()> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => *s = substitute(s, params, defs, env)?,
        Value::Mapping(map) => map
            .iter_mut()
            .try_for_each(|(_, v)| substitute_value(v, params, defs, env))?,
        Value::Sequence(seq) => seq
            .iter_mut()
            .try_for_each(|v| substitute_value(v, params, defs, env))?,
        _ => {}
    }
    Ok(())
}
