//! Environment variable handling for the clinic backend.
//!
//! Configuration values can be overridden with `PSICLINIC__SECTION__KEY`
//! variables. Values written as `"secret_from_env"` in a config file are
//! resolved from `PSICLINIC_SECRET_SECTION_KEY`, then from the conventional
//! provider name (`SUPABASE_SERVICE_ROLE_KEY`, `MP_ACCESS_TOKEN`, ...), then
//! from the legacy `SECTION_KEY` form.

use std::env;

/// The default prefix for configuration environment variables
pub const DEFAULT_PREFIX: &str = "PSICLINIC";

/// The prefix for secret environment variables
pub const SECRET_PREFIX: &str = "PSICLINIC_SECRET";

/// The separator for configuration environment variables
pub const CONFIG_SEPARATOR: &str = "__";

/// The separator for secret environment variables
pub const SECRET_SEPARATOR: &str = "_";

/// Marker value replaced by an environment lookup.
pub const SECRET_MARKER: &str = "secret_from_env";

/// Provider-conventional names accepted for well-known config paths.
const CONVENTIONAL_NAMES: &[(&str, &str)] = &[
    ("store.url", "SUPABASE_URL"),
    ("store.service_role_key", "SUPABASE_SERVICE_ROLE_KEY"),
    ("mercadopago.access_token", "MP_ACCESS_TOKEN"),
    ("mercadopago.webhook_secret", "MP_WEBHOOK_SECRET"),
    ("email.api_key", "RESEND_API_KEY"),
    ("zoom.account_id", "ZOOM_ACCOUNT_ID"),
];

/// Get the prefix for configuration environment variables
pub fn get_config_prefix() -> String {
    env::var("PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string())
}

/// Convert a configuration path to an environment variable name
///
/// `"server.host"` becomes `"PSICLINIC__SERVER__HOST"`.
pub fn config_path_to_env_var(path: &str) -> String {
    let prefix = get_config_prefix();
    let path = path.replace('.', CONFIG_SEPARATOR);
    format!("{}{}{}", prefix, CONFIG_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path to an environment variable name
///
/// `"twilio.auth_token"` becomes `"PSICLINIC_SECRET_TWILIO_AUTH_TOKEN"`.
pub fn secret_path_to_env_var(path: &str) -> String {
    let path = path.replace('.', SECRET_SEPARATOR);
    format!("{}{}{}", SECRET_PREFIX, SECRET_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path to its legacy environment variable name
///
/// `"twilio.auth_token"` becomes `"TWILIO_AUTH_TOKEN"`.
pub fn legacy_secret_path_to_env_var(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() < 2 {
        return path.to_uppercase();
    }

    let service = parts[0];
    let key = parts[1..].join(SECRET_SEPARATOR);
    format!("{}_{}", service, key).to_uppercase()
}

/// The provider-conventional variable name for a path, if there is one.
pub fn conventional_env_var(path: &str) -> Option<&'static str> {
    CONVENTIONAL_NAMES
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, name)| *name)
}

/// Get an environment variable for a configuration path
pub fn get_config_env_var(path: &str) -> Option<String> {
    let env_var = config_path_to_env_var(path);
    env::var(&env_var).ok()
}

/// Get an environment variable for a secret path
///
/// Tries the prefixed name, then the conventional provider name, then the
/// legacy name.
pub fn get_secret_env_var(path: &str) -> Option<String> {
    if let Ok(value) = env::var(secret_path_to_env_var(path)) {
        return Some(value);
    }

    if let Some(name) = conventional_env_var(path) {
        if let Ok(value) = env::var(name) {
            return Some(value);
        }
    }

    env::var(legacy_secret_path_to_env_var(path)).ok()
}

/// Check if a path is a secret path
///
/// Paths containing "secret", "key", "password", "token", or "sid" are considered secret.
pub fn is_secret_path(path: &str) -> bool {
    let path_lower = path.to_lowercase();
    path_lower.contains("secret")
        || path_lower.contains("key")
        || path_lower.contains("password")
        || path_lower.contains("token")
        || path_lower.contains("sid")
}

/// Get an environment variable for a path, using the secret lookup for secret paths.
pub fn get_env_var(path: &str) -> Option<String> {
    if is_secret_path(path) {
        get_secret_env_var(path)
    } else {
        get_config_env_var(path).or_else(|| get_secret_env_var(path))
    }
}

/// Replace every `"secret_from_env"` string inside `value` with its environment value.
///
/// Returns the dotted paths that stayed unresolved.
pub fn inject_env_vars(value: &mut serde_json::Value) -> Vec<String> {
    use serde_json::Value;

    fn walk(path: &mut Vec<String>, obj: &mut Value, missing: &mut Vec<String>) {
        match obj {
            Value::Object(map) => {
                for (k, v) in map.iter_mut() {
                    path.push(k.to_string());
                    walk(path, v, missing);
                    path.pop();
                }
            }
            Value::Array(arr) => {
                for (i, v) in arr.iter_mut().enumerate() {
                    path.push(i.to_string());
                    walk(path, v, missing);
                    path.pop();
                }
            }
            Value::String(s) if s == SECRET_MARKER => {
                let path_str = path.join(".");
                match get_env_var(&path_str) {
                    Some(env_val) => *s = env_val,
                    None => missing.push(path_str),
                }
            }
            _ => {}
        }
    }

    let mut missing = Vec::new();
    walk(&mut Vec::new(), value, &mut missing);
    missing
}
