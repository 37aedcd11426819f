//! Layered configuration (file + environment) providing defaults for the
//! CLI flags. CLI flags always win; this only fills in what the caller
//! didn't pass explicitly.

use std::path::PathBuf;

use config::{Config, Environment, File};

/// Optional defaults loaded from `apns-cli.{toml,yaml,json,...}` (or a
/// caller-supplied path) and `APNS_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    pub mode: Option<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub key_password: Option<String>,
    pub pkcs12: Option<PathBuf>,
    pub pkcs12_password: Option<String>,
    pub reconnect_on_error: Option<bool>,
}

/// Load defaults from an optional config file plus `APNS_`-prefixed
/// environment variables. Missing files and missing keys are not errors:
/// every field in [`Defaults`] is itself optional.
pub fn load(config_file: Option<&str>) -> anyhow::Result<Defaults> {
    let mut builder = Config::builder().add_source(
        File::with_name(config_file.unwrap_or("apns-cli")).required(config_file.is_some()),
    );
    builder = builder.add_source(Environment::with_prefix("APNS").separator("_"));
    let settings = builder.build()?;

    Ok(Defaults {
        mode: settings.get_string("mode").ok(),
        cert: settings.get_string("cert").ok().map(PathBuf::from),
        key: settings.get_string("key").ok().map(PathBuf::from),
        key_password: settings.get_string("key_password").ok(),
        pkcs12: settings.get_string("pkcs12").ok().map(PathBuf::from),
        pkcs12_password: settings.get_string("pkcs12_password").ok(),
        reconnect_on_error: settings.get_bool("reconnect_on_error").ok(),
    })
}
