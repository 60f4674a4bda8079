/// `load_config` module: Loads the YAML site configuration, injects secrets from the
/// environment where the file leaves them blank, and resolves it into a [`CliConfig`].
///
/// This module is the only place where user-supplied YAML is parsed and mapped to the
/// strongly-typed settings the core consumes.
///
/// # Responsibilities
/// - Write a template configuration when none exists, so first-time users have something to fill in
/// - Parse `_site_bucket.yml` (or the file given with `--config`) into type-safe structs
/// - Fall back to `S3_ID`, `S3_SECRET` and `S3_BUCKET` from the environment (and `.env`)
/// - Reject configurations missing any of the three required values
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use site_bucket_core::config::SyncConfig;
use site_bucket_core::deletion::DeletionDecision;
use site_bucket_core::retry::RetryPolicy;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const CONFIGURATION_FILE: &str = "_site_bucket.yml";
pub const SITE_DIR: &str = "_site";
pub const DEFAULT_REGION: &str = "us-east-1";

pub const CONFIGURATION_TEMPLATE: &str = r#"s3_id: YOUR_AWS_S3_ACCESS_KEY_ID
s3_secret: YOUR_AWS_S3_SECRET_ACCESS_KEY
s3_bucket: your.blog.bucket.com
# Optional settings:
# s3_region: us-east-1
# s3_endpoint: https://s3.example.com
# site_dir: _site
# include_hidden: false
# upload_concurrency: 1
# delete_policy: prompt   # prompt | delete-all | keep-all
# retry:
#   delay_secs: 5
#   max_retries: null     # null retries timeouts forever
"#;

/// Access key pair for the store. The secret is redacted from debug output.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Everything the CLI needs to connect and run one sync.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub credentials: Credentials,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub sync: SyncConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    s3_id: Option<String>,
    s3_secret: Option<String>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>,
    site_dir: Option<PathBuf>,
    #[serde(default)]
    include_hidden: bool,
    upload_concurrency: Option<usize>,
    delete_policy: Option<DeletionDecision>,
    retry: Option<RetryPolicy>,
}

/// Write the template configuration to `path` unless a file already exists there.
/// Returns whether the template was written.
pub fn write_template<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        info!(config_path = ?path, "Configuration file already exists, leaving it untouched");
        return Ok(false);
    }
    fs::write(path, CONFIGURATION_TEMPLATE)
        .with_context(|| format!("Failed to write configuration template to {}", path.display()))?;
    info!(config_path = ?path, "Wrote configuration template");
    Ok(true)
}

/// Pick the YAML value if it is non-empty, else the environment variable `env_key`.
fn required(value: Option<String>, yaml_key: &str, env_key: &str) -> Result<String> {
    let from_file = value.filter(|v| !v.trim().is_empty());
    let resolved = from_file.or_else(|| {
        std::env::var(env_key)
            .ok()
            .filter(|v| !v.trim().is_empty())
    });
    match resolved {
        Some(v) => Ok(v),
        None => {
            error!(key = yaml_key, env = env_key, "Required configuration value missing");
            anyhow::bail!(
                "Malformed configuration: `{yaml_key}` is missing or empty (and {env_key} is not set)"
            )
        }
    }
}

/// Loads the YAML config at `path`, writing a template first if it does not exist.
/// Returns a fully resolved CLI config or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    if !path_ref.exists() {
        warn!(config_path = ?path_ref, "Configuration file missing, writing template");
        write_template(path_ref)?;
        anyhow::bail!(
            "No configuration file found at {}. A template was created; fill in your S3 credentials and bucket, then run again.",
            path_ref.display()
        );
    }

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty document deserialises to null; treat it as "nothing set".
    let raw: RawConfig = if config_content.trim().is_empty() {
        RawConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!(
                    "Malformed configuration: failed to parse config YAML: {e}"
                ));
            }
        }
    };

    let access_key_id = required(raw.s3_id, "s3_id", "S3_ID")?;
    let secret_access_key = required(raw.s3_secret, "s3_secret", "S3_SECRET")?;
    let bucket = required(raw.s3_bucket, "s3_bucket", "S3_BUCKET")?;

    let upload_concurrency = raw.upload_concurrency.unwrap_or(1);
    if upload_concurrency == 0 {
        error!("upload_concurrency must be at least 1");
        anyhow::bail!("Malformed configuration: `upload_concurrency` must be at least 1");
    }

    let sync = SyncConfig {
        site_dir: raw.site_dir.unwrap_or_else(|| PathBuf::from(SITE_DIR)),
        include_hidden: raw.include_hidden,
        upload_concurrency,
        delete_policy: raw.delete_policy.unwrap_or_default(),
        retry: raw.retry.unwrap_or_default(),
    };

    let region = raw
        .s3_region
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    info!(
        bucket = %bucket,
        region = %region,
        site_dir = %sync.site_dir.display(),
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        credentials: Credentials {
            access_key_id,
            secret_access_key,
        },
        bucket,
        region,
        endpoint: raw.s3_endpoint.filter(|e| !e.trim().is_empty()),
        sync,
    })
}
