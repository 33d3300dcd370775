use crate::domain::models::TimerSettings;
use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const DEFAULT_API_BASE: &str = "http://localhost:3000/api/";
const DEFAULT_DOCUMENT_BASE: &str = "http://localhost:3000/";
const CONFIG_SCHEMA: u64 = 1;

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Study Tracker",
                "apiBase": DEFAULT_API_BASE,
                "documentBase": DEFAULT_DOCUMENT_BASE
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "sessionLength": 25,
                "breakLength": 5,
                "focusTimerColor": "blue"
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != CONFIG_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Base URL every backend path is joined onto. Always ends with `/`.
pub fn read_api_base(config_dir: &Path) -> Result<Url, InfraError> {
    read_base_url(config_dir, "apiBase", DEFAULT_API_BASE)
}

/// Origin serving the static pages, `pip.html` included.
pub fn read_document_base(config_dir: &Path) -> Result<Url, InfraError> {
    read_base_url(config_dir, "documentBase", DEFAULT_DOCUMENT_BASE)
}

fn read_base_url(config_dir: &Path, key: &str, fallback: &str) -> Result<Url, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let raw = app
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback);
    parse_base_url(raw)
}

pub fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid base url '{raw}': {error}")))
}

pub fn read_timer_settings(config_dir: &Path) -> Result<TimerSettings, InfraError> {
    let path = config_dir.join(TIMER_JSON);
    let raw = read_config(&path)?;
    let settings: TimerSettings = serde_json::from_value(raw)?;
    settings
        .validate()
        .map_err(|message| InfraError::InvalidConfig(format!("{message} in {}", path.display())))?;
    Ok(settings)
}

pub fn save_timer_settings(config_dir: &Path, settings: &TimerSettings) -> Result<(), InfraError> {
    settings.validate().map_err(InfraError::InvalidConfig)?;

    let mut value = serde_json::to_value(settings)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("timer settings must serialize to an object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::json!(CONFIG_SCHEMA));
    write_config(&config_dir.join(TIMER_JSON), &value)
}
