use crate::infrastructure::error::AppError;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4817;
const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com/";

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "FocusDeck",
        "host": DEFAULT_HOST,
        "port": DEFAULT_PORT,
        "notionApiBase": DEFAULT_NOTION_API_BASE,
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), AppError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, AppError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| AppError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(AppError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_listen_address(config_dir: &Path) -> Result<(String, u16), AppError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let host = app
        .get("host")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_HOST)
        .to_string();
    let port = app
        .get("port")
        .and_then(serde_json::Value::as_u64)
        .and_then(|value| u16::try_from(value).ok())
        .unwrap_or(DEFAULT_PORT);
    Ok((host, port))
}

pub fn read_notion_api_base(config_dir: &Path) -> Result<String, AppError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("notionApiBase")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_NOTION_API_BASE)
        .to_string())
}
