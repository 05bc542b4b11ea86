//! CLI probe over a property database.
//!
//! # Responsibility
//! - Print every key id, or one loaded key with its values as JSON.
//! - Keep output deterministic for quick local inspection.
//!
//! # Environment
//! - `PROPVAULT_CONFIG`: optional `StoreConfig` JSON document.
//! - `PROPVAULT_LOG_DIR`: enables file logging into this directory.

use propvault_core::{
    init_logging, open_db_with_config, KeyValues, LoggingConfig, SqlitePersistenceService,
    StoreConfig,
};
use serde_json::{json, Value};
use std::env;
use std::process::ExitCode;

const USAGE: &str = "usage: propvault <db-path> [key]";

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();
    match run(&args) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("propvault: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<String, String> {
    let (path, key) = match args {
        [path] => (path, None),
        [path, key] => (path, Some(key.as_str())),
        _ => return Err(USAGE.to_string()),
    };

    let config = match env::var("PROPVAULT_CONFIG") {
        Ok(raw) => StoreConfig::from_json_str(&raw).map_err(|err| err.to_string())?,
        Err(_) => StoreConfig::default(),
    };
    if let Ok(log_dir) = env::var("PROPVAULT_LOG_DIR") {
        init_logging(&LoggingConfig::new(log_dir))?;
    }

    let conn = open_db_with_config(path, &config).map_err(|err| err.to_string())?;
    let service = SqlitePersistenceService::try_new(&conn, &config).map_err(|err| err.to_string())?;

    let output = match key {
        None => json!(service.list_keys().map_err(|err| err.to_string())?),
        Some(id) => {
            let loaded = service
                .load::<Value, _>(id, &service.key_values_factory())
                .map_err(|err| err.to_string())?;
            match loaded {
                Some(key_values) => render_key_values(id, &key_values),
                None => return Err(format!("key `{id}` not found")),
            }
        }
    };
    serde_json::to_string_pretty(&output).map_err(|err| err.to_string())
}

fn render_key_values(id: &str, key_values: &KeyValues<Value>) -> Value {
    let values = key_values
        .domain_specific_values()
        .map(|value| {
            json!({
                "pattern": value.pattern,
                "change_set": value.change_set,
                "value": value.value,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "key": id,
        "description": key_values.description(),
        "values": values,
    })
}

#[cfg(test)]
mod tests {
    use super::{render_key_values, run, USAGE};
    use propvault_core::KeyValues;
    use serde_json::json;

    #[test]
    fn run_rejects_missing_arguments() {
        assert_eq!(run(&[]), Err(USAGE.to_string()));
    }

    #[test]
    fn render_lists_values_in_slot_order() {
        let mut key_values = KeyValues::new();
        key_values.set_description(Some("vat rate".to_string()));
        key_values
            .put_with_change_set(Some("2025"), json!(0.2), &["AT"])
            .expect("put should succeed");
        key_values.put(json!(0.19), &["DE"]).expect("put should succeed");

        assert_eq!(
            render_key_values("vat", &key_values),
            json!({
                "key": "vat",
                "description": "vat rate",
                "values": [
                    {"pattern": "AT", "change_set": "2025", "value": 0.2},
                    {"pattern": "DE", "change_set": null, "value": 0.19},
                ],
            })
        );
    }
}
