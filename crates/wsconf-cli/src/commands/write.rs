//! Commands writing settings: set, unset

use colored::Colorize;
use serde_json::Value;
use wsconf_core::UpdateOptions;
use wsconf_model::ConfigurationTarget;

use crate::cli::ScopeArgs;
use crate::context::Context;
use crate::error::Result;

/// JSON when `raw` parses as JSON, otherwise the raw text as a string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn run_set(
    context: &Context,
    key: &str,
    raw: &str,
    target: Option<ConfigurationTarget>,
    scope: &ScopeArgs,
) -> Result<()> {
    let overrides = context.overrides(scope)?;
    let value = parse_value(raw);
    context
        .service
        .update_value(key, Some(value.clone()), &overrides, target, UpdateOptions::quiet())
        .await?;

    println!("{} Set {} = {}", "OK".green().bold(), key.cyan(), value);
    Ok(())
}

pub async fn run_unset(
    context: &Context,
    key: &str,
    target: Option<ConfigurationTarget>,
    scope: &ScopeArgs,
) -> Result<()> {
    let overrides = context.overrides(scope)?;
    context
        .service
        .update_value(key, None, &overrides, target, UpdateOptions::quiet())
        .await?;

    println!("{} Removed {}", "OK".green().bold(), key.cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_first() {
        assert_eq!(parse_value("2"), json!(2));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value(r#"{"a": [1]}"#), json!({"a": [1]}));
        assert_eq!(parse_value(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn other_text_is_a_string() {
        assert_eq!(parse_value("bash"), json!("bash"));
        assert_eq!(parse_value("{broken"), json!("{broken"));
    }
}
