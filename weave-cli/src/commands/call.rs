//! Call command - Invoke a named engine operation with JSON arguments
//!
//! The result is always printed as JSON; `--format` only controls whether
//! it is pretty-printed (table) or compact (json).

use crate::output::{JsonOutput, OutputConfig, OutputFormat};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use weave_core::WeaveConfig;

use super::open_engine;

/// Parse `--args`; absent means an empty object.
fn parse_arguments(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid JSON in --args: {}", raw))?;
    if !value.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }
    Ok(value)
}

pub fn run(
    root: &Path,
    config: WeaveConfig,
    operation: &str,
    arguments: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let arguments = parse_arguments(arguments)?;
    let mut engine = open_engine(config, root)?;
    let result = engine.dispatch(operation, &arguments)?;

    let config = match format {
        OutputFormat::Table => OutputConfig::new(OutputFormat::Json),
        OutputFormat::Json => OutputConfig::new(OutputFormat::Json).compact(),
    };
    println!("{}", JsonOutput::format(&result, &config));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(None).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_arguments(Some(r#"{"pattern_type": "aspx_page"}"#)).unwrap()["pattern_type"],
            "aspx_page"
        );
        assert!(parse_arguments(Some("[1, 2]")).is_err());
        assert!(parse_arguments(Some("{oops")).is_err());
    }
}
