use serde::Serialize;
use serde_json::{json, Value};
use crate::cli::OutputFormat;
use crate::error::ClientError;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error in the appropriate format. Auth failures point at login.
pub fn output_error(output_format: &OutputFormat, error: &ClientError) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&error.to_json())?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", error.user_message());
            if error.requires_login() {
                eprintln!("Run `juris auth login <email>` to start a new session");
            }
        }
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(
    output_format: &OutputFormat,
    collection_name: &str,
    message: &str,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                collection_name: []
            }))?);
        }
        OutputFormat::Text => {
            println!("{}", message);
        }
    }
    Ok(())
}

/// Output a collection: JSON as-is, text one line per record
pub fn output_collection<T, F>(
    output_format: &OutputFormat,
    collection_name: &str,
    items: &[T],
    line: F,
) -> anyhow::Result<()>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    if items.is_empty() {
        return output_empty_collection(output_format, collection_name, &format!("No {} found", collection_name));
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: items }))?);
        }
        OutputFormat::Text => {
            for item in items {
                println!("{}", line(item));
            }
        }
    }
    Ok(())
}

/// Output a single record
pub fn output_record<T: Serialize>(
    output_format: &OutputFormat,
    record: &T,
    lines: Vec<(&str, String)>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        OutputFormat::Text => {
            for (label, value) in lines {
                if !value.is_empty() {
                    println!("{}: {}", label, value);
                }
            }
        }
    }
    Ok(())
}

/// Extract target item from optional parameter or use current
pub fn resolve_target_item(
    provided_name: Option<String>,
    current_getter: impl Fn() -> anyhow::Result<Option<String>>,
    item_type: &str,
) -> anyhow::Result<String> {
    match provided_name {
        Some(name) => Ok(name),
        None => {
            match current_getter()? {
                Some(current) => Ok(current),
                None => Err(anyhow::anyhow!("No current {} set", item_type)),
            }
        }
    }
}

/// Read a password from the flag or, failing that, a line of stdin
pub fn read_password(provided: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = provided {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("JURIS_PASSWORD") {
        return Ok(password);
    }

    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_provided() {
        let resolved = resolve_target_item(Some("p2".to_string()), || Ok(Some("p1".to_string())), "project").unwrap();
        assert_eq!(resolved, "p2");
    }

    #[test]
    fn test_resolve_falls_back_to_current() {
        let resolved = resolve_target_item(None, || Ok(Some("p1".to_string())), "project").unwrap();
        assert_eq!(resolved, "p1");

        let err = resolve_target_item(None, || Ok(None), "project").unwrap_err();
        assert_eq!(err.to_string(), "No current project set");
    }
}
