/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("identifier must not be empty".to_string());
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "identifier '{name}' must start with a letter or underscore"
        ));
    }
    if let Some(ch) = chars.find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
        return Err(format!("identifier '{name}' contains invalid character '{ch}'"));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(format!("identifier '{name}' uses the reserved sqlite_ prefix"));
    }
    Ok(())
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
