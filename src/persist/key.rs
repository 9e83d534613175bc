use crate::error::{PersistError, PersistResult};

/// Derive the storage key for a container.
///
/// `"{prefix}:{name}"` when both are present, otherwise whichever one is.
/// Empty strings count as absent.
pub fn storage_key(prefix: Option<&str>, name: Option<&str>) -> PersistResult<String> {
    let prefix = prefix.filter(|p| !p.is_empty());
    let name = name.filter(|n| !n.is_empty());

    match (prefix, name) {
        (Some(prefix), Some(name)) => Ok(format!("{}:{}", prefix, name)),
        (None, Some(name)) => Ok(name.to_string()),
        (Some(prefix), None) => Ok(prefix.to_string()),
        (None, None) => Err(PersistError::Configuration(
            "store has no name and no prefix key was configured".to_string(),
        )),
    }
}
