#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid id parameter")]
pub struct InvalidIdParam;

/// Parses the `id` path segment of a resource route.
///
/// Only canonical base-10 integers of at least 1 are accepted.
pub fn read_id_param(raw: &str) -> Result<i64, InvalidIdParam> {
    let id: i64 = raw.parse().map_err(|_| InvalidIdParam)?;

    if id < 1 || id.to_string() != raw {
        return Err(InvalidIdParam);
    }

    Ok(id)
}
