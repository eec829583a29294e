use super::classification::Classification;

/// Host used for placeholder URLs when object storage is unavailable.
pub const FALLBACK_URL_BASE: &str = "https://s3-fallback-storage";

/// Object name for an upload: `<millis>_<file name>` followed by
/// `_<key>-<value>` for each classification parameter in supplied order.
///
/// Not collision-checked. Two uploads in the same millisecond with the same
/// name and parameters map to the same object.
pub fn object_name(timestamp_millis: i64, file_name: &str, params: &Classification) -> String {
    let mut name = format!("{timestamp_millis}_{file_name}");
    for (key, value) in params.iter() {
        name.push('_');
        name.push_str(key);
        name.push('-');
        name.push_str(value);
    }
    name
}

/// Identifier of a placeholder object: `<millis>_<file name>`.
pub fn fallback_file_id(timestamp_millis: i64, file_name: &str) -> String {
    format!("{timestamp_millis}_{file_name}")
}

pub fn fallback_url(file_id: &str) -> String {
    format!("{FALLBACK_URL_BASE}/{file_id}")
}
