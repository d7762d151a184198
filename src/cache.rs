use std::path::Path;
use std::time::{Duration, SystemTime};

/// True when the artifact at `path` needs a fresh fetch: the file is absent,
/// its metadata is unreadable, or its age has reached `max_age`.
///
/// Pure query; the caller decides what to do about a stale slot.
pub fn should_refetch(path: &Path, max_age: Duration) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else {
        return true;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age >= max_age,
        // Modification time in the future; treat the file as fresh.
        Err(_) => false,
    }
}
