pub mod filesystem;
pub mod memory;

pub use filesystem::FsIndexStore;
pub use memory::MemoryIndexStore;

use crate::IndexError;

/// Index names become directory names; anything that could escape the store
/// root is refused.
pub(crate) fn validate_name(name: &str) -> Result<(), IndexError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
        || trimmed != name
    {
        return Err(IndexError::InvalidName(name.to_string()));
    }
    Ok(())
}
