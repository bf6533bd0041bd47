use std::{fmt, path::Path};

/// Longest single path component most filesystems accept.
const MAX_FILENAME_BYTES: usize = 255;

/// S3 and most compatible stores cap keys at 1024 bytes.
const MAX_OBJECT_KEY_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    Empty,
    TooLong,
    ContainsNullByte,
    ContainsPathSeparator,
    IsSpecialDirectory,
    ContainsControlCharacter,
    LeadingSlash,
    ParentSegment,
    InvalidFileName,
}

impl FilenameError {
    pub fn message(&self) -> &'static str {
        match self {
            FilenameError::Empty => "Filename cannot be empty",
            FilenameError::TooLong => "Filename is too long",
            FilenameError::ContainsNullByte => "Filename cannot contain null bytes",
            FilenameError::ContainsPathSeparator => {
                "Filename cannot contain path separators (/ or \\)"
            }
            FilenameError::IsSpecialDirectory => "Filename cannot be '.' or '..'",
            FilenameError::ContainsControlCharacter => "Key cannot contain control characters",
            FilenameError::LeadingSlash => "Key cannot start with '/'",
            FilenameError::ParentSegment => "Key cannot contain a '..' segment",
            FilenameError::InvalidFileName => "Invalid filename: must be a valid file name",
        }
    }
}

impl fmt::Display for FilenameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for FilenameError {}

/// Validate a name that will become a single file inside a storage root.
///
/// Anything that could resolve outside the root (separators, `..`) is rejected
/// rather than sanitized, so the stored name is always the one the client sent
/// modulo collision renaming.
pub fn validate_filename(filename: &str) -> Result<(), FilenameError> {
    if filename.is_empty() {
        return Err(FilenameError::Empty);
    }
    if filename.len() > MAX_FILENAME_BYTES {
        return Err(FilenameError::TooLong);
    }
    if filename.contains('\0') {
        return Err(FilenameError::ContainsNullByte);
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }
    if filename == "." || filename == ".." {
        return Err(FilenameError::IsSpecialDirectory);
    }

    // Path::file_name must give back exactly what we were handed
    let path = Path::new(filename);
    if path.file_name().and_then(|n| n.to_str()) != Some(filename) {
        return Err(FilenameError::InvalidFileName);
    }

    Ok(())
}

/// Validate an object-store key.
pub fn validate_object_key(key: &str) -> Result<(), FilenameError> {
    if key.is_empty() {
        return Err(FilenameError::Empty);
    }
    if key.len() > MAX_OBJECT_KEY_BYTES {
        return Err(FilenameError::TooLong);
    }
    if key.chars().any(char::is_control) {
        return Err(FilenameError::ContainsControlCharacter);
    }
    if key.starts_with('/') {
        return Err(FilenameError::LeadingSlash);
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(FilenameError::ParentSegment);
    }
    Ok(())
}
