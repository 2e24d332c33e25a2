//! Upload validation.
//!
//! Pure checks over the upload's filename and byte length. Content is
//! never inspected here; a well-formed name with garbage bytes is the
//! decoder's problem.

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["wav", "mp3", "ogg", "flac", "m4a"];

/// 10 MiB upload ceiling.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no file provided")]
    MissingFile,
    #[error("no file selected")]
    EmptyFilename,
    #[error("invalid file type: {0}")]
    InvalidType(String),
    #[error("file too large: {0} bytes")]
    TooLarge(usize),
}

impl ValidationError {
    pub(crate) fn wire_parts(&self) -> (&'static str, String) {
        match self {
            ValidationError::MissingFile => {
                ("No file provided", "Please upload an audio file".into())
            }
            ValidationError::EmptyFilename => {
                ("No file selected", "Please select an audio file".into())
            }
            ValidationError::InvalidType(_) => (
                "Invalid file type",
                format!("Allowed types: {}", ALLOWED_EXTENSIONS.join(", ")),
            ),
            ValidationError::TooLarge(_) => {
                ("File too large", "Maximum file size is 10MB".into())
            }
        }
    }
}

/// Lower-cased extension of `filename`, if it has one.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Checks the filename alone. Runs before any bytes are read so a
/// disallowed type is rejected without draining the upload.
pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    match file_extension(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ValidationError::InvalidType(filename.to_string())),
    }
}

/// Checks the collected byte length against the upload ceiling.
pub fn validate_size(len: usize) -> Result<(), ValidationError> {
    if len > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge(len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        for name in ["song.wav", "song.mp3", "song.ogg", "song.flac", "song.m4a"] {
            assert!(validate_filename(name).is_ok(), "{} should pass", name);
        }
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert!(validate_filename("track.WAV").is_ok());
        assert!(validate_filename("track.Mp3").is_ok());
    }

    #[test]
    fn test_disallowed_extension() {
        assert_eq!(
            validate_filename("song.txt"),
            Err(ValidationError::InvalidType("song.txt".into()))
        );
        assert_eq!(
            validate_filename("song.aiff"),
            Err(ValidationError::InvalidType("song.aiff".into()))
        );
    }

    #[test]
    fn test_no_extension() {
        assert_eq!(
            validate_filename("song"),
            Err(ValidationError::InvalidType("song".into()))
        );
        assert_eq!(
            validate_filename("song."),
            Err(ValidationError::InvalidType("song.".into()))
        );
    }

    #[test]
    fn test_empty_filename() {
        assert_eq!(validate_filename(""), Err(ValidationError::EmptyFilename));
    }

    #[test]
    fn test_size_limit_boundary() {
        assert!(validate_size(MAX_FILE_SIZE).is_ok());
        assert_eq!(
            validate_size(MAX_FILE_SIZE + 1),
            Err(ValidationError::TooLarge(MAX_FILE_SIZE + 1))
        );
        assert!(validate_size(0).is_ok());
    }

    #[test]
    fn test_wire_parts_echo_constraint() {
        let (error, details) = ValidationError::InvalidType("song.txt".into()).wire_parts();
        assert_eq!(error, "Invalid file type");
        assert!(details.contains("wav"));

        let (error, details) = ValidationError::TooLarge(11_000_000).wire_parts();
        assert_eq!(error, "File too large");
        assert_eq!(details, "Maximum file size is 10MB");
    }
}
