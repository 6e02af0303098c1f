//! Path Validation module for receipt path containment
//!
//! Receipt paths come back from clients on confirmation, so they are treated
//! as untrusted input. Validation runs in layers:
//!
//! - Lexical checks (empty, NUL bytes, length, `..` segments, absolute paths)
//! - Namespace check: the first segment must be the caller's own directory
//! - Existence check: the path must name a regular file
//! - Canonical check: after resolving symlinks the file must still live in
//!   the caller's directory
//!
//! ## Usage Examples
//!
//! ```rust
//! use receipt_ledger::path_validation::{normalize_receipt_path, PathValidationError};
//! use uuid::Uuid;
//!
//! let owner = Uuid::new_v4();
//! let path = format!("{}/receipt_0123.jpg", owner);
//! assert!(normalize_receipt_path(&owner, &path).is_ok());
//! assert_eq!(
//!     normalize_receipt_path(&owner, "../../etc/passwd"),
//!     Err(PathValidationError::PathTraversal)
//! );
//! ```

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

/// Errors that can occur during path validation
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    /// Empty path provided
    EmptyPath,
    /// Path contains null bytes
    NullByte,
    /// Path is too long
    PathTooLong,
    /// Path contains dangerous traversal sequences (..)
    PathTraversal,
    /// Path is absolute
    AbsolutePathNotAllowed,
    /// Path does not name a file inside any namespace
    NotInNamespace,
    /// Path belongs to another user's namespace
    ForeignNamespace,
    /// Path does not exist or is not a regular file
    NotFound,
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::EmptyPath => write!(f, "path is empty"),
            PathValidationError::NullByte => write!(f, "path contains a null byte"),
            PathValidationError::PathTooLong => {
                write!(f, "path exceeds {} bytes", MAX_PATH_LENGTH)
            }
            PathValidationError::PathTraversal => {
                write!(f, "path contains parent directory segments")
            }
            PathValidationError::AbsolutePathNotAllowed => {
                write!(f, "path must be relative to the uploads root")
            }
            PathValidationError::NotInNamespace => {
                write!(f, "path must point to a file inside a user directory")
            }
            PathValidationError::ForeignNamespace => {
                write!(f, "path belongs to another user")
            }
            PathValidationError::NotFound => write!(f, "receipt file not found"),
        }
    }
}

impl std::error::Error for PathValidationError {}

/// Result type for path validation operations
pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum allowed path length (4096 bytes on most systems)
pub const MAX_PATH_LENGTH: usize = 4096;

/// Lexically validate a client-supplied receipt path.
///
/// Returns the normalized path relative to the uploads root. `.` segments
/// are dropped; `..` segments and backslashes are rejected outright rather
/// than resolved.
pub fn normalize_receipt_path(owner_id: &Uuid, path: &str) -> PathValidationResult<PathBuf> {
    if path.trim().is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(PathValidationError::PathTooLong);
    }

    if path.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    // Windows-style separators would hide traversal from component parsing
    if path.contains('\\') {
        return Err(PathValidationError::PathTraversal);
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::ParentDir => return Err(PathValidationError::PathTraversal),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathValidationError::AbsolutePathNotAllowed)
            }
            Component::CurDir => {}
            Component::Normal(segment) => normalized.push(segment),
        }
    }

    let mut segments = normalized.components();
    let namespace = match segments.next() {
        Some(Component::Normal(first)) => first.to_string_lossy().into_owned(),
        _ => return Err(PathValidationError::EmptyPath),
    };

    if namespace != owner_id.to_string() {
        return Err(PathValidationError::ForeignNamespace);
    }

    if segments.next().is_none() {
        return Err(PathValidationError::NotInNamespace);
    }

    Ok(normalized)
}

/// Resolve a receipt path to an existing file owned by `owner_id`.
///
/// Runs the lexical checks, then confirms the file exists and that its
/// canonical location is still inside `<root>/<owner_id>/`.
pub async fn resolve_owned_receipt(
    root: &Path,
    owner_id: &Uuid,
    path: &str,
) -> PathValidationResult<PathBuf> {
    let relative = normalize_receipt_path(owner_id, path)?;
    let candidate = root.join(&relative);

    match tokio::fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(PathValidationError::NotFound),
    }

    let owner_dir = tokio::fs::canonicalize(root.join(owner_id.to_string()))
        .await
        .map_err(|_| PathValidationError::NotFound)?;
    let canonical = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|_| PathValidationError::NotFound)?;

    if !canonical.starts_with(&owner_dir) {
        tracing::warn!(
            owner_id = %owner_id,
            path = %path,
            "Receipt path resolves outside the owner's directory"
        );
        return Err(PathValidationError::ForeignNamespace);
    }

    Ok(canonical)
}
