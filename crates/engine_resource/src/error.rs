//! Resource-layer error types.

/// Errors from acquiring, creating or preloading resources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// The source has no data for this path.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// The path has no file extension, so no loader can be chosen.
    #[error("resource '{0}' has no file extension")]
    MissingExtension(String),

    /// No loader is registered for the extension.
    #[error("no loader registered for '.{extension}' (resource '{path}')")]
    UnknownType {
        /// The resource path.
        path: String,
        /// The unregistered extension.
        extension: String,
    },

    /// The resource exists but is not of the requested type.
    #[error("resource '{path}' is not a {expected}")]
    WrongType {
        /// The resource path.
        path: String,
        /// The type the caller asked for.
        expected: &'static str,
    },

    /// The resource bytes could not be decoded.
    #[error("resource '{path}' is malformed: {message}")]
    Format {
        /// The resource path.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// Reading the source failed for a reason other than a missing file.
    #[error("failed to read resource '{path}': {message}")]
    Io {
        /// The resource path.
        path: String,
        /// OS error message.
        message: String,
    },

    /// The resource depends on itself, directly or transitively.
    #[error("resource '{0}' depends on itself")]
    Loop(String),

    /// The store holds as many resources as it is configured to.
    #[error("resource store is full ({0} resources)")]
    OutOfResources(usize),

    /// The preloader finished loading but the completion step rejected it.
    #[error("preload completion failed: {0}")]
    Completion(String),
}
