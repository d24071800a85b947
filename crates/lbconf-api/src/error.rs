use std::{borrow::Cow, fmt::Write as _};

/// What went wrong while turning an annotation value into configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The raw string doesn't match the grammar for its key.
    Parse,

    /// The value parsed, but the target object rejected it.
    Validation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Parse => f.write_str("parse error"),
            ErrorKind::Validation => f.write_str("validation error"),
        }
    }
}

/// An error applying a single annotation to a configuration object.
///
/// Errors contain a message about what went wrong and a path to the key or
/// field that caused problems. They are always scoped to exactly one key and
/// never leave the target object partially modified.
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
pub struct Error {
    kind: ErrorKind,

    // an error message
    message: Cow<'static, str>,

    // the reversed path to the field where the error happened.
    //
    // the leaf of the path is built up at path[0] with the root at the end.
    // see ErrorContext for how this gets done.
    path: Vec<PathEntry>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path())?;
        }

        f.write_str(&self.message)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("path", &self.path())
            .finish()
    }
}

impl Error {
    /// Create a new parse error.
    pub fn parse(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            path: vec![],
        }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            path: vec![],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_parse(&self) -> bool {
        self.kind == ErrorKind::Parse
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    pub fn path(&self) -> String {
        path_str(self.path.iter().rev())
    }

    /// Append a new field to this error's path.
    pub fn with_field(mut self, field: &'static str) -> Self {
        self.path.push(PathEntry::Field(field));
        self
    }

    /// Append a new index to this error's path.
    pub fn with_index(mut self, index: usize) -> Self {
        self.path.push(PathEntry::Index(index));
        self
    }
}

/// Join an iterator of PathEntry together into a path string.
///
/// This isn't quite `entries.join('.')` because index fields exist and have to
/// be bracketed.
fn path_str<'a, I>(path: I) -> String
where
    I: IntoIterator<Item = &'a PathEntry>,
{
    let mut buf = String::with_capacity(16);

    for (i, path_entry) in path.into_iter().enumerate() {
        if i > 0 && path_entry.is_field() {
            buf.push('.');
        }
        let _ = write!(&mut buf, "{}", path_entry);
    }

    buf
}

/// Add field-path context to an error by appending an entry to its path.
/// Because context is added at the callsite, a function can add its own
/// fields and the path ends up in the appropriate order.
pub trait ErrorContext<T>: Sized {
    fn with_field(self, field: &'static str) -> Result<T, Error>;
    fn with_index(self, index: usize) -> Result<T, Error>;

    /// Shorthand for `with_index(idx).with_field(name)`, but in a slightly more
    /// inutitive order.
    fn with_field_index(self, field: &'static str, index: usize) -> Result<T, Error> {
        self.with_index(index).with_field(field)
    }
}

impl<T> ErrorContext<T> for Result<T, Error> {
    fn with_field(self, field: &'static str) -> Result<T, Error> {
        self.map_err(|e| e.with_field(field))
    }

    fn with_index(self, index: usize) -> Result<T, Error> {
        self.map_err(|e| e.with_index(index))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
enum PathEntry {
    Field(&'static str),
    Index(usize),
}

impl PathEntry {
    fn is_field(&self) -> bool {
        matches!(self, PathEntry::Field(_))
    }
}

impl std::fmt::Display for PathEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathEntry::Field(field) => f.write_str(field),
            PathEntry::Index(idx) => f.write_fmt(format_args!("[{idx}]")),
        }
    }
}
