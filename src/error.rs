use std::borrow::Cow;
use std::error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;
use std::result;

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = result::Result<T, E>;


/// An enum providing a rough classification of errors.
///
/// The variants of this type partially resemble those of
/// [`std::io::ErrorKind`], because these are the most common sources of
/// error that our crate concerns itself with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The log or a symbol dump contained data not valid for the
    /// operation at hand.
    InvalidData,
    /// A parameter was incorrect.
    InvalidInput,
    /// An entity, such as a file, was not found.
    NotFound,
    /// The operation lacked the necessary privileges to complete.
    PermissionDenied,
    /// The operation is not supported.
    Unsupported,
    /// A custom error that does not fall under any other I/O error
    /// kind.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            Self::InvalidData => "invalid data",
            Self::InvalidInput => "invalid input",
            Self::NotFound => "entity not found",
            Self::PermissionDenied => "permission denied",
            Self::Unsupported => "unsupported",
            Self::Other => "other error",
        };
        f.write_str(s)
    }
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::InvalidData => Self::InvalidData,
            io::ErrorKind::InvalidInput => Self::InvalidInput,
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::Unsupported => Self::Unsupported,
            _ => Self::Other,
        }
    }
}


enum ErrorImpl {
    Io(io::Error),
    Adhoc {
        kind: ErrorKind,
        message: Cow<'static, str>,
    },
    Context {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(err) => ErrorKind::from(err.kind()),
            Self::Adhoc { kind, .. } => *kind,
            Self::Context { source, .. } => source.kind(),
        }
    }
}

impl Debug for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut dbg = f.debug_struct(stringify!(Error));
        let mut layer = Some(self);
        let mut idx = 0usize;

        while let Some(l) = layer {
            match l {
                Self::Io(err) => {
                    let _dbg = dbg.field(&format!("error.{idx}"), err);
                    layer = None;
                }
                Self::Adhoc { message, .. } => {
                    let _dbg = dbg.field(&format!("error.{idx}"), message);
                    layer = None;
                }
                Self::Context { context, source } => {
                    let _dbg = dbg.field(&format!("context.{idx}"), context);
                    layer = Some(&**source);
                }
            }
            idx += 1;
        }
        dbg.finish()
    }
}

impl Display for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Io(err) => Display::fmt(err, f),
            Self::Adhoc { message, .. } => f.write_str(message),
            Self::Context { context, .. } => f.write_str(context),
        }
    }
}

impl error::Error for ErrorImpl {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => err.source(),
            Self::Adhoc { .. } => None,
            Self::Context { source, .. } => Some(&**source),
        }
    }
}


/// The error type used throughout the library.
///
/// Errors are cheap to move around (a single boxed pointer) and carry a
/// chain of context layers that is reported through the standard
/// [`source`][error::Error::source] mechanism.
pub struct Error {
    /// The top-most layer of the error.
    error: Box<ErrorImpl>,
}

impl Error {
    fn with_adhoc<M>(kind: ErrorKind, message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self {
            error: Box::new(ErrorImpl::Adhoc {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Create an error of kind [`ErrorKind::InvalidData`].
    pub fn with_invalid_data<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_adhoc(ErrorKind::InvalidData, message)
    }

    /// Create an error of kind [`ErrorKind::InvalidInput`].
    pub fn with_invalid_input<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_adhoc(ErrorKind::InvalidInput, message)
    }

    /// Create an error of kind [`ErrorKind::NotFound`].
    pub fn with_not_found<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_adhoc(ErrorKind::NotFound, message)
    }

    /// Create an error of kind [`ErrorKind::Unsupported`].
    pub fn with_unsupported<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_adhoc(ErrorKind::Unsupported, message)
    }

    /// Retrieve a rough classification of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    fn layer_context(self, context: Cow<'static, str>) -> Self {
        Self {
            error: Box::new(ErrorImpl::Context {
                context,
                source: self.error,
            }),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.error, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.error, f)?;

        if f.alternate() {
            let mut source = error::Error::source(&*self.error);
            while let Some(err) = source {
                let () = write!(f, ": {err}")?;
                source = err.source();
            }
        }
        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        error::Error::source(&*self.error)
    }
}

impl From<io::Error> for Error {
    fn from(other: io::Error) -> Self {
        Self {
            error: Box::new(ErrorImpl::Io(other)),
        }
    }
}


/// A trait providing ergonomic chaining capabilities to [`Error`].
pub trait ErrorExt: Sized {
    /// The output type produced by [`context`](Self::context) and
    /// [`with_context`](Self::with_context).
    type Output;

    /// Add context to this error.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>;

    /// Add context to this error, lazily evaluated.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        self.layer_context(context.into())
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.layer_context(f().into())
    }
}

impl<T, E> ErrorExt for Result<T, E>
where
    E: ErrorExt,
{
    type Output = Result<T, E::Output>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        self.map_err(|err| err.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.with_context(f))
    }
}

impl ErrorExt for io::Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        Error::from(self).context(context)
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        Error::from(self).with_context(f)
    }
}


/// A trait for conversion of `Option` into our [`Result`].
pub(crate) trait IntoError<T>: Sized {
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;
}

impl<T> IntoError<T> for Option<T> {
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::with_invalid_input(f()))
    }
}
