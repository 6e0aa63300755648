use std::fmt;

/// Closed set of error kinds raised by this crate.
///
/// Parse-time kinds (`MalformedRange`, `MalformedTemplate`, `SchemaMismatch`,
/// `UnknownResource`, `UnknownFeature`) are meant to be fatal at startup.
/// `ExternalToolFailure` and `PreconditionViolated` can surface at any point
/// where an external collaborator or an API contract is violated.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SeqCrfErrorKind {
    MalformedRange,
    MalformedTemplate,
    SchemaMismatch,
    UnknownResource,
    UnknownFeature,
    MissingColumn,
    ExternalToolFailure,
    PreconditionViolated,
    Io,
    Config,
}

impl SeqCrfErrorKind {
    pub fn with_error<E>(self, source: E) -> SeqCrfError
    where
        anyhow::Error: From<E>,
    {
        SeqCrfError {
            kind: self,
            source: From::from(source),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("SeqCrfError(kind={kind:?}, source={source})")]
pub struct SeqCrfError {
    pub kind: SeqCrfErrorKind,
    #[source]
    source: anyhow::Error,
}

impl SeqCrfError {
    pub fn add_context<C>(self, ctx: C) -> Self
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        SeqCrfError {
            kind: self.kind,
            source: self.source.context(ctx),
        }
    }

    pub fn kind(&self) -> SeqCrfErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for SeqCrfError {
    fn from(e: std::io::Error) -> Self {
        SeqCrfErrorKind::Io.with_error(e)
    }
}

pub type SeqCrfResult<T> = Result<T, SeqCrfError>;
