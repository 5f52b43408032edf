use std::{any::Any, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::input::ByteSource;

/// A thread-safe, mutually exclusive shared component.
pub type Shared<T> = Arc<Mutex<T>>;

/// The byte source shared between the probe, the read thread and shutdown.
pub type SharedByteSource = Shared<Box<dyn ByteSource>>;

/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Opaque correlation handle supplied with a sample request and echoed back
/// on the delivered sample.
#[derive(Clone)]
pub struct Token(Arc<dyn Any + Send + Sync>);

impl Token {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both tokens refer to the same caller allocation.
    pub fn same_as(&self, other: &Token) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:p})", Arc::as_ptr(&self.0))
    }
}

/// Time format of a start position. Only `Default` (the null format,
/// 100-nanosecond ticks) is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    #[default]
    Default,
    Custom(Uuid),
}

impl TimeFormat {
    pub fn is_default(&self) -> bool {
        match self {
            TimeFormat::Default => true,
            TimeFormat::Custom(id) => id.is_nil(),
        }
    }
}

/// Where a `start` should begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Continue from wherever the source currently is.
    #[default]
    Current,
    At(Duration),
}

impl StartPosition {
    pub fn is_set(&self) -> bool {
        matches!(self, StartPosition::At(_))
    }

    pub fn time(&self) -> Option<Duration> {
        match self {
            StartPosition::Current => None,
            StartPosition::At(t) => Some(*t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_custom_format_counts_as_default() {
        assert!(TimeFormat::Default.is_default());
        assert!(TimeFormat::Custom(Uuid::nil()).is_default());
        assert!(!TimeFormat::Custom(Uuid::new_v4()).is_default());
    }

    #[test]
    fn token_identity_survives_clone() {
        let token = Token::new(42u32);
        let copy = token.clone();
        assert!(token.same_as(&copy));
        assert!(!token.same_as(&Token::new(42u32)));
        assert_eq!(copy.downcast_ref::<u32>(), Some(&42));
        assert_eq!(copy.downcast_ref::<i64>(), None);
    }
}
