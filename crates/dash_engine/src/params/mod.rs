//! # Persistent Parameters
//!
//! String-valued key/value store shared with other processes, plus typed
//! helpers. A value that fails to parse leaves the caller's in-memory value
//! untouched.

pub mod store;

pub use store::{FileParamStore, MemoryParamStore};

/// Parameter store errors
#[derive(thiserror::Error, Debug)]
pub enum ParamError {
    /// No value stored under this name
    #[error("parameter {0} not set")]
    NotFound(String),
    /// Storage failure
    #[error("parameter store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored value is malformed
    #[error("parameter {name} holds malformed value {value:?}")]
    Parse {
        /// Parameter name
        name: String,
        /// Raw stored value
        value: String,
    },
}

/// Persistent key/value storage
pub trait ParamStore {
    /// Raw value of `name`
    fn read(&self, name: &str) -> Result<String, ParamError>;

    /// Replace the value of `name`
    fn write(&mut self, name: &str, value: &str) -> Result<(), ParamError>;
}

/// A value with a textual parameter encoding
pub trait ParamValue: Sized {
    /// Parse a stored value
    fn parse_param(raw: &str) -> Option<Self>;

    /// Encode for storage
    fn format_param(&self) -> String;
}

impl ParamValue for bool {
    fn parse_param(raw: &str) -> Option<Self> {
        match raw {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        }
    }

    fn format_param(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }
}

impl ParamValue for f32 {
    fn parse_param(raw: &str) -> Option<Self> {
        raw.parse::<f32>().ok().filter(|v| v.is_finite())
    }

    fn format_param(&self) -> String {
        self.to_string()
    }
}

impl ParamValue for u64 {
    fn parse_param(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn format_param(&self) -> String {
        self.to_string()
    }
}

impl ParamValue for String {
    fn parse_param(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn format_param(&self) -> String {
        self.clone()
    }
}

/// Read `name` into `value`.
///
/// Surrounding whitespace is ignored. On any error `value` keeps what it had.
pub fn read_param<T: ParamValue>(store: &dyn ParamStore, name: &str, value: &mut T) -> Result<(), ParamError> {
    let raw = store.read(name)?;
    match T::parse_param(raw.trim()) {
        Some(parsed) => {
            *value = parsed;
            Ok(())
        }
        None => Err(ParamError::Parse { name: name.to_string(), value: raw }),
    }
}

/// Store `value` under `name`
pub fn write_param<T: ParamValue>(store: &mut dyn ParamStore, name: &str, value: &T) -> Result<(), ParamError> {
    store.write(name, &value.format_param())
}
