//! Central error type of the codec.
//!
//! Jede Variante gehört zu genau einer Fehlerklasse: kaputter Stream,
//! nicht auflösbarer Event Code, ungültiger Wert, Konfigurationsfehler
//! oder Transportfehler (IO, DEFLATE).

use core::fmt;
use std::borrow::Cow;

/// All errors raised while configuring, encoding or decoding an EXI body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// EXI version is not final version 1 (EXI 5.3).
    UnsupportedVersion,
    /// The distinguishing bits are not `10` (EXI 5.2).
    InvalidDistinguishingBits(u8),
    /// The header announces in-band options; options are supplied out of band.
    UnsupportedHeaderOptions,
    /// The byte source ended while the current decode step still needed bits.
    PrematureEndOfStream,
    /// A decoded event code has no production in the current grammar state.
    InvalidEventCode {
        /// Der gelesene Event Code (leer wenn nicht verfügbar).
        event_code: Cow<'static, str>,
        /// Grammar-Zustand in dem der Fehler auftrat.
        grammar_state: Cow<'static, str>,
    },
    /// The encoder found no production (level 1, 2 or 3) for an event.
    UnexpectedEvent {
        /// Event, das codiert werden sollte.
        event: Cow<'static, str>,
        /// Grammar-Zustand in dem kein Match existiert.
        grammar_state: Cow<'static, str>,
    },
    /// A pull-API call does not match the pending event, or the document is incomplete.
    OrderingViolation {
        expected: Cow<'static, str>,
        found: Cow<'static, str>,
    },
    /// A value failed datatype validation and no fallback production exists.
    InvalidValue(String),
    /// An integer does not fit the 64-bit range used by the codec (EXI 7.1.5, 7.1.6).
    IntegerOverflow,
    /// Float mantissa or exponent outside the representable range (EXI 7.1.4).
    FloatOutOfRange,
    /// Surrogate or code point above U+10FFFF (EXI 7.1.10).
    InvalidCodePoint(u64),
    /// Compact identifier unknown or evicted (EXI 7.3).
    InvalidCompactId(usize),
    /// Enumeration index outside the declared value list (EXI 7.2).
    InvalidEnumerationIndex { index: usize, enum_count: usize },
    /// Decoded list length above [`crate::list::MAX_LIST_LENGTH`].
    ListLengthOverflow(u64),
    /// QName value uses a prefix without in-scope namespace binding.
    UnresolvablePrefix(String),
    /// Inconsistent option set (EXI 5.4).
    InvalidOptionCombination,
    /// Block size must be greater than zero (EXI 9.1).
    InvalidBlockSize,
    /// Schema id or strict mode requested without a schema grammar.
    MissingSchema,
    /// The schema builder was handed an inconsistent declaration.
    SchemaError(String),
    /// Self-contained fragments are counted in event codes but not decoded.
    UnsupportedSelfContained,
    /// DEFLATE compression failed.
    CompressionError(String),
    /// DEFLATE decompression failed.
    DecompressionError(String),
    /// Underlying reader or writer failed.
    IoError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion => write!(f, "unsupported EXI version (EXI 5.3)"),
            Self::InvalidDistinguishingBits(bits) => {
                write!(f, "invalid distinguishing bits {bits:02b}, expected 10 (EXI 5.2)")
            }
            Self::UnsupportedHeaderOptions => {
                write!(f, "header carries in-band EXI options, supply options out of band")
            }
            Self::PrematureEndOfStream => write!(f, "premature end of EXI stream"),
            Self::InvalidEventCode { event_code, grammar_state } => {
                if grammar_state.is_empty() {
                    write!(f, "invalid event code '{event_code}'")
                } else {
                    write!(f, "invalid event code '{event_code}' in state '{grammar_state}'")
                }
            }
            Self::UnexpectedEvent { event, grammar_state } => {
                write!(f, "no production for event {event} in state '{grammar_state}'")
            }
            Self::OrderingViolation { expected, found } => {
                write!(f, "event ordering violation: expected '{expected}', found '{found}'")
            }
            Self::InvalidValue(msg) => write!(f, "invalid typed value: {msg}"),
            Self::IntegerOverflow => write!(f, "integer overflow (EXI 7.1.5, 7.1.6)"),
            Self::FloatOutOfRange => write!(f, "float value out of range (EXI 7.1.4)"),
            Self::InvalidCodePoint(cp) => write!(f, "invalid Unicode code point U+{cp:X} (EXI 7.1.10)"),
            Self::InvalidCompactId(id) => write!(f, "invalid or evicted compact identifier {id} (EXI 7.3)"),
            Self::InvalidEnumerationIndex { index, enum_count } => {
                write!(f, "enum index {index} exceeds valid range 0..{enum_count} (EXI 7.2)")
            }
            Self::ListLengthOverflow(len) => write!(f, "list length {len} exceeds max allowed size"),
            Self::UnresolvablePrefix(prefix) => write!(f, "unresolvable namespace prefix '{prefix}'"),
            Self::InvalidOptionCombination => write!(f, "invalid EXI option combination (EXI 5.4)"),
            Self::InvalidBlockSize => write!(f, "block size must be greater than zero (EXI 9.1)"),
            Self::MissingSchema => write!(f, "schema id or strict mode requires a schema grammar"),
            Self::SchemaError(msg) => write!(f, "schema error: {msg}"),
            Self::UnsupportedSelfContained => write!(f, "self-contained (SC) fragments are not supported"),
            Self::CompressionError(msg) => write!(f, "DEFLATE compression failed: {msg}"),
            Self::DecompressionError(msg) => write!(f, "DEFLATE decompression failed: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::PrematureEndOfStream
        } else {
            Self::IoError(err.to_string())
        }
    }
}

impl Error {
    /// Erstellt einen `InvalidEventCode` Fehler mit Kontext.
    pub fn invalid_event_code(
        event_code: impl Into<Cow<'static, str>>,
        grammar_state: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidEventCode {
            event_code: event_code.into(),
            grammar_state: grammar_state.into(),
        }
    }

    /// Erstellt einen `UnexpectedEvent` Fehler mit Kontext.
    pub fn unexpected_event(
        event: impl Into<Cow<'static, str>>,
        grammar_state: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UnexpectedEvent {
            event: event.into(),
            grammar_state: grammar_state.into(),
        }
    }

    /// Erstellt einen `OrderingViolation` Fehler mit Kontext.
    pub fn ordering_violation(
        expected: impl Into<Cow<'static, str>>,
        found: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::OrderingViolation {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
