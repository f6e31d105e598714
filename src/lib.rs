//! exi-codec – grammar-driven EXI 1.0 body codec (W3C Second Edition)
//!
//! Bit- und Byte-Kanäle, String Tables, lernende Built-in Grammars und
//! schema-informierte Grammars aus einem [`schema::SchemaBuilder`]. XML-Parser,
//! Serializer und XSD-Compiler liegen außerhalb dieser Crate: Ein- und Ausgabe
//! sind Sequenzen von [`ExiEvent`]s.
//!
//! # Beispiel
//!
//! ```
//! use exi_codec::{ExiEvent, ExiOptions, GrammarSource, QName};
//! use exi_codec::decoder::decode;
//! use exi_codec::encoder::encode;
//!
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::StartElement(QName::new("", "greeting")),
//!     ExiEvent::characters("Hello"),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let options = ExiOptions::default();
//! let bytes = encode(&events, &GrammarSource::BuiltIn, &options).unwrap();
//!
//! let decoded = decode(&bytes, &GrammarSource::BuiltIn, &options).unwrap();
//! assert_eq!(decoded, events);
//! ```

pub mod binary;
pub mod bit_width;
pub mod bitstream;
pub mod bytestream;
pub mod channel;
pub mod compression;
pub mod context;
pub mod datatype;
pub mod datetime;
pub mod decimal;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod event;
pub mod event_code;
pub mod float;
pub mod grammar;
pub mod header;
pub mod integer;
pub mod list;
pub mod options;
pub mod qname;
pub mod schema;
pub mod string;
pub mod string_table;
pub mod undeclared;
pub mod unsigned_integer;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, nur für interne Tabellen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::{
    AtContent, ChContent, CmContent, DtContent, ErContent, EventType, ExiEvent, NsContent,
    PiContent,
};

// Public API: Options und Header
pub use header::ExiHeader;
pub use options::{Alignment, ExiOptions, Preserve, SchemaId};

// Public API: Encoder/Decoder
pub use decoder::Decoder;
pub use encoder::Encoder;

// Public API: Types
pub use datatype::{Datatype, TypedValue};
pub use qname::QName;
pub use schema::{GrammarSource, SchemaBuilder, SchemaGrammars};
