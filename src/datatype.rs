//! Datatypes and typed value dispatch (EXI 7.1, 7.2).
//!
//! [`Datatype`] ist eine geschlossene Menge von Darstellungen. Jede kennt ihre
//! lexikalische Form ([`Datatype::parse`], [`Datatype::format`]) und ihren
//! Codec ([`encode_typed`], [`decode_typed`]). Strings laufen über die
//! Value-Partitionen, QNames über die Namenstabellen, alles andere direkt
//! über den Kanal.

use std::fmt;
use std::sync::Arc;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::datetime::{DateTime, DateTimeKind};
use crate::decimal::Decimal;
use crate::float::Float;
use crate::qname::{NameTables, QName, QNameId};
use crate::string_table::ValueTable;
use crate::{Error, Result, binary, bit_width, integer, list, string};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryEncoding {
    Base64,
    Hex,
}

/// Closed set of value representations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    String,
    Boolean,
    Integer,
    UnsignedInteger,
    /// Bereich ≤ 4096 Werte: n-bit Offset; sonst Unsigned (lower ≥ 0) oder Integer.
    BoundedInteger { lower: i64, upper: i64 },
    Float,
    Decimal,
    DateTime(DateTimeKind),
    Binary(BinaryEncoding),
    /// Werte in Schema-Reihenfolge; codiert wird der Index.
    Enumeration(Arc<[Arc<str>]>),
    List(Arc<Datatype>),
    QName,
}

impl Datatype {
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::UnsignedInteger => "unsignedInteger",
            Self::BoundedInteger { .. } => "boundedInteger",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::DateTime(kind) => kind.name(),
            Self::Binary(BinaryEncoding::Base64) => "base64Binary",
            Self::Binary(BinaryEncoding::Hex) => "hexBinary",
            Self::Enumeration(_) => "enumeration",
            Self::List(_) => "list",
            Self::QName => "QName",
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self::Enumeration(values.into_iter().map(Into::into).collect())
    }

    pub fn list(item: Datatype) -> Self {
        Self::List(Arc::new(item))
    }

    /// Ob der Typ als Item-Typ einer Liste taugt.
    pub fn is_valid_list_item(&self) -> bool {
        !matches!(self, Self::List(_) | Self::QName)
    }

    /// Parses a lexical value. Failure means the value is invalid for the type.
    pub fn parse<R>(&self, lexical: &str, namespaces: &R) -> Result<TypedValue>
    where
        R: NamespaceResolver + ?Sized,
    {
        let invalid = || Error::InvalidValue(format!("'{lexical}' is not a valid {}", self.name()));
        Ok(match self {
            Self::String => TypedValue::String(Arc::from(lexical)),
            Self::Boolean => TypedValue::Boolean(match lexical.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid()),
            }),
            Self::Integer => TypedValue::Integer(parse_integer(lexical).ok_or_else(invalid)?),
            Self::UnsignedInteger => {
                let s = lexical.trim();
                let s = s.strip_prefix('+').unwrap_or(s);
                TypedValue::UnsignedInteger(s.parse::<u64>().map_err(|_| invalid())?)
            }
            Self::BoundedInteger { lower, upper } => {
                let v = parse_integer(lexical).ok_or_else(invalid)?;
                if v < *lower || v > *upper {
                    return Err(invalid());
                }
                TypedValue::Integer(v)
            }
            Self::Float => TypedValue::Float(Float::parse(lexical)?),
            Self::Decimal => TypedValue::Decimal(Decimal::parse(lexical)?),
            Self::DateTime(kind) => TypedValue::DateTime(DateTime::parse(*kind, lexical)?),
            Self::Binary(BinaryEncoding::Base64) => TypedValue::Binary(binary::parse_base64(lexical)?),
            Self::Binary(BinaryEncoding::Hex) => TypedValue::Binary(binary::parse_hex(lexical)?),
            Self::Enumeration(values) => {
                let s = lexical.trim();
                let index = values.iter().position(|v| &**v == s).ok_or_else(invalid)?;
                TypedValue::Enumeration(index)
            }
            Self::List(item) => {
                if !item.is_valid_list_item() {
                    return Err(invalid());
                }
                let items = list::split_lexical(lexical)
                    .map(|token| item.parse(token, namespaces))
                    .collect::<Result<Vec<_>>>()?;
                TypedValue::List(items)
            }
            Self::QName => TypedValue::QName(parse_qname(lexical, namespaces)?),
        })
    }

    /// Canonical lexical form of a decoded value.
    pub fn format(&self, value: &TypedValue) -> Result<String> {
        let mismatch = || Error::InvalidValue(format!("{value:?} is not a {} value", self.name()));
        Ok(match (self, value) {
            (Self::String, TypedValue::String(s)) => s.to_string(),
            (Self::Boolean, TypedValue::Boolean(b)) => b.to_string(),
            (Self::Integer | Self::BoundedInteger { .. }, TypedValue::Integer(v)) => v.to_string(),
            (Self::UnsignedInteger, TypedValue::UnsignedInteger(v)) => v.to_string(),
            (Self::Float, TypedValue::Float(f)) => f.to_string(),
            (Self::Decimal, TypedValue::Decimal(d)) => d.to_string(),
            (Self::DateTime(_), TypedValue::DateTime(dt)) => dt.to_string(),
            (Self::Binary(BinaryEncoding::Base64), TypedValue::Binary(b)) => binary::format_base64(b),
            (Self::Binary(BinaryEncoding::Hex), TypedValue::Binary(b)) => binary::format_hex(b),
            (Self::Enumeration(values), TypedValue::Enumeration(i)) => values
                .get(*i)
                .map(|v| v.to_string())
                .ok_or(Error::InvalidEnumerationIndex { index: *i, enum_count: values.len() })?,
            (Self::List(item), TypedValue::List(items)) => {
                let parts = items.iter().map(|v| item.format(v)).collect::<Result<Vec<_>>>()?;
                parts.join(" ")
            }
            (Self::QName, TypedValue::QName(q)) => q.to_string(),
            _ => return Err(mismatch()),
        })
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(item) => write!(f, "list({item})"),
            Self::BoundedInteger { lower, upper } => write!(f, "integer[{lower}, {upper}]"),
            other => f.write_str(other.name()),
        }
    }
}

/// A value in the representation of its datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(Arc<str>),
    Boolean(bool),
    Integer(i64),
    UnsignedInteger(u64),
    Float(Float),
    Decimal(Decimal),
    DateTime(DateTime),
    Binary(Vec<u8>),
    Enumeration(usize),
    List(Vec<TypedValue>),
    QName(QName),
}

fn parse_integer(lexical: &str) -> Option<i64> {
    let s = lexical.trim();
    s.strip_prefix('+').unwrap_or(s).parse::<i64>().ok()
}

/// In-scope namespace bindings, used to resolve QName values.
pub trait NamespaceResolver {
    fn resolve_prefix(&self, prefix: &str) -> Option<Arc<str>>;
}

impl NamespaceResolver for [(&str, &str)] {
    fn resolve_prefix(&self, prefix: &str) -> Option<Arc<str>> {
        self.iter().rev().find(|(p, _)| *p == prefix).map(|(_, uri)| Arc::from(*uri))
    }
}

/// `prefix:local`, `local` (Default-Namespace) oder Clark-Notation `{uri}local`.
fn parse_qname<R: NamespaceResolver + ?Sized>(lexical: &str, namespaces: &R) -> Result<QName> {
    let s = lexical.trim();
    if s.starts_with('{') {
        return QName::from_clark(s)
            .ok_or_else(|| Error::InvalidValue(format!("malformed QName '{s}'")));
    }
    let (prefix, local) = s.split_once(':').unwrap_or(("", s));
    if local.is_empty() || local.contains(':') || local.contains(char::is_whitespace) {
        return Err(Error::InvalidValue(format!("malformed QName '{s}'")));
    }
    let uri = match namespaces.resolve_prefix(prefix) {
        Some(uri) => uri,
        None if prefix.is_empty() => Arc::from(""),
        None => return Err(Error::UnresolvablePrefix(prefix.to_string())),
    };
    Ok(QName::with_prefix(uri, local, prefix))
}

// ============================================================================
// Codec
// ============================================================================

/// Tables a typed value codec may consult.
pub struct ValueCoder<'a> {
    pub names: &'a mut NameTables,
    pub values: &'a mut ValueTable,
    /// Kontext der lokalen Value-Partition (Element bei CH, Attribut bei AT).
    pub context: QNameId,
    pub preserve_prefixes: bool,
}

pub fn encode_typed<C: EncoderChannel + ?Sized>(
    ch: &mut C,
    datatype: &Datatype,
    value: &TypedValue,
    coder: &mut ValueCoder<'_>,
) -> Result<()> {
    match (datatype, value) {
        (Datatype::String, TypedValue::String(s)) => {
            coder.values.encode(ch, coder.context, s)?;
        }
        (Datatype::QName, TypedValue::QName(q)) => {
            let id = coder.names.encode_qname(ch, q)?;
            if coder.preserve_prefixes {
                let uri_id = coder.names.context(id)?.uri_id;
                coder.names.encode_prefix(ch, uri_id, q.prefix.as_deref())?;
            }
        }
        (Datatype::List(item), TypedValue::List(items)) => {
            list::encode(ch, items, |ch, v| encode_simple(ch, item, v))?;
        }
        _ => encode_simple(ch, datatype, value)?,
    }
    Ok(())
}

/// Typen ohne Tabellenzugriff; String-Items einer Liste gehen direkt in den Kanal.
fn encode_simple<C: EncoderChannel + ?Sized>(
    ch: &mut C,
    datatype: &Datatype,
    value: &TypedValue,
) -> Result<()> {
    match (datatype, value) {
        (Datatype::String, TypedValue::String(s)) => string::encode(ch, s),
        (Datatype::Boolean, TypedValue::Boolean(b)) => ch.encode_boolean(*b),
        (Datatype::Integer, TypedValue::Integer(v)) => ch.encode_integer(*v),
        (Datatype::UnsignedInteger, TypedValue::UnsignedInteger(v)) => ch.encode_unsigned_integer(*v),
        (Datatype::BoundedInteger { lower, upper }, TypedValue::Integer(v)) => {
            if integer::is_n_bit_range(*lower, *upper) {
                integer::encode_bounded(ch, *v, *lower, *upper)
            } else if *lower >= 0 {
                let v = u64::try_from(*v).map_err(|_| Error::IntegerOverflow)?;
                ch.encode_unsigned_integer(v)
            } else {
                ch.encode_integer(*v)
            }
        }
        (Datatype::Float, TypedValue::Float(f)) => ch.encode_float(*f),
        (Datatype::Decimal, TypedValue::Decimal(d)) => ch.encode_decimal(d),
        (Datatype::DateTime(_), TypedValue::DateTime(dt)) => ch.encode_date_time(dt),
        (Datatype::Binary(_), TypedValue::Binary(b)) => ch.encode_binary(b),
        (Datatype::Enumeration(values), TypedValue::Enumeration(index)) => {
            if *index >= values.len() {
                return Err(Error::InvalidEnumerationIndex { index: *index, enum_count: values.len() });
            }
            ch.encode_n_bit_unsigned_integer(*index as u64, bit_width::for_count(values.len()))
        }
        _ => Err(Error::InvalidValue(format!(
            "{value:?} cannot be encoded as {datatype}"
        ))),
    }
}

pub fn decode_typed<C: DecoderChannel + ?Sized>(
    ch: &mut C,
    datatype: &Datatype,
    coder: &mut ValueCoder<'_>,
) -> Result<TypedValue> {
    match datatype {
        Datatype::String => Ok(TypedValue::String(coder.values.decode(ch, coder.context)?)),
        Datatype::QName => {
            let id = coder.names.decode_qname(ch)?;
            let ctx = coder.names.context(id)?;
            let (uri_id, qname) = (ctx.uri_id, ctx.qname.clone());
            let prefix = if coder.preserve_prefixes {
                coder.names.decode_prefix(ch, uri_id)?
            } else {
                None
            };
            Ok(TypedValue::QName(qname.with_prefix_of(prefix)))
        }
        Datatype::List(item) => Ok(TypedValue::List(list::decode(ch, |ch| decode_simple(ch, item))?)),
        _ => decode_simple(ch, datatype),
    }
}

fn decode_simple<C: DecoderChannel + ?Sized>(ch: &mut C, datatype: &Datatype) -> Result<TypedValue> {
    Ok(match datatype {
        Datatype::String => TypedValue::String(Arc::from(string::decode(ch)?)),
        Datatype::Boolean => TypedValue::Boolean(ch.decode_boolean()?),
        Datatype::Integer => TypedValue::Integer(ch.decode_integer()?),
        Datatype::UnsignedInteger => TypedValue::UnsignedInteger(ch.decode_unsigned_integer()?),
        Datatype::BoundedInteger { lower, upper } => {
            let v = if integer::is_n_bit_range(*lower, *upper) {
                integer::decode_bounded(ch, *lower, *upper)?
            } else if *lower >= 0 {
                i64::try_from(ch.decode_unsigned_integer()?).map_err(|_| Error::IntegerOverflow)?
            } else {
                ch.decode_integer()?
            };
            TypedValue::Integer(v)
        }
        Datatype::Float => TypedValue::Float(ch.decode_float()?),
        Datatype::Decimal => TypedValue::Decimal(ch.decode_decimal()?),
        Datatype::DateTime(kind) => TypedValue::DateTime(ch.decode_date_time(*kind)?),
        Datatype::Binary(_) => TypedValue::Binary(ch.decode_binary()?),
        Datatype::Enumeration(values) => {
            let n = bit_width::for_count(values.len());
            let index = ch.decode_n_bit_unsigned_integer(n)? as usize;
            if index >= values.len() {
                return Err(Error::InvalidEnumerationIndex { index, enum_count: values.len() });
            }
            TypedValue::Enumeration(index)
        }
        Datatype::List(_) | Datatype::QName => {
            return Err(Error::InvalidValue(format!("{datatype} is not a valid list item type")));
        }
    })
}
