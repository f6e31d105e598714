//! EXI event model (EXI 4, Table 4-1).
//!
//! [`EventType`] ist die feingranulare Sicht des Codecs: Es unterscheidet
//! schema-genaue, Namespace-Wildcard- und generische Formen. Die Reihenfolge
//! der Varianten ist die Ordinalordnung, mit der Productions sortiert werden.
//! [`ExiEvent`] ist die Sicht der Anwendung.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::qname::QName;

/// Kind of one grammar event, in ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    StartDocument,
    AttributeXsiType,
    AttributeXsiNil,
    Attribute,
    AttributeNs,
    AttributeGeneric,
    AttributeInvalidValue,
    AttributeAnyInvalidValue,
    AttributeGenericUndeclared,
    StartElement,
    StartElementNs,
    StartElementGeneric,
    StartElementGenericUndeclared,
    EndElement,
    EndElementUndeclared,
    Characters,
    CharactersGeneric,
    CharactersGenericUndeclared,
    EndDocument,
    DocType,
    NamespaceDeclaration,
    SelfContained,
    EntityReference,
    Comment,
    ProcessingInstruction,
}

impl EventType {
    /// Kurzform aus EXI Table 4-1.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::StartDocument => "SD",
            Self::EndDocument => "ED",
            Self::AttributeXsiType => "AT(xsi:type)",
            Self::AttributeXsiNil => "AT(xsi:nil)",
            Self::Attribute => "AT(qname)",
            Self::AttributeNs => "AT(uri:*)",
            Self::AttributeGeneric => "AT(*)",
            Self::AttributeInvalidValue => "AT(qname)[invalid]",
            Self::AttributeAnyInvalidValue => "AT(*)[invalid]",
            Self::AttributeGenericUndeclared => "AT(*)[undeclared]",
            Self::StartElement => "SE(qname)",
            Self::StartElementNs => "SE(uri:*)",
            Self::StartElementGeneric => "SE(*)",
            Self::StartElementGenericUndeclared => "SE(*)[undeclared]",
            Self::EndElement => "EE",
            Self::EndElementUndeclared => "EE[undeclared]",
            Self::Characters => "CH",
            Self::CharactersGeneric => "CH(*)",
            Self::CharactersGenericUndeclared => "CH[undeclared]",
            Self::DocType => "DT",
            Self::NamespaceDeclaration => "NS",
            Self::SelfContained => "SC",
            Self::EntityReference => "ER",
            Self::Comment => "CM",
            Self::ProcessingInstruction => "PI",
        }
    }

    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            Self::AttributeXsiType
                | Self::AttributeXsiNil
                | Self::Attribute
                | Self::AttributeNs
                | Self::AttributeGeneric
                | Self::AttributeInvalidValue
                | Self::AttributeAnyInvalidValue
                | Self::AttributeGenericUndeclared
        )
    }

    pub fn is_start_element(self) -> bool {
        matches!(
            self,
            Self::StartElement
                | Self::StartElementNs
                | Self::StartElementGeneric
                | Self::StartElementGenericUndeclared
        )
    }

    pub fn is_end_element(self) -> bool {
        matches!(self, Self::EndElement | Self::EndElementUndeclared)
    }

    pub fn is_characters(self) -> bool {
        matches!(
            self,
            Self::Characters | Self::CharactersGeneric | Self::CharactersGenericUndeclared
        )
    }

    /// Ob der QName des Events (ganz oder teilweise) im Stream steht.
    pub fn carries_qname(self) -> bool {
        matches!(
            self,
            Self::AttributeNs
                | Self::AttributeGeneric
                | Self::AttributeInvalidValue
                | Self::AttributeAnyInvalidValue
                | Self::AttributeGenericUndeclared
                | Self::StartElementNs
                | Self::StartElementGeneric
                | Self::StartElementGenericUndeclared
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Orders two productions: same event type with names compares the names
/// (local-name, then URI), everything else by ordinal.
pub fn compare(a: EventType, a_name: Option<&QName>, b: EventType, b_name: Option<&QName>) -> Ordering {
    match a.cmp(&b) {
        Ordering::Equal => match (a_name, b_name) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
        other => other,
    }
}

// ============================================================================
// Event content
// ============================================================================

/// Namespace declaration. Empty `uri` rescinds the prefix binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsContent {
    pub uri: Arc<str>,
    /// Leer für den Default-Namespace.
    pub prefix: Arc<str>,
    /// Dieses NS Event liefert den Namespace des zugehörigen SE.
    pub local_element_ns: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtContent {
    pub qname: QName,
    /// Lexikalischer Wert.
    pub value: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChContent {
    pub value: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmContent {
    pub text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiContent {
    pub name: Arc<str>,
    pub text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DtContent {
    pub name: Arc<str>,
    pub public: Arc<str>,
    pub system: Arc<str>,
    /// Internes Subset.
    pub text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErContent {
    pub name: Arc<str>,
}

/// One occurrence of the XML information set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExiEvent {
    StartDocument,
    EndDocument,
    StartElement(QName),
    EndElement,
    Attribute(AtContent),
    Characters(ChContent),
    NamespaceDeclaration(NsContent),
    Comment(CmContent),
    ProcessingInstruction(PiContent),
    DocType(DtContent),
    EntityReference(ErContent),
}

impl ExiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartDocument => "SD",
            Self::EndDocument => "ED",
            Self::StartElement(_) => "SE",
            Self::EndElement => "EE",
            Self::Attribute(_) => "AT",
            Self::Characters(_) => "CH",
            Self::NamespaceDeclaration(_) => "NS",
            Self::Comment(_) => "CM",
            Self::ProcessingInstruction(_) => "PI",
            Self::DocType(_) => "DT",
            Self::EntityReference(_) => "ER",
        }
    }

    pub fn characters(value: impl Into<Arc<str>>) -> Self {
        Self::Characters(ChContent { value: value.into() })
    }

    pub fn attribute(qname: QName, value: impl Into<Arc<str>>) -> Self {
        Self::Attribute(AtContent { qname, value: value.into() })
    }
}

impl fmt::Display for ExiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartElement(q) => write!(f, "SE({q})"),
            Self::Attribute(at) => write!(f, "AT({})", at.qname),
            other => f.write_str(other.name()),
        }
    }
}

/// Sortiert Attribute in Stream-Reihenfolge: xsi:type, xsi:nil, dann nach
/// local-name und URI. Stabil.
pub fn sort_attributes(attributes: &mut [AtContent]) {
    attributes.sort_by(|a, b| attribute_sort_key(&a.qname).cmp(&attribute_sort_key(&b.qname)));
}

fn attribute_sort_key(qname: &QName) -> (u8, &str, &str) {
    if qname.is_xsi_type() {
        return (0, "", "");
    }
    if qname.is_xsi_nil() {
        return (1, "", "");
    }
    (2, &qname.local_name, &qname.uri)
}
