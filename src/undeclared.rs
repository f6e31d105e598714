//! Level-2 und Level-3 Productions (EXI 8.4.3, 8.5.4.4).
//!
//! Die generischen Productions werden nie gespeichert. Sie ergeben sich
//! deterministisch aus Art und Flags eines Zustands plus den Fidelity
//! Options. Encoder und Decoder rufen dieselbe Funktion auf, damit die
//! Slot-Positionen auf beiden Seiten identisch sind.
//!
//! Reihenfolge auf Level 2 (jeweils nur wenn vorhanden):
//!
//! ```text
//! EE, AT(xsi:type), AT(xsi:nil), AT(*), AT(*)[untyped], NS, SC,
//! SE(*), CH[untyped], ER
//! ```
//!
//! Level 3: CM, PI. In DocContent steht DT auf Level 2 vor CM/PI.

use crate::event::EventType;
use crate::grammar::{Grammar, GrammarFlavor, GrammarId};
use crate::options::ExiOptions;

/// A generic production that lives only on level 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Undeclared {
    EndElement,
    XsiType,
    XsiNil,
    AttributeGeneric,
    /// AT(qname) mit ungültigem Wert, als untypisierter String.
    AttributeInvalidValue,
    NamespaceDeclaration,
    SelfContained,
    StartElementGeneric,
    CharactersGeneric,
    EntityReference,
    DocType,
    Comment,
    ProcessingInstruction,
}

impl Undeclared {
    pub fn event_type(self) -> EventType {
        match self {
            Self::EndElement => EventType::EndElementUndeclared,
            Self::XsiType => EventType::AttributeXsiType,
            Self::XsiNil => EventType::AttributeXsiNil,
            Self::AttributeGeneric => EventType::AttributeGenericUndeclared,
            Self::AttributeInvalidValue => EventType::AttributeInvalidValue,
            Self::NamespaceDeclaration => EventType::NamespaceDeclaration,
            Self::SelfContained => EventType::SelfContained,
            Self::StartElementGeneric => EventType::StartElementGenericUndeclared,
            Self::CharactersGeneric => EventType::CharactersGenericUndeclared,
            Self::EntityReference => EventType::EntityReference,
            Self::DocType => EventType::DocType,
            Self::Comment => EventType::Comment,
            Self::ProcessingInstruction => EventType::ProcessingInstruction,
        }
    }
}

const MAX_SLOTS: usize = 12;

/// Ordered slots of one level, without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slots {
    items: [Undeclared; MAX_SLOTS],
    len: usize,
}

impl Slots {
    fn new() -> Self {
        Self { items: [Undeclared::EndElement; MAX_SLOTS], len: 0 }
    }

    fn push_if(&mut self, cond: bool, slot: Undeclared) {
        if cond {
            debug_assert!(self.len < MAX_SLOTS);
            self.items[self.len] = slot;
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<Undeclared> {
        self.as_slice().get(index).copied()
    }

    pub fn position(&self, slot: Undeclared) -> Option<usize> {
        self.as_slice().iter().position(|s| *s == slot)
    }

    pub fn as_slice(&self) -> &[Undeclared] {
        &self.items[..self.len]
    }
}

/// Level-2 Slots eines Zustands.
pub fn second_level(grammar: &Grammar, options: &ExiOptions) -> Slots {
    use GrammarFlavor as F;
    use Undeclared as U;

    let preserve = options.preserve();
    let mut slots = Slots::new();
    match grammar.flavor {
        F::Document | F::Fragment => {}
        F::DocContent => slots.push_if(preserve.dtd, U::DocType),
        // CM/PI liegen hier schon auf Level 2
        F::DocEnd | F::FragmentContent => {
            slots.push_if(preserve.comments, U::Comment);
            slots.push_if(preserve.pis, U::ProcessingInstruction);
        }
        F::StartTag if grammar.built_in => {
            slots.push_if(true, U::EndElement);
            slots.push_if(true, U::AttributeGeneric);
            slots.push_if(preserve.prefixes, U::NamespaceDeclaration);
            slots.push_if(options.self_contained(), U::SelfContained);
            slots.push_if(true, U::StartElementGeneric);
            slots.push_if(true, U::CharactersGeneric);
            slots.push_if(preserve.dtd, U::EntityReference);
        }
        F::ElementContent if grammar.built_in => {
            slots.push_if(true, U::StartElementGeneric);
            slots.push_if(true, U::CharactersGeneric);
            slots.push_if(preserve.dtd, U::EntityReference);
        }
        F::StartTag | F::AttributeContent | F::ElementContent if options.strict() => {
            let first = grammar.first_start_tag;
            slots.push_if(first && grammar.type_castable, U::XsiType);
            slots.push_if(first && grammar.nillable, U::XsiNil);
        }
        F::StartTag | F::AttributeContent | F::ElementContent => {
            let first = grammar.first_start_tag;
            let attributes = grammar.flavor.is_start_tag();
            slots.push_if(!grammar.has_end_element, U::EndElement);
            slots.push_if(first, U::XsiType);
            slots.push_if(first, U::XsiNil);
            slots.push_if(attributes, U::AttributeGeneric);
            slots.push_if(attributes, U::AttributeInvalidValue);
            slots.push_if(first && preserve.prefixes, U::NamespaceDeclaration);
            slots.push_if(first && options.self_contained(), U::SelfContained);
            slots.push_if(true, U::StartElementGeneric);
            slots.push_if(true, U::CharactersGeneric);
            slots.push_if(preserve.dtd, U::EntityReference);
        }
    }
    slots
}

/// Level-3 Slots eines Zustands.
pub fn third_level(grammar: &Grammar, options: &ExiOptions) -> Slots {
    use GrammarFlavor as F;

    let preserve = options.preserve();
    let mut slots = Slots::new();
    let element = matches!(grammar.flavor, F::StartTag | F::AttributeContent | F::ElementContent);
    let allowed = match grammar.flavor {
        F::DocContent => true,
        _ if element => grammar.built_in || !options.strict(),
        _ => false,
    };
    if allowed {
        slots.push_if(preserve.comments, Undeclared::Comment);
        slots.push_if(preserve.pis, Undeclared::ProcessingInstruction);
    }
    slots
}

/// Folgezustand nach einer generischen Production. `None` nach EE.
///
/// xsi:type und xsi:nil bleiben hier im selben Zustand; den Wechsel zum
/// abgeleiteten bzw. leeren Zustand macht der Aufrufer, weil er vom Wert
/// abhängt.
pub fn next_state(id: GrammarId, grammar: &Grammar, slot: Undeclared) -> Option<GrammarId> {
    use Undeclared as U;
    match slot {
        U::EndElement => None,
        U::XsiType
        | U::XsiNil
        | U::AttributeGeneric
        | U::AttributeInvalidValue
        | U::NamespaceDeclaration
        | U::SelfContained
        | U::DocType => Some(id),
        U::StartElementGeneric | U::CharactersGeneric | U::EntityReference => {
            if grammar.flavor.is_start_tag() {
                grammar.content.or(Some(id))
            } else {
                Some(id)
            }
        }
        U::Comment | U::ProcessingInstruction => {
            if grammar.built_in && grammar.flavor == GrammarFlavor::StartTag {
                grammar.content.or(Some(id))
            } else {
                Some(id)
            }
        }
    }
}
