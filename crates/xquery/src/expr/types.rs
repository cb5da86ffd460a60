use crate::consts::XS_NS;
use crate::qname::ExpandedName;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    Descendant,
    Parent,
    Ancestor,
    AncestorOrSelf,
    PrecedingSibling,
    FollowingSibling,
    Preceding,
    Following,
    Namespace,
    /// `//@name`: attributes of the context node and all its descendants.
    DescendantAttribute,
    /// Bare step whose axis is fixed up once its path separator is known.
    Unknown,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "attribute" | "@" => Axis::Attribute,
            "self" => Axis::SelfAxis,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "descendant" => Axis::Descendant,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following-sibling" => Axis::FollowingSibling,
            "preceding" => Axis::Preceding,
            "following" => Axis::Following,
            "namespace" => Axis::Namespace,
            _ => return None,
        })
    }

    /// Principal node kind is attribute.
    pub fn is_attribute(self) -> bool {
        matches!(self, Axis::Attribute | Axis::DescendantAttribute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NameOrWildcard {
    Name(ExpandedName),
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeTest {
    // name tests
    AnyKind,
    Name(ExpandedName),
    WildcardAny,
    NsWildcard(String),
    LocalWildcard(String),

    // kind tests
    KindText,
    KindComment,
    KindNamespaceNode,
    KindProcessingInstruction(Option<String>),
    KindDocument(Option<Box<NodeTest>>),
    KindElement { name: Option<NameOrWildcard>, ty: Option<ExpandedName>, nillable: bool },
    KindAttribute { name: Option<NameOrWildcard>, ty: Option<ExpandedName> },
    KindSchemaElement(ExpandedName),
    KindSchemaAttribute(ExpandedName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn from_indicator(indicator: Option<&str>) -> Occurrence {
        match indicator {
            Some("?") => Occurrence::ZeroOrOne,
            Some("*") => Occurrence::ZeroOrMore,
            Some("+") => Occurrence::OneOrMore,
            _ => Occurrence::One,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ItemType {
    AnyItem,
    Atomic(ExpandedName),
    Kind(NodeTest),
    AnyFunction,
    Function { params: Vec<SequenceType>, returns: Box<SequenceType> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SequenceType {
    EmptySequence,
    Typed { item: ItemType, occ: Occurrence },
}

/// Coarse classification of a sequence type's item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeCode {
    Empty,
    Item,
    Atomic,
    Node,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Document,
    Namespace,
    Function,
}

impl SequenceType {
    pub fn primary(&self) -> TypeCode {
        let SequenceType::Typed { item, .. } = self else {
            return TypeCode::Empty;
        };
        match item {
            ItemType::AnyItem => TypeCode::Item,
            ItemType::Atomic(_) => TypeCode::Atomic,
            ItemType::AnyFunction | ItemType::Function { .. } => TypeCode::Function,
            ItemType::Kind(test) => match test {
                NodeTest::KindText => TypeCode::Text,
                NodeTest::KindComment => TypeCode::Comment,
                NodeTest::KindNamespaceNode => TypeCode::Namespace,
                NodeTest::KindProcessingInstruction(_) => TypeCode::ProcessingInstruction,
                NodeTest::KindDocument(_) => TypeCode::Document,
                NodeTest::KindElement { .. } | NodeTest::KindSchemaElement(_) => TypeCode::Element,
                NodeTest::KindAttribute { .. } | NodeTest::KindSchemaAttribute(_) => TypeCode::Attribute,
                _ => TypeCode::Node,
            },
        }
    }

    pub fn occurrence(&self) -> Option<Occurrence> {
        match self {
            SequenceType::EmptySequence => None,
            SequenceType::Typed { occ, .. } => Some(*occ),
        }
    }
}

/// Target of `cast as` / `castable as`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleType {
    pub atomic: ExpandedName,
    /// `?` after the type name: the empty sequence is accepted.
    pub optional: bool,
}

const XS_ATOMIC_TYPES: &[&str] = &[
    "anyAtomicType",
    "untypedAtomic",
    "string",
    "normalizedString",
    "token",
    "language",
    "NMTOKEN",
    "Name",
    "NCName",
    "ID",
    "IDREF",
    "ENTITY",
    "boolean",
    "decimal",
    "integer",
    "nonPositiveInteger",
    "negativeInteger",
    "long",
    "int",
    "short",
    "byte",
    "nonNegativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
    "positiveInteger",
    "double",
    "float",
    "duration",
    "yearMonthDuration",
    "dayTimeDuration",
    "dateTime",
    "dateTimeStamp",
    "date",
    "time",
    "gYearMonth",
    "gYear",
    "gMonthDay",
    "gDay",
    "gMonth",
    "hexBinary",
    "base64Binary",
    "anyURI",
    "QName",
    "NOTATION",
];

/// Whether `name` is a built-in atomic type.
pub fn is_known_atomic_type(name: &ExpandedName) -> bool {
    name.ns_uri.as_deref() == Some(XS_NS) && XS_ATOMIC_TYPES.contains(&name.local.as_str())
}

/// Abstract atomic types that cannot be cast targets.
pub fn is_abstract_cast_target(name: &ExpandedName) -> bool {
    name.ns_uri.as_deref() == Some(XS_NS) && matches!(name.local.as_str(), "NOTATION" | "anyAtomicType")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_type_of_kind_tests() {
        let ty = SequenceType::Typed {
            item: ItemType::Kind(NodeTest::KindElement { name: None, ty: None, nillable: false }),
            occ: Occurrence::ZeroOrMore,
        };
        assert_eq!(ty.primary(), TypeCode::Element);
        assert_eq!(ty.occurrence(), Some(Occurrence::ZeroOrMore));
        assert_eq!(SequenceType::EmptySequence.primary(), TypeCode::Empty);
    }

    #[test]
    fn atomic_type_table() {
        assert!(is_known_atomic_type(&ExpandedName::in_ns(XS_NS, "integer")));
        assert!(!is_known_atomic_type(&ExpandedName::in_ns(XS_NS, "bogus")));
        assert!(!is_known_atomic_type(&ExpandedName::new(None, "integer")));
        assert!(is_abstract_cast_target(&ExpandedName::in_ns(XS_NS, "NOTATION")));
    }
}
