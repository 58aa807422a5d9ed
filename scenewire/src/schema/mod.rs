use std::{fmt::Display, rc::Rc};

use indexmap::IndexMap;
use int_enum::IntEnum;

mod builtin;
pub use builtin::*;

use crate::values::FieldValue;

/// Access semantics of a field declaration. Event-only kinds never carry an
/// inline value in document content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    Field,
    ExposedField,
    EventIn,
    EventOut,
}

impl FieldAccess {
    pub fn parse(name: &str) -> Option<FieldAccess> {
        Some(match name {
            "field" => Self::Field,
            "exposedField" => Self::ExposedField,
            "eventIn" => Self::EventIn,
            "eventOut" => Self::EventOut,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::ExposedField => "exposedField",
            Self::EventIn => "eventIn",
            Self::EventOut => "eventOut",
        }
    }

    /// Wire code used by the proto declaration tables.
    pub fn code(&self) -> u8 {
        match self {
            Self::Field => 0,
            Self::ExposedField => 1,
            Self::EventIn => 2,
            Self::EventOut => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<FieldAccess> {
        Some(match code {
            0 => Self::Field,
            1 => Self::ExposedField,
            2 => Self::EventIn,
            3 => Self::EventOut,
            _ => return None,
        })
    }
}

impl Display for FieldAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The closed enumeration of field types. The numbering is part of the
/// versioned wire vocabulary and must never be reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntEnum)]
pub enum FieldType {
    SFInt32 = 1,
    MFInt32 = 2,
    SFFloat = 3,
    MFFloat = 4,
    SFDouble = 5,
    MFDouble = 6,
    SFTime = 7,
    MFTime = 8,
    SFNode = 9,
    MFNode = 10,
    SFVec2f = 11,
    MFVec2f = 12,
    SFVec3f = 13,
    MFVec3f = 14,
    SFVec3d = 15,
    MFVec3d = 16,
    SFImage = 17,
    MFImage = 18,
    SFLong = 19,
    MFLong = 20,
    SFBool = 21,
    MFBool = 22,
    SFString = 23,
    MFString = 24,
    SFRotation = 25,
    MFRotation = 26,
    SFColor = 27,
    MFColor = 28,
    SFColorRGBA = 29,
    MFColorRGBA = 30,
    SFVec2d = 31,
    MFVec2d = 32,
    SFVec4f = 33,
    MFVec4f = 34,
    SFVec4d = 35,
    MFVec4d = 36,
    SFMatrix3f = 37,
    MFMatrix3f = 38,
    SFMatrix4f = 39,
    MFMatrix4f = 40,
}

/// The storage class a typed value is held in. Compressors dispatch on
/// storage, with [`FieldType::span`] supplying the vector grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Bool,
    BoolArray,
    Int,
    IntArray,
    Long,
    LongArray,
    Float,
    FloatArray,
    Double,
    DoubleArray,
    Str,
    StrArray,
    Node,
    NodeArray,
}

impl FieldType {
    /// Highest assigned tag value.
    pub const MAX_TAG: u8 = 40;

    pub fn parse(name: &str) -> Option<FieldType> {
        Some(match name {
            "SFInt32" => Self::SFInt32,
            "MFInt32" => Self::MFInt32,
            "SFFloat" => Self::SFFloat,
            "MFFloat" => Self::MFFloat,
            "SFDouble" => Self::SFDouble,
            "MFDouble" => Self::MFDouble,
            "SFTime" => Self::SFTime,
            "MFTime" => Self::MFTime,
            "SFNode" => Self::SFNode,
            "MFNode" => Self::MFNode,
            "SFVec2f" => Self::SFVec2f,
            "MFVec2f" => Self::MFVec2f,
            "SFVec3f" => Self::SFVec3f,
            "MFVec3f" => Self::MFVec3f,
            "SFVec3d" => Self::SFVec3d,
            "MFVec3d" => Self::MFVec3d,
            "SFImage" => Self::SFImage,
            "MFImage" => Self::MFImage,
            "SFLong" => Self::SFLong,
            "MFLong" => Self::MFLong,
            "SFBool" => Self::SFBool,
            "MFBool" => Self::MFBool,
            "SFString" => Self::SFString,
            "MFString" => Self::MFString,
            "SFRotation" => Self::SFRotation,
            "MFRotation" => Self::MFRotation,
            "SFColor" => Self::SFColor,
            "MFColor" => Self::MFColor,
            "SFColorRGBA" => Self::SFColorRGBA,
            "MFColorRGBA" => Self::MFColorRGBA,
            "SFVec2d" => Self::SFVec2d,
            "MFVec2d" => Self::MFVec2d,
            "SFVec4f" => Self::SFVec4f,
            "MFVec4f" => Self::MFVec4f,
            "SFVec4d" => Self::SFVec4d,
            "MFVec4d" => Self::MFVec4d,
            "SFMatrix3f" => Self::SFMatrix3f,
            "MFMatrix3f" => Self::MFMatrix3f,
            "SFMatrix4f" => Self::SFMatrix4f,
            "MFMatrix4f" => Self::MFMatrix4f,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SFInt32 => "SFInt32",
            Self::MFInt32 => "MFInt32",
            Self::SFFloat => "SFFloat",
            Self::MFFloat => "MFFloat",
            Self::SFDouble => "SFDouble",
            Self::MFDouble => "MFDouble",
            Self::SFTime => "SFTime",
            Self::MFTime => "MFTime",
            Self::SFNode => "SFNode",
            Self::MFNode => "MFNode",
            Self::SFVec2f => "SFVec2f",
            Self::MFVec2f => "MFVec2f",
            Self::SFVec3f => "SFVec3f",
            Self::MFVec3f => "MFVec3f",
            Self::SFVec3d => "SFVec3d",
            Self::MFVec3d => "MFVec3d",
            Self::SFImage => "SFImage",
            Self::MFImage => "MFImage",
            Self::SFLong => "SFLong",
            Self::MFLong => "MFLong",
            Self::SFBool => "SFBool",
            Self::MFBool => "MFBool",
            Self::SFString => "SFString",
            Self::MFString => "MFString",
            Self::SFRotation => "SFRotation",
            Self::MFRotation => "MFRotation",
            Self::SFColor => "SFColor",
            Self::MFColor => "MFColor",
            Self::SFColorRGBA => "SFColorRGBA",
            Self::MFColorRGBA => "MFColorRGBA",
            Self::SFVec2d => "SFVec2d",
            Self::MFVec2d => "MFVec2d",
            Self::SFVec4f => "SFVec4f",
            Self::MFVec4f => "MFVec4f",
            Self::SFVec4d => "SFVec4d",
            Self::MFVec4d => "MFVec4d",
            Self::SFMatrix3f => "SFMatrix3f",
            Self::MFMatrix3f => "MFMatrix3f",
            Self::SFMatrix4f => "SFMatrix4f",
            Self::MFMatrix4f => "MFMatrix4f",
        }
    }

    pub fn storage(&self) -> Storage {
        match self {
            Self::SFBool => Storage::Bool,
            Self::MFBool => Storage::BoolArray,
            Self::SFInt32 => Storage::Int,
            // SFImage is a variable-length pixel list despite the SF name
            Self::MFInt32 | Self::SFImage | Self::MFImage => Storage::IntArray,
            Self::SFLong => Storage::Long,
            Self::MFLong => Storage::LongArray,
            Self::SFFloat => Storage::Float,
            Self::MFFloat
            | Self::SFVec2f
            | Self::MFVec2f
            | Self::SFVec3f
            | Self::MFVec3f
            | Self::SFVec4f
            | Self::MFVec4f
            | Self::SFRotation
            | Self::MFRotation
            | Self::SFColor
            | Self::MFColor
            | Self::SFColorRGBA
            | Self::MFColorRGBA
            | Self::SFMatrix3f
            | Self::MFMatrix3f
            | Self::SFMatrix4f
            | Self::MFMatrix4f => Storage::FloatArray,
            Self::SFDouble | Self::SFTime => Storage::Double,
            Self::MFDouble
            | Self::MFTime
            | Self::SFVec2d
            | Self::MFVec2d
            | Self::SFVec3d
            | Self::MFVec3d
            | Self::SFVec4d
            | Self::MFVec4d => Storage::DoubleArray,
            Self::SFString => Storage::Str,
            Self::MFString => Storage::StrArray,
            Self::SFNode => Storage::Node,
            Self::MFNode => Storage::NodeArray,
        }
    }

    /// Component grouping of array values: a MFVec3f repeats every 3 floats.
    pub fn span(&self) -> usize {
        match self {
            Self::SFVec2f | Self::MFVec2f | Self::SFVec2d | Self::MFVec2d => 2,
            Self::SFVec3f
            | Self::MFVec3f
            | Self::SFVec3d
            | Self::MFVec3d
            | Self::SFColor
            | Self::MFColor => 3,
            Self::SFRotation
            | Self::MFRotation
            | Self::SFColorRGBA
            | Self::MFColorRGBA
            | Self::SFVec4f
            | Self::MFVec4f
            | Self::SFVec4d
            | Self::MFVec4d => 4,
            Self::SFMatrix3f | Self::MFMatrix3f => 9,
            Self::SFMatrix4f | Self::MFMatrix4f => 16,
            _ => 1,
        }
    }

    /// Exact component count for single-valued vector forms; `None` for
    /// variable-length types. A reader recomputes fixed lengths from the
    /// declared type instead of reading them off the wire.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            Self::SFVec2f | Self::SFVec2d => Some(2),
            Self::SFVec3f | Self::SFVec3d | Self::SFColor => Some(3),
            Self::SFRotation | Self::SFColorRGBA | Self::SFVec4f | Self::SFVec4d => Some(4),
            Self::SFMatrix3f => Some(9),
            Self::SFMatrix4f => Some(16),
            _ => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Self::SFNode | Self::MFNode)
    }

    pub fn is_multi(&self) -> bool {
        self.name().starts_with("MF")
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub access: FieldAccess,
    pub field_type: FieldType,
    pub name: String,
    pub default: Option<FieldValue>,
}

impl FieldDecl {
    pub fn new(access: FieldAccess, field_type: FieldType, name: &str) -> FieldDecl {
        FieldDecl {
            access,
            field_type,
            name: name.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: FieldValue) -> FieldDecl {
        self.default = Some(default);
        self
    }
}

/// A node type declared by the built-in vocabulary.
#[derive(Debug)]
pub struct BuiltinNode {
    pub name: &'static str,
    /// Canonical node number from the versioned vocabulary table.
    pub number: u32,
    pub fields: Vec<FieldDecl>,
}

/// An in-document prototype declaration.
#[derive(Debug)]
pub struct ProtoDef {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    /// Raw default value text per field, kept for the declaration table.
    pub raw_defaults: Vec<Option<String>>,
}

/// An externally resolved prototype declaration.
#[derive(Debug)]
pub struct ExternProtoDef {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub uris: Vec<String>,
}

/// A resolved node type: built-in, prototype, or externproto. One shared
/// `field_declaration` capability replaces per-field dispatch on the
/// concrete kind.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Builtin(&'static BuiltinNode),
    Proto(Rc<ProtoDef>),
    Extern(Rc<ExternProtoDef>),
}

impl NodeKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(node) => node.name,
            Self::Proto(proto) => &proto.name,
            Self::Extern(proto) => &proto.name,
        }
    }

    pub fn field_declaration(&self, name: &str) -> Option<&FieldDecl> {
        let fields = match self {
            Self::Builtin(node) => &node.fields,
            Self::Proto(proto) => &proto.fields,
            Self::Extern(proto) => &proto.fields,
        };
        fields.iter().find(|field| field.name == name)
    }
}

/// Per-document type resolution: the built-in vocabulary extended with the
/// document's own prototype declarations.
#[derive(Debug, Default)]
pub struct SchemaSet {
    protos: IndexMap<String, Rc<ProtoDef>>,
    externs: IndexMap<String, Rc<ExternProtoDef>>,
}

impl SchemaSet {
    pub fn new() -> SchemaSet {
        SchemaSet::default()
    }

    pub fn resolve(&self, name: &str) -> Option<NodeKind> {
        if let Some(node) = builtin_node(name) {
            return Some(NodeKind::Builtin(node));
        }
        if let Some(proto) = self.protos.get(name) {
            return Some(NodeKind::Proto(proto.clone()));
        }
        if let Some(proto) = self.externs.get(name) {
            return Some(NodeKind::Extern(proto.clone()));
        }

        None
    }

    /// A later declaration of the same name trashes the previous one.
    pub fn add_proto(&mut self, proto: ProtoDef) {
        self.protos.insert(proto.name.clone(), Rc::new(proto));
    }

    pub fn add_extern(&mut self, proto: ExternProtoDef) {
        self.externs.insert(proto.name.clone(), Rc::new(proto));
    }

    pub fn protos(&self) -> impl Iterator<Item = &Rc<ProtoDef>> {
        self.protos.values()
    }

    pub fn externs(&self) -> impl Iterator<Item = &Rc<ExternProtoDef>> {
        self.externs.values()
    }

    pub fn proto_count(&self) -> usize {
        self.protos.len()
    }

    pub fn extern_count(&self) -> usize {
        self.externs.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_field_type_tags_are_stable() {
        assert_eq!(u8::from(FieldType::SFInt32), 1);
        assert_eq!(u8::from(FieldType::MFColorRGBA), 30);
        assert_eq!(u8::from(FieldType::MFMatrix4f), 40);
        assert_eq!(FieldType::try_from(13u8).unwrap(), FieldType::SFVec3f);
        assert!(FieldType::try_from(0u8).is_err());
        assert!(FieldType::try_from(41u8).is_err());
    }

    #[test]
    fn test_field_type_parse_matches_name() {
        for tag in 1..=FieldType::MAX_TAG {
            let ty = FieldType::try_from(tag).unwrap();
            assert_eq!(FieldType::parse(ty.name()), Some(ty));
        }
    }

    #[test]
    fn test_spans() {
        assert_eq!(FieldType::MFVec3f.span(), 3);
        assert_eq!(FieldType::SFRotation.span(), 4);
        assert_eq!(FieldType::MFInt32.span(), 1);
        assert_eq!(FieldType::SFMatrix4f.fixed_len(), Some(16));
        assert_eq!(FieldType::MFFloat.fixed_len(), None);
        assert_eq!(FieldType::SFImage.fixed_len(), None);
    }
}
