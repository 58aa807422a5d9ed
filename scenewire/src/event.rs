use crate::error::ExportResult;
use crate::schema::{FieldAccess, FieldType};

/// One scene-description event, as delivered by a parsing front end.
///
/// Events arrive in a strict nesting order: documents contain prototype
/// declarations and a node tree, nodes contain fields, SFNode/MFNode fields
/// contain nested nodes, and a value terminates any other field.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartNode {
        name: String,
        def_name: Option<String>,
    },
    EndNode,
    StartField {
        name: String,
    },
    /// Only ever emitted at the end of an MFNode field that declared nodes.
    EndField,
    /// The entire raw text of a field value. `None` signals an empty MF
    /// field or a null SFNode value.
    FieldValue {
        value: Option<String>,
    },
    /// A field value pre-split along SF boundaries by the front end.
    FieldValueList {
        values: Vec<String>,
    },
    UseRef {
        def_name: String,
    },
    StartProtoDecl {
        name: String,
    },
    ProtoFieldDecl {
        access: FieldAccess,
        field_type: FieldType,
        name: String,
        default: Option<String>,
    },
    ProtoIsDecl {
        field_name: String,
    },
    EndProtoDecl,
    StartExternProtoDecl {
        name: String,
    },
    EndExternProtoDecl,
    ExternProtoUri {
        uris: Vec<String>,
    },
    Route {
        src_def: String,
        src_field: String,
        dest_def: String,
        dest_field: String,
    },
}

/// The event protocol shared by every exporter, the statistics pass, and the
/// binary reader. Implementations consume events one at a time; methods they
/// have no interest in default to a no-op.
pub trait SceneHandler {
    fn start_node(&mut self, name: &str, def_name: Option<&str>) -> ExportResult<()> {
        let _ = (name, def_name);
        Ok(())
    }

    fn end_node(&mut self) -> ExportResult<()> {
        Ok(())
    }

    fn start_field(&mut self, name: &str) -> ExportResult<()> {
        let _ = name;
        Ok(())
    }

    fn end_field(&mut self) -> ExportResult<()> {
        Ok(())
    }

    fn field_value(&mut self, value: Option<&str>) -> ExportResult<()> {
        let _ = value;
        Ok(())
    }

    fn field_value_list(&mut self, values: &[String]) -> ExportResult<()> {
        let _ = values;
        Ok(())
    }

    fn use_ref(&mut self, def_name: &str) -> ExportResult<()> {
        let _ = def_name;
        Ok(())
    }

    fn start_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        let _ = name;
        Ok(())
    }

    fn proto_field_decl(
        &mut self,
        access: FieldAccess,
        field_type: FieldType,
        name: &str,
        default: Option<&str>,
    ) -> ExportResult<()> {
        let _ = (access, field_type, name, default);
        Ok(())
    }

    fn proto_is_decl(&mut self, field_name: &str) -> ExportResult<()> {
        let _ = field_name;
        Ok(())
    }

    fn end_proto_decl(&mut self) -> ExportResult<()> {
        Ok(())
    }

    fn start_extern_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        let _ = name;
        Ok(())
    }

    fn end_extern_proto_decl(&mut self) -> ExportResult<()> {
        Ok(())
    }

    fn extern_proto_uri(&mut self, uris: &[String]) -> ExportResult<()> {
        let _ = uris;
        Ok(())
    }

    fn route(
        &mut self,
        src_def: &str,
        src_field: &str,
        dest_def: &str,
        dest_field: &str,
    ) -> ExportResult<()> {
        let _ = (src_def, src_field, dest_def, dest_field);
        Ok(())
    }
}

/// A recorded event stream.
///
/// The binary encoding needs two full passes over the same document
/// (statistics, then emission), so the event source must be replayable.
/// An `EventBuffer` is itself a `SceneHandler`: a front end pushes into it
/// once, and `replay` drives any number of downstream handlers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventBuffer {
    events: Vec<Event>,
}

impl EventBuffer {
    pub fn new() -> EventBuffer {
        EventBuffer::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn replay<H: SceneHandler + ?Sized>(&self, handler: &mut H) -> ExportResult<()> {
        for event in &self.events {
            match event {
                Event::StartNode { name, def_name } => {
                    handler.start_node(name, def_name.as_deref())?
                }
                Event::EndNode => handler.end_node()?,
                Event::StartField { name } => handler.start_field(name)?,
                Event::EndField => handler.end_field()?,
                Event::FieldValue { value } => handler.field_value(value.as_deref())?,
                Event::FieldValueList { values } => handler.field_value_list(values)?,
                Event::UseRef { def_name } => handler.use_ref(def_name)?,
                Event::StartProtoDecl { name } => handler.start_proto_decl(name)?,
                Event::ProtoFieldDecl {
                    access,
                    field_type,
                    name,
                    default,
                } => handler.proto_field_decl(*access, *field_type, name, default.as_deref())?,
                Event::ProtoIsDecl { field_name } => handler.proto_is_decl(field_name)?,
                Event::EndProtoDecl => handler.end_proto_decl()?,
                Event::StartExternProtoDecl { name } => {
                    handler.start_extern_proto_decl(name)?
                }
                Event::EndExternProtoDecl => handler.end_extern_proto_decl()?,
                Event::ExternProtoUri { uris } => handler.extern_proto_uri(uris)?,
                Event::Route {
                    src_def,
                    src_field,
                    dest_def,
                    dest_field,
                } => handler.route(src_def, src_field, dest_def, dest_field)?,
            }
        }

        Ok(())
    }
}

impl SceneHandler for EventBuffer {
    fn start_node(&mut self, name: &str, def_name: Option<&str>) -> ExportResult<()> {
        self.push(Event::StartNode {
            name: name.to_string(),
            def_name: def_name.map(str::to_string),
        });
        Ok(())
    }

    fn end_node(&mut self) -> ExportResult<()> {
        self.push(Event::EndNode);
        Ok(())
    }

    fn start_field(&mut self, name: &str) -> ExportResult<()> {
        self.push(Event::StartField {
            name: name.to_string(),
        });
        Ok(())
    }

    fn end_field(&mut self) -> ExportResult<()> {
        self.push(Event::EndField);
        Ok(())
    }

    fn field_value(&mut self, value: Option<&str>) -> ExportResult<()> {
        self.push(Event::FieldValue {
            value: value.map(str::to_string),
        });
        Ok(())
    }

    fn field_value_list(&mut self, values: &[String]) -> ExportResult<()> {
        self.push(Event::FieldValueList {
            values: values.to_vec(),
        });
        Ok(())
    }

    fn use_ref(&mut self, def_name: &str) -> ExportResult<()> {
        self.push(Event::UseRef {
            def_name: def_name.to_string(),
        });
        Ok(())
    }

    fn start_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.push(Event::StartProtoDecl {
            name: name.to_string(),
        });
        Ok(())
    }

    fn proto_field_decl(
        &mut self,
        access: FieldAccess,
        field_type: FieldType,
        name: &str,
        default: Option<&str>,
    ) -> ExportResult<()> {
        self.push(Event::ProtoFieldDecl {
            access,
            field_type,
            name: name.to_string(),
            default: default.map(str::to_string),
        });
        Ok(())
    }

    fn proto_is_decl(&mut self, field_name: &str) -> ExportResult<()> {
        self.push(Event::ProtoIsDecl {
            field_name: field_name.to_string(),
        });
        Ok(())
    }

    fn end_proto_decl(&mut self) -> ExportResult<()> {
        self.push(Event::EndProtoDecl);
        Ok(())
    }

    fn start_extern_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.push(Event::StartExternProtoDecl {
            name: name.to_string(),
        });
        Ok(())
    }

    fn end_extern_proto_decl(&mut self) -> ExportResult<()> {
        self.push(Event::EndExternProtoDecl);
        Ok(())
    }

    fn extern_proto_uri(&mut self, uris: &[String]) -> ExportResult<()> {
        self.push(Event::ExternProtoUri {
            uris: uris.to_vec(),
        });
        Ok(())
    }

    fn route(
        &mut self,
        src_def: &str,
        src_field: &str,
        dest_def: &str,
        dest_field: &str,
    ) -> ExportResult<()> {
        self.push(Event::Route {
            src_def: src_def.to_string(),
            src_field: src_field.to_string(),
            dest_def: dest_def.to_string(),
            dest_field: dest_field.to_string(),
        });
        Ok(())
    }
}
