//! Classic textual encoding exporter. Plain formatting only: two-space
//! indentation, one field per line, no wrapping or alignment rules.

use std::io::Write;

use itertools::Itertools;

use crate::error::{ExportError, ExportResult};
use crate::event::SceneHandler;
use crate::schema::{
    ExternProtoDef, FieldAccess, FieldDecl, FieldType, NodeKind, ProtoDef, SchemaSet, Storage,
};

pub const CLASSIC_HEADER: &str = "#VRML V2.0 utf8\n";

struct ProtoBuilder {
    name: String,
    fields: Vec<FieldDecl>,
    raw_defaults: Vec<Option<String>>,
    uris: Vec<String>,
    is_extern: bool,
}

pub struct ClassicExporter<W: Write> {
    sink: W,
    schemas: SchemaSet,
    frames: Vec<NodeKind>,
    /// Per open node, the field its content is currently being written to.
    field_stack: Vec<Option<FieldType>>,
    depth: usize,
    header_written: bool,
    current_proto: Option<ProtoBuilder>,
}

impl<W: Write> ClassicExporter<W> {
    pub fn new(sink: W) -> ClassicExporter<W> {
        ClassicExporter {
            sink,
            schemas: SchemaSet::new(),
            frames: Vec::new(),
            field_stack: Vec::new(),
            depth: 0,
            header_written: false,
            current_proto: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn ensure_header(&mut self) -> ExportResult<()> {
        if !self.header_written {
            self.header_written = true;
            self.sink.write_all(CLASSIC_HEADER.as_bytes())?;
            self.sink.write_all(b"\n")?;
        }

        Ok(())
    }

    fn indent(&mut self) -> ExportResult<()> {
        for _ in 0..self.depth {
            self.sink.write_all(b"  ")?;
        }

        Ok(())
    }

    fn resolve(&self, name: &str) -> ExportResult<NodeKind> {
        self.schemas
            .resolve(name)
            .ok_or_else(|| ExportError::UnknownNode(name.to_string()))
    }

    fn write_field_decl(
        &mut self,
        decl: &FieldDecl,
        raw_default: Option<&str>,
    ) -> ExportResult<()> {
        self.indent()?;
        write!(
            self.sink,
            "{} {} {}",
            decl.access.name(),
            decl.field_type,
            decl.name
        )?;
        if let Some(raw) = raw_default {
            write!(self.sink, " {}", raw)?;
        }
        self.sink.write_all(b"\n")?;

        Ok(())
    }
}

impl<W: Write> SceneHandler for ClassicExporter<W> {
    fn start_node(&mut self, name: &str, def_name: Option<&str>) -> ExportResult<()> {
        self.ensure_header()?;

        // only a single-node field keeps the node on the field's own line;
        // MFNode children each get their own line inside the bracket
        let inline = matches!(self.field_stack.last(), Some(Some(FieldType::SFNode)));
        if !inline {
            self.indent()?;
        }

        if let Some(def_name) = def_name {
            write!(self.sink, "DEF {} ", def_name)?;
        }
        writeln!(self.sink, "{} {{", name)?;

        self.frames.push(self.resolve(name)?);
        self.field_stack.push(None);
        self.depth += 1;

        Ok(())
    }

    fn end_node(&mut self) -> ExportResult<()> {
        self.frames.pop();
        self.field_stack.pop();
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        self.sink.write_all(b"}\n")?;

        // a completed child satisfies the parent's single-node field
        if let Some(slot) = self.field_stack.last_mut() {
            if *slot == Some(FieldType::SFNode) {
                *slot = None;
            }
        }

        Ok(())
    }

    fn start_field(&mut self, name: &str) -> ExportResult<()> {
        let kind = self.frames.last().ok_or(ExportError::Structural {
            event: "startField",
            depth: 0,
            message: format!("field '{}' outside any node", name),
        })?;
        let decl = kind
            .field_declaration(name)
            .ok_or_else(|| ExportError::UnknownField {
                node: kind.name().to_string(),
                field: name.to_string(),
            })?;
        let field_type = decl.field_type;

        self.indent()?;
        write!(self.sink, "{} ", name)?;
        if field_type == FieldType::MFNode {
            self.sink.write_all(b"[\n")?;
            self.depth += 1;
        }
        if let Some(slot) = self.field_stack.last_mut() {
            *slot = Some(field_type);
        }

        Ok(())
    }

    fn end_field(&mut self) -> ExportResult<()> {
        let slot = self.field_stack.last_mut().and_then(Option::take);
        if slot == Some(FieldType::MFNode) {
            self.depth = self.depth.saturating_sub(1);
            self.indent()?;
            self.sink.write_all(b"]\n")?;
        }

        Ok(())
    }

    fn field_value(&mut self, value: Option<&str>) -> ExportResult<()> {
        let field_type = self.field_stack.last_mut().and_then(Option::take);
        match value {
            Some(raw) => writeln!(self.sink, "{}", raw)?,
            None => match field_type {
                Some(FieldType::SFNode) => self.sink.write_all(b"NULL\n")?,
                Some(FieldType::MFNode) => {
                    // the bracket was already opened by startField
                    self.depth = self.depth.saturating_sub(1);
                    self.indent()?;
                    self.sink.write_all(b"]\n")?;
                }
                _ => self.sink.write_all(b"[]\n")?,
            },
        }

        Ok(())
    }

    fn field_value_list(&mut self, values: &[String]) -> ExportResult<()> {
        let quoted = matches!(
            self.field_stack.last_mut().and_then(Option::take),
            Some(ty) if matches!(ty.storage(), Storage::Str | Storage::StrArray)
        );
        if quoted {
            writeln!(
                self.sink,
                "[ {} ]",
                values
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
                    .join(" ")
            )?;
        } else {
            writeln!(self.sink, "[ {} ]", values.iter().join(" "))?;
        }

        Ok(())
    }

    fn use_ref(&mut self, def_name: &str) -> ExportResult<()> {
        let inline = matches!(self.field_stack.last(), Some(Some(FieldType::SFNode)));
        if inline {
            if let Some(slot) = self.field_stack.last_mut() {
                *slot = None;
            }
        } else {
            self.indent()?;
        }
        writeln!(self.sink, "USE {}", def_name)?;

        Ok(())
    }

    fn start_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.ensure_header()?;
        self.current_proto = Some(ProtoBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            raw_defaults: Vec::new(),
            uris: Vec::new(),
            is_extern: false,
        });

        self.indent()?;
        writeln!(self.sink, "PROTO {} [", name)?;
        self.depth += 1;

        Ok(())
    }

    fn proto_field_decl(
        &mut self,
        access: FieldAccess,
        field_type: FieldType,
        name: &str,
        default: Option<&str>,
    ) -> ExportResult<()> {
        let mut decl = FieldDecl::new(access, field_type, name);
        if let Some(raw) = default {
            if !field_type.is_node() {
                decl.default = Some(crate::values::FieldValue::parse(field_type, raw)?);
            }
        }
        self.write_field_decl(&decl, default)?;

        if let Some(builder) = self.current_proto.as_mut() {
            builder.fields.push(decl);
            builder.raw_defaults.push(default.map(str::to_string));
        }

        Ok(())
    }

    fn end_proto_decl(&mut self) -> ExportResult<()> {
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        // proto bodies are resolved upstream and never reach the event
        // stream; an empty body keeps the output parseable
        self.sink.write_all(b"] {\n")?;
        self.indent()?;
        self.sink.write_all(b"}\n")?;

        if let Some(builder) = self.current_proto.take() {
            self.schemas.add_proto(ProtoDef {
                name: builder.name,
                fields: builder.fields,
                raw_defaults: builder.raw_defaults,
            });
        }

        Ok(())
    }

    fn start_extern_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.ensure_header()?;
        self.current_proto = Some(ProtoBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            raw_defaults: Vec::new(),
            uris: Vec::new(),
            is_extern: true,
        });

        self.indent()?;
        writeln!(self.sink, "EXTERNPROTO {} [", name)?;
        self.depth += 1;

        Ok(())
    }

    fn extern_proto_uri(&mut self, uris: &[String]) -> ExportResult<()> {
        if let Some(builder) = self.current_proto.as_mut() {
            builder.uris = uris.to_vec();
        }

        Ok(())
    }

    fn end_extern_proto_decl(&mut self) -> ExportResult<()> {
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        self.sink.write_all(b"]\n")?;

        let Some(builder) = self.current_proto.take() else {
            return Ok(());
        };
        self.indent()?;
        writeln!(
            self.sink,
            "[ {} ]",
            builder
                .uris
                .iter()
                .map(|uri| format!("\"{}\"", uri))
                .join(" ")
        )?;

        debug_assert!(builder.is_extern);
        self.schemas.add_extern(ExternProtoDef {
            name: builder.name,
            fields: builder.fields,
            uris: builder.uris,
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
        self.indent()?;
        writeln!(
            self.sink,
            "ROUTE {}.{} TO {}.{}",
            src_def, src_field, dest_def, dest_field
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventBuffer;

    #[test]
    fn test_classic_output() {
        let mut events = EventBuffer::new();
        events.start_node("Transform", Some("T")).unwrap();
        events.start_field("translation").unwrap();
        events.field_value(Some("1 2 3")).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Shape", None).unwrap();
        events.start_field("geometry").unwrap();
        events.start_node("Box", None).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();
        events.use_ref("T").unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();
        events.route("T", "set_translation", "T", "set_center").unwrap();

        let mut exporter = ClassicExporter::new(Vec::new());
        events.replay(&mut exporter).unwrap();
        let text = String::from_utf8(exporter.into_inner()).unwrap();

        let expected = "\
#VRML V2.0 utf8

DEF T Transform {
  translation 1 2 3
  children [
    Shape {
      geometry Box {
      }
    }
    USE T
  ]
}
ROUTE T.set_translation TO T.set_center
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_classic_null_and_empty_values() {
        let mut events = EventBuffer::new();
        events.start_node("Shape", None).unwrap();
        events.start_field("geometry").unwrap();
        events.field_value(None).unwrap();
        events.end_node().unwrap();

        let mut exporter = ClassicExporter::new(Vec::new());
        events.replay(&mut exporter).unwrap();
        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("geometry NULL"));
    }
}
