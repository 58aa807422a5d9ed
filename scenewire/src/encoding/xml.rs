//! XML encoding exporter. Plain formatting: simple fields become
//! attributes, node fields become child elements carrying a
//! `containerField` attribute when they are not plain children.

use std::io::Write;

use itertools::Itertools;

use crate::error::{ExportError, ExportResult};
use crate::event::SceneHandler;
use crate::schema::{FieldAccess, FieldType, NodeKind, SchemaSet};
use crate::values::FieldValue;

const XML_PROLOGUE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<X3D profile=\"Immersive\">\n<Scene>\n";
const XML_EPILOGUE: &str = "</Scene>\n</X3D>\n";

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    has_children: bool,
}

pub struct XmlExporter<W: Write> {
    sink: W,
    schemas: SchemaSet,
    frames: Vec<NodeKind>,
    elements: Vec<Element>,
    /// Per open node, the node-valued field its children currently land in.
    node_fields: Vec<Option<(String, FieldType)>>,
    open_value_field: Option<(String, FieldType)>,
    depth: usize,
    prologue_written: bool,
    /// DEF name → node type, so USE elements can repeat the element name.
    def_types: Vec<(String, String)>,
}

impl<W: Write> XmlExporter<W> {
    pub fn new(sink: W) -> XmlExporter<W> {
        XmlExporter {
            sink,
            schemas: SchemaSet::new(),
            frames: Vec::new(),
            elements: Vec::new(),
            node_fields: Vec::new(),
            open_value_field: None,
            depth: 0,
            prologue_written: false,
            def_types: Vec::new(),
        }
    }

    /// Close the document. Must be called after the last event.
    pub fn finish(mut self) -> ExportResult<W> {
        self.ensure_prologue()?;
        self.sink.write_all(XML_EPILOGUE.as_bytes())?;
        Ok(self.sink)
    }

    fn ensure_prologue(&mut self) -> ExportResult<()> {
        if !self.prologue_written {
            self.prologue_written = true;
            self.sink.write_all(XML_PROLOGUE.as_bytes())?;
        }

        Ok(())
    }

    fn indent(&mut self) -> ExportResult<()> {
        for _ in 0..self.depth {
            self.sink.write_all(b"  ")?;
        }

        Ok(())
    }

    /// Flush the enclosing element's open tag before children appear.
    fn open_parent(&mut self) -> ExportResult<()> {
        let Some(element) = self.elements.last_mut() else {
            return Ok(());
        };
        if element.has_children {
            return Ok(());
        }
        element.has_children = true;

        let name = element.name.clone();
        let attrs = std::mem::take(&mut element.attrs);
        self.indent()?;
        write!(self.sink, "<{}", name)?;
        for (attr, value) in attrs {
            write!(self.sink, " {}=\"{}\"", attr, value)?;
        }
        self.sink.write_all(b">\n")?;
        self.depth += 1;

        Ok(())
    }

    fn current_node_field(&self) -> Option<&(String, FieldType)> {
        self.node_fields.last().and_then(Option::as_ref)
    }

    fn container_attr(&self) -> Option<(String, String)> {
        match self.current_node_field() {
            Some((name, _)) if name != "children" => {
                Some(("containerField".to_string(), name.clone()))
            }
            _ => None,
        }
    }

    fn resolve(&self, name: &str) -> ExportResult<NodeKind> {
        self.schemas
            .resolve(name)
            .ok_or_else(|| ExportError::UnknownNode(name.to_string()))
    }
}

impl<W: Write> SceneHandler for XmlExporter<W> {
    fn start_node(&mut self, name: &str, def_name: Option<&str>) -> ExportResult<()> {
        self.ensure_prologue()?;
        self.open_parent()?;

        let mut attrs = Vec::new();
        if let Some(def_name) = def_name {
            attrs.push(("DEF".to_string(), escape_attr(def_name)));
            self.def_types
                .push((def_name.to_string(), name.to_string()));
        }
        if let Some(container) = self.container_attr() {
            attrs.push(container);
        }

        self.frames.push(self.resolve(name)?);
        self.elements.push(Element {
            name: name.to_string(),
            attrs,
            has_children: false,
        });
        self.node_fields.push(None);

        Ok(())
    }

    fn end_node(&mut self) -> ExportResult<()> {
        self.frames.pop();
        self.node_fields.pop();
        let element = self.elements.pop().ok_or(ExportError::Structural {
            event: "endNode",
            depth: 0,
            message: "no element open".to_string(),
        })?;

        if element.has_children {
            self.depth = self.depth.saturating_sub(1);
            self.indent()?;
            writeln!(self.sink, "</{}>", element.name)?;
        } else {
            self.indent()?;
            write!(self.sink, "<{}", element.name)?;
            for (attr, value) in &element.attrs {
                write!(self.sink, " {}=\"{}\"", attr, value)?;
            }
            self.sink.write_all(b"/>\n")?;
        }

        // a completed child satisfies the parent's single-node field
        if let Some(slot) = self.node_fields.last_mut() {
            if matches!(slot, Some((_, FieldType::SFNode))) {
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

        if decl.field_type.is_node() {
            if let Some(slot) = self.node_fields.last_mut() {
                *slot = Some((name.to_string(), decl.field_type));
            }
        } else {
            self.open_value_field = Some((name.to_string(), decl.field_type));
        }

        Ok(())
    }

    fn end_field(&mut self) -> ExportResult<()> {
        if let Some(slot) = self.node_fields.last_mut() {
            *slot = None;
        }

        Ok(())
    }

    fn field_value(&mut self, value: Option<&str>) -> ExportResult<()> {
        if self.current_node_field().is_some() {
            // a null SFNode or empty MFNode adds nothing to the element
            if let Some(slot) = self.node_fields.last_mut() {
                *slot = None;
            }
            return Ok(());
        }
        let Some((name, field_type)) = self.open_value_field.take() else {
            return Err(ExportError::Structural {
                event: "fieldValue",
                depth: 0,
                message: "value with no open field".to_string(),
            });
        };

        let text = match value {
            Some(raw) => {
                // attribute values carry the flat value form, no brackets
                let parsed = FieldValue::parse(field_type, raw)?;
                parsed.to_string()
            }
            None => String::new(),
        };
        if let Some(element) = self.elements.last_mut() {
            element.attrs.push((name, escape_attr(&text)));
        }

        Ok(())
    }

    fn field_value_list(&mut self, values: &[String]) -> ExportResult<()> {
        if self.current_node_field().is_some() {
            if let Some(slot) = self.node_fields.last_mut() {
                *slot = None;
            }
            return Ok(());
        }
        let Some((name, field_type)) = self.open_value_field.take() else {
            return Err(ExportError::Structural {
                event: "fieldValue",
                depth: 0,
                message: "value with no open field".to_string(),
            });
        };

        let parsed = FieldValue::parse_list(field_type, values)?;
        if let Some(element) = self.elements.last_mut() {
            element.attrs.push((name, escape_attr(&parsed.to_string())));
        }

        Ok(())
    }

    fn use_ref(&mut self, def_name: &str) -> ExportResult<()> {
        self.open_parent()?;

        let type_name = self
            .def_types
            .iter()
            .rev()
            .find(|(def, _)| def == def_name)
            .map(|(_, ty)| ty.clone())
            .ok_or_else(|| ExportError::UnknownDef(def_name.to_string()))?;

        self.indent()?;
        write!(self.sink, "<{} USE=\"{}\"", type_name, escape_attr(def_name))?;
        if let Some((attr, value)) = self.container_attr() {
            write!(self.sink, " {}=\"{}\"", attr, value)?;
        }
        self.sink.write_all(b"/>\n")?;

        if let Some(slot) = self.node_fields.last_mut() {
            if matches!(slot, Some((_, FieldType::SFNode))) {
                *slot = None;
            }
        }

        Ok(())
    }

    fn start_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.ensure_prologue()?;
        self.indent()?;
        writeln!(self.sink, "<ProtoDeclare name=\"{}\">", escape_attr(name))?;
        self.depth += 1;
        self.indent()?;
        self.sink.write_all(b"<ProtoInterface>\n")?;
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
        self.indent()?;
        write!(
            self.sink,
            "<field accessType=\"{}\" type=\"{}\" name=\"{}\"",
            access,
            field_type,
            escape_attr(name)
        )?;
        if let Some(raw) = default {
            if !field_type.is_node() {
                let parsed = FieldValue::parse(field_type, raw)?;
                write!(self.sink, " value=\"{}\"", escape_attr(&parsed.to_string()))?;
            }
        }
        self.sink.write_all(b"/>\n")?;

        Ok(())
    }

    fn end_proto_decl(&mut self) -> ExportResult<()> {
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        self.sink.write_all(b"</ProtoInterface>\n")?;
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        self.sink.write_all(b"</ProtoDeclare>\n")?;

        Ok(())
    }

    fn start_extern_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.ensure_prologue()?;
        self.indent()?;
        writeln!(
            self.sink,
            "<ExternProtoDeclare name=\"{}\">",
            escape_attr(name)
        )?;
        self.depth += 1;

        Ok(())
    }

    fn extern_proto_uri(&mut self, uris: &[String]) -> ExportResult<()> {
        self.indent()?;
        writeln!(
            self.sink,
            "<!-- url {} -->",
            uris.iter().map(|uri| escape_attr(uri)).join(" ")
        )?;

        Ok(())
    }

    fn end_extern_proto_decl(&mut self) -> ExportResult<()> {
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        self.sink.write_all(b"</ExternProtoDeclare>\n")?;

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
            "<ROUTE fromNode=\"{}\" fromField=\"{}\" toNode=\"{}\" toField=\"{}\"/>",
            escape_attr(src_def),
            escape_attr(src_field),
            escape_attr(dest_def),
            escape_attr(dest_field)
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventBuffer;

    #[test]
    fn test_xml_output() {
        let mut events = EventBuffer::new();
        events.start_node("Shape", Some("S")).unwrap();
        events.start_field("appearance").unwrap();
        events.start_node("Appearance", None).unwrap();
        events.start_field("material").unwrap();
        events.start_node("Material", None).unwrap();
        events.start_field("diffuseColor").unwrap();
        events.field_value(Some("1 0 0")).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();
        events.start_field("geometry").unwrap();
        events.start_node("Box", None).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();

        let mut exporter = XmlExporter::new(Vec::new());
        events.replay(&mut exporter).unwrap();
        let text = String::from_utf8(exporter.finish().unwrap()).unwrap();

        let expected = "\
<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<X3D profile=\"Immersive\">
<Scene>
<Shape DEF=\"S\">
  <Appearance containerField=\"appearance\">
    <Material containerField=\"material\" diffuseColor=\"1 0 0\"/>
  </Appearance>
  <Box containerField=\"geometry\"/>
</Shape>
</Scene>
</X3D>
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_xml_escaping() {
        let mut events = EventBuffer::new();
        events.start_node("WorldInfo", None).unwrap();
        events.start_field("title").unwrap();
        events.field_value(Some("\"a < b & c\"")).unwrap();
        events.end_node().unwrap();

        let mut exporter = XmlExporter::new(Vec::new());
        events.replay(&mut exporter).unwrap();
        let text = String::from_utf8(exporter.finish().unwrap()).unwrap();
        assert!(text.contains("title=\"&quot;a &lt; b &amp; c&quot;\""));
    }
}
