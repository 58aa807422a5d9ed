//! The binary stream writer: pass 2 of the export.
//!
//! Consumes the same event protocol as the text exporters, tracks one
//! explicit frame per open node, and emits opcode + payload records sized
//! by the frozen dictionaries. Every record is padded to a whole number of
//! bytes; only the fields within one record share bit packing.
//!
//! Wire shape of a node body: field records (field id + 3-bit method +
//! strategy payload) terminated by a `fieldOpBytes` zero sentinel. An
//! SFNode or MFNode field holds node records after its field record; an
//! MFNode child list ends with a `nodeOpBytes` zero record (node number 0
//! is reserved for exactly this).

pub mod decode;

use std::io::Write;

use super::bits::BitPacker;
use super::compress::CodecRegistry;
use super::dict::Dictionaries;
use super::stats::SceneStatistics;
use crate::error::{ExportError, ExportResult};
use crate::event::{EventBuffer, SceneHandler};
use crate::options::ExportOptions;
use crate::schema::{FieldAccess, FieldType, NodeKind, SchemaSet};
use crate::values::FieldValue;

pub const OP_BITS: u32 = 2;
pub const FIELD_METHOD_BITS: u32 = 3;

pub const OP_NODE: u64 = 0;
pub const OP_USE: u64 = 1;
pub const OP_COMMENT: u64 = 2;
pub const OP_ROUTE: u64 = 3;

/// Smallest float difference still considered equal when eliding defaults.
pub const FLOAT_EPS: f32 = 9.0e-7;

/// Encode a recorded document: statistics pass, dictionary freeze, then
/// emission, with the strategy set selected by the options' compression
/// profile.
pub fn export<W: Write>(
    events: &EventBuffer,
    sink: W,
    options: &ExportOptions,
) -> ExportResult<()> {
    let registry =
        CodecRegistry::for_profile(options.compression, options.quantize_tolerance);
    export_with(events, sink, options, registry)
}

/// Encode with a caller-assembled strategy registry. The registry is sealed
/// before the first byte is written.
pub fn export_with<W: Write>(
    events: &EventBuffer,
    mut sink: W,
    options: &ExportOptions,
    mut registry: CodecRegistry,
) -> ExportResult<()> {
    let stats = SceneStatistics::collect(events)?;
    let dicts = Dictionaries::build(&stats, options.dictionary)?;
    registry.seal();

    dicts.write_header(&mut sink, stats.schemas())?;

    let mut writer = BinaryWriter {
        sink: &mut sink,
        dicts: &dicts,
        schemas: stats.schemas(),
        registry: &registry,
        remove_defaults: options.remove_defaults,
        frames: Vec::new(),
        routes: Vec::new(),
    };
    events.replay(&mut writer)?;
    writer.finish()?;

    sink.flush()?;
    Ok(())
}

struct OpenField {
    field_type: FieldType,
    default: Option<FieldValue>,
    wire_id: u32,
    record_written: bool,
}

struct Frame {
    kind: NodeKind,
    node_id: u32,
    open_field: Option<OpenField>,
}

struct BinaryWriter<'a, W: Write> {
    sink: &'a mut W,
    dicts: &'a Dictionaries,
    schemas: &'a SchemaSet,
    registry: &'a CodecRegistry,
    remove_defaults: bool,
    frames: Vec<Frame>,
    routes: Vec<[u64; 4]>,
}

impl<'a, W: Write> BinaryWriter<'a, W> {
    fn structural(&self, event: &'static str, message: impl Into<String>) -> ExportError {
        ExportError::Structural {
            event,
            depth: self.frames.len(),
            message: message.into(),
        }
    }

    fn write_node_record(&mut self, node_id: u32, def_id: u32) -> ExportResult<()> {
        let mut packer = BitPacker::with_capacity(self.dicts.node_op_bytes);
        packer.pack(OP_NODE, OP_BITS)?;
        packer.pack(node_id as u64, self.dicts.node_num_bits)?;
        packer.pack(def_id as u64, self.dicts.def_num_bits)?;
        let record = packer.into_bytes();
        debug_assert_eq!(record.len(), self.dicts.node_op_bytes);
        self.sink.write_all(&record)?;
        Ok(())
    }

    /// A zero node record: terminates an MFNode child list and stands in
    /// for a null SFNode.
    fn write_node_list_end(&mut self) -> ExportResult<()> {
        self.sink.write_all(&vec![0u8; self.dicts.node_op_bytes])?;
        Ok(())
    }

    fn write_field_record(&mut self, wire_id: u32, method: u8) -> ExportResult<()> {
        let mut packer = BitPacker::with_capacity(self.dicts.field_op_bytes);
        packer.pack(wire_id as u64, self.dicts.field_num_bits)?;
        packer.pack(method as u64, FIELD_METHOD_BITS)?;
        let record = packer.into_bytes();
        debug_assert_eq!(record.len(), self.dicts.field_op_bytes);
        self.sink.write_all(&record)?;
        Ok(())
    }

    /// Emit the deferred field record of the innermost open field, if it
    /// has not been written yet. Node-valued fields carry method 0.
    fn flush_open_field_record(&mut self) -> ExportResult<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let Some(open) = frame.open_field.as_mut() else {
            return Ok(());
        };
        if open.record_written {
            return Ok(());
        }
        open.record_written = true;
        let wire_id = open.wire_id;
        self.write_field_record(wire_id, 0)
    }

    fn close_open_field(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.open_field = None;
        }
    }

    fn resolve_route_end(
        &self,
        def_name: &str,
        field_name: &str,
    ) -> ExportResult<(u64, u64)> {
        let def_id = self
            .dicts
            .def_id(def_name)
            .ok_or_else(|| ExportError::UnknownDef(def_name.to_string()))?;
        let node_id = self
            .dicts
            .def_node_id(def_id)
            .ok_or_else(|| ExportError::UnknownDef(def_name.to_string()))?;
        let field_id =
            self.dicts
                .field_id(node_id, field_name)
                .ok_or_else(|| ExportError::UnknownField {
                    node: self
                        .dicts
                        .node_name(node_id)
                        .unwrap_or("<unknown>")
                        .to_string(),
                    field: field_name.to_string(),
                })?;

        Ok((def_id as u64, field_id as u64 + 1))
    }

    /// Trailing route records, then end of stream.
    fn finish(&mut self) -> ExportResult<()> {
        if !self.frames.is_empty() {
            return Err(self.structural("endDocument", "document ended with unclosed nodes"));
        }

        for route in std::mem::take(&mut self.routes) {
            let mut packer = BitPacker::with_capacity(self.dicts.route_op_bytes);
            packer.pack(OP_ROUTE, OP_BITS)?;
            packer.pack(route[0], self.dicts.def_num_bits)?;
            packer.pack(route[1], self.dicts.field_num_bits)?;
            packer.pack(route[2], self.dicts.def_num_bits)?;
            packer.pack(route[3], self.dicts.field_num_bits)?;
            let record = packer.into_bytes();
            debug_assert_eq!(record.len(), self.dicts.route_op_bytes);
            self.sink.write_all(&record)?;
        }

        Ok(())
    }
}

impl<'a, W: Write> SceneHandler for BinaryWriter<'a, W> {
    fn start_node(&mut self, name: &str, def_name: Option<&str>) -> ExportResult<()> {
        if let Some(frame) = self.frames.last() {
            match &frame.open_field {
                Some(open) if open.field_type.is_node() => {}
                Some(_) => {
                    return Err(self.structural(
                        "startNode",
                        format!("node '{}' inside a value field", name),
                    ))
                }
                None => {
                    return Err(self.structural(
                        "startNode",
                        format!("node '{}' outside any field", name),
                    ))
                }
            }
        }
        self.flush_open_field_record()?;

        let node_id = self
            .dicts
            .node_id(name)
            .ok_or_else(|| ExportError::UnknownNode(name.to_string()))?;
        let def_id = match def_name {
            Some(def_name) => self
                .dicts
                .def_id(def_name)
                .ok_or_else(|| ExportError::UnknownDef(def_name.to_string()))?,
            None => 0,
        };
        self.write_node_record(node_id, def_id)?;

        let kind = self
            .schemas
            .resolve(name)
            .ok_or_else(|| ExportError::UnknownNode(name.to_string()))?;
        self.frames.push(Frame {
            kind,
            node_id,
            open_field: None,
        });

        Ok(())
    }

    fn end_node(&mut self) -> ExportResult<()> {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return Err(self.structural("endNode", "no node open")),
        };
        if frame.open_field.is_some() {
            return Err(self.structural("endNode", "node ended with an open field"));
        }

        self.sink.write_all(&vec![0u8; self.dicts.field_op_bytes])?;

        // a completed child satisfies the parent's single-node field
        if let Some(parent) = self.frames.last_mut() {
            if let Some(open) = &parent.open_field {
                if open.field_type == FieldType::SFNode {
                    parent.open_field = None;
                }
            }
        }

        Ok(())
    }

    fn start_field(&mut self, name: &str) -> ExportResult<()> {
        let Some(frame) = self.frames.last() else {
            return Err(self.structural("startField", format!("field '{}' outside any node", name)));
        };
        if frame.open_field.is_some() {
            return Err(self.structural(
                "startField",
                format!("field '{}' begun while another field is open", name),
            ));
        }

        let decl =
            frame
                .kind
                .field_declaration(name)
                .ok_or_else(|| ExportError::UnknownField {
                    node: frame.kind.name().to_string(),
                    field: name.to_string(),
                })?;
        let field_type = decl.field_type;
        let default = decl.default.clone();
        let wire_id = self
            .dicts
            .field_id(frame.node_id, name)
            .ok_or_else(|| ExportError::UnknownField {
                node: frame.kind.name().to_string(),
                field: name.to_string(),
            })?
            + 1;

        let frame = self.frames.last_mut().expect("frame checked above");
        frame.open_field = Some(OpenField {
            field_type,
            default,
            wire_id,
            record_written: false,
        });

        Ok(())
    }

    fn field_value(&mut self, value: Option<&str>) -> ExportResult<()> {
        let Some(frame) = self.frames.last() else {
            return Err(self.structural("fieldValue", "value outside any node"));
        };
        let Some(open) = &frame.open_field else {
            return Err(self.structural("fieldValue", "value with no open field"));
        };
        let field_type = open.field_type;

        if field_type.is_node() {
            // a null SFNode or empty MFNode never reaches the wire; the
            // schema default reconstructs it
            match value.map(str::trim) {
                None | Some("NULL") | Some("") => {
                    self.close_open_field();
                    return Ok(());
                }
                Some(other) => {
                    return Err(self.structural(
                        "fieldValue",
                        format!("unexpected text '{}' on a node field", other),
                    ))
                }
            }
        }

        let parsed = match value {
            Some(raw) => FieldValue::parse(field_type, raw)?,
            None => FieldValue::empty(field_type).ok_or_else(|| {
                self.structural("fieldValue", format!("{} has no empty form", field_type))
            })?,
        };

        if self.remove_defaults {
            if let Some(default) = &open.default {
                if parsed.matches_within(default, FLOAT_EPS) {
                    self.close_open_field();
                    return Ok(());
                }
            }
        }

        let wire_id = open.wire_id;
        let (method, payload) = self.registry.encode_field(field_type, &parsed)?;
        self.write_field_record(wire_id, u8::from(method))?;
        self.sink.write_all(&payload)?;
        self.close_open_field();

        Ok(())
    }

    fn field_value_list(&mut self, values: &[String]) -> ExportResult<()> {
        let field_type = {
            let Some(frame) = self.frames.last() else {
                return Err(self.structural("fieldValue", "value outside any node"));
            };
            let Some(open) = &frame.open_field else {
                return Err(self.structural("fieldValue", "value with no open field"));
            };
            open.field_type
        };

        if field_type.is_node() {
            self.close_open_field();
            return Ok(());
        }

        let parsed = FieldValue::parse_list(field_type, values)?;

        let open = self
            .frames
            .last()
            .and_then(|frame| frame.open_field.as_ref())
            .expect("field checked above");
        if self.remove_defaults {
            if let Some(default) = &open.default {
                if parsed.matches_within(default, FLOAT_EPS) {
                    self.close_open_field();
                    return Ok(());
                }
            }
        }

        let wire_id = open.wire_id;
        let (method, payload) = self.registry.encode_field(field_type, &parsed)?;
        self.write_field_record(wire_id, u8::from(method))?;
        self.sink.write_all(&payload)?;
        self.close_open_field();

        Ok(())
    }

    fn end_field(&mut self) -> ExportResult<()> {
        let Some(frame) = self.frames.last() else {
            return Err(self.structural("endField", "no node open"));
        };
        let Some(open) = &frame.open_field else {
            // some front ends emit extra endField notifications; harmless
            return Ok(());
        };

        if open.field_type == FieldType::MFNode {
            self.flush_open_field_record()?;
            self.write_node_list_end()?;
        }
        self.close_open_field();

        Ok(())
    }

    fn use_ref(&mut self, def_name: &str) -> ExportResult<()> {
        let mut closes_sfnode = false;
        if let Some(frame) = self.frames.last() {
            match &frame.open_field {
                Some(open) if open.field_type.is_node() => {
                    closes_sfnode = open.field_type == FieldType::SFNode;
                }
                Some(_) => {
                    return Err(self.structural("useDecl", "USE inside a value field"))
                }
                None => return Err(self.structural("useDecl", "USE outside any field")),
            }
        }
        self.flush_open_field_record()?;

        let def_id = self
            .dicts
            .def_id(def_name)
            .ok_or_else(|| ExportError::UnknownDef(def_name.to_string()))?;

        let mut packer = BitPacker::with_capacity(self.dicts.use_op_bytes);
        packer.pack(OP_USE, OP_BITS)?;
        packer.pack(def_id as u64, self.dicts.def_num_bits)?;
        let record = packer.into_bytes();
        debug_assert_eq!(record.len(), self.dicts.use_op_bytes);
        self.sink.write_all(&record)?;

        if closes_sfnode {
            self.close_open_field();
        }

        Ok(())
    }

    fn route(
        &mut self,
        src_def: &str,
        src_field: &str,
        dest_def: &str,
        dest_field: &str,
    ) -> ExportResult<()> {
        let (src_def, src_field) = self.resolve_route_end(src_def, src_field)?;
        let (dest_def, dest_field) = self.resolve_route_end(dest_def, dest_field)?;
        self.routes.push([src_def, src_field, dest_def, dest_field]);

        Ok(())
    }

    // proto declarations were serialized with the header tables during the
    // statistics pass; nothing to add to the body

    fn start_proto_decl(&mut self, _name: &str) -> ExportResult<()> {
        Ok(())
    }

    fn proto_field_decl(
        &mut self,
        _access: FieldAccess,
        _field_type: FieldType,
        _name: &str,
        _default: Option<&str>,
    ) -> ExportResult<()> {
        Ok(())
    }

    fn end_proto_decl(&mut self) -> ExportResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::decode::decode;
    use super::*;
    use crate::encoding::dict::DictionaryMode;
    use crate::event::Event;
    use crate::options::CompressionProfile;

    fn canonical_options() -> ExportOptions {
        ExportOptions {
            dictionary: DictionaryMode::Canonical,
            ..ExportOptions::default()
        }
    }

    fn encode(events: &EventBuffer, options: &ExportOptions) -> Vec<u8> {
        let mut out = Vec::new();
        export(events, &mut out, options).unwrap();
        out
    }

    /// Canonicalize an event stream the way the binary wire does: raw
    /// value text is reduced to its typed classic form, pre-split values
    /// collapse, and null node-field values disappear.
    fn normalize(events: &EventBuffer, options: &ExportOptions) -> Vec<Event> {
        let stats = SceneStatistics::collect(events).unwrap();
        let schemas = stats.schemas();
        let mut out = Vec::new();
        let mut kinds: Vec<NodeKind> = Vec::new();
        let mut open: Option<FieldType> = None;
        let mut open_default: Option<FieldValue> = None;

        for event in events.events() {
            match event {
                Event::StartNode { name, .. } => {
                    kinds.push(schemas.resolve(name).unwrap());
                    out.push(event.clone());
                }
                Event::EndNode => {
                    kinds.pop();
                    out.push(event.clone());
                }
                Event::StartField { name } => {
                    let decl = kinds.last().unwrap().field_declaration(name).unwrap();
                    open = Some(decl.field_type);
                    open_default = decl.default.clone();
                    out.push(event.clone());
                }
                Event::EndField => {
                    open = None;
                    out.push(event.clone());
                }
                Event::FieldValue { .. } | Event::FieldValueList { .. } => {
                    let ty = open.take().unwrap();
                    if ty.is_node() {
                        // nulls and empties never reach the wire
                        out.pop();
                        continue;
                    }
                    let parsed = match event {
                        Event::FieldValue { value } => match value {
                            Some(raw) => FieldValue::parse(ty, raw).unwrap(),
                            None => FieldValue::empty(ty).unwrap(),
                        },
                        Event::FieldValueList { values } => {
                            FieldValue::parse_list(ty, values).unwrap()
                        }
                        _ => unreachable!(),
                    };
                    if options.remove_defaults {
                        if let Some(default) = &open_default {
                            if parsed.matches_within(default, FLOAT_EPS) {
                                out.pop();
                                continue;
                            }
                        }
                    }
                    out.push(Event::FieldValue {
                        value: Some(parsed.to_classic(ty)),
                    });
                }
                other => out.push(other.clone()),
            }
        }

        out
    }

    fn assert_round_trip(events: &EventBuffer, options: &ExportOptions) {
        let bytes = encode(events, options);
        let mut decoded = EventBuffer::new();
        decode(&bytes, &mut decoded, options).unwrap();
        assert_eq!(decoded.events(), normalize(events, options).as_slice());
    }

    fn group_with_shape() -> EventBuffer {
        let mut events = EventBuffer::new();
        events.start_node("Group", None).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Shape", None).unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();
        events
    }

    #[test]
    fn test_canonical_group_shape_body_bytes() {
        let events = group_with_shape();
        let bytes = encode(&events, &canonical_options());

        // nodeNumBits=7 (canonical range), defNumBits=0, fieldNumBits=2:
        //   OP_NODE|30        00 0011110 + pad  -> 0F 00
        //   field 1, method 0 01 000    + pad   -> 40
        //   OP_NODE|54        00 0110110 + pad  -> 1B 00
        //   end of fields (Shape)               -> 00
        //   child list end                      -> 00 00
        //   end of fields (Group)               -> 00
        let body = &bytes[bytes.len() - 9..];
        assert_eq!(
            body,
            [0x0f, 0x00, 0x40, 0x1b, 0x00, 0x00, 0x00, 0x00, 0x00],
            "body was {}",
            hex::encode_upper(body)
        );

        // header: version 2, nodeNumBits 7, defNumBits 0, fieldNumBits 2
        assert_eq!(&bytes[..4], [0x02, 0x07, 0x00, 0x02]);
    }

    #[test]
    fn test_def_use_share_an_index() {
        let mut events = EventBuffer::new();
        events.start_node("Group", None).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Box", Some("A")).unwrap();
        events.end_node().unwrap();
        events.use_ref("A").unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();

        let options = canonical_options();
        let bytes = encode(&events, &options);

        // nodeNumBits=7, defNumBits=1, fieldNumBits=2:
        //   OP_NODE|30|def=0  00 0011110 0 + pad -> 0F 00
        //   field 1, method 0 01 000     + pad   -> 40
        //   OP_NODE|7|def=1   00 0000111 1 + pad -> 07 80
        //   end of fields (Box)                  -> 00
        //   OP_USE|def=1      01 1        + pad  -> 60
        //   child list end                       -> 00 00
        //   end of fields (Group)                -> 00
        let body = &bytes[bytes.len() - 10..];
        assert_eq!(
            body,
            [0x0f, 0x00, 0x40, 0x07, 0x80, 0x00, 0x60, 0x00, 0x00, 0x00],
            "body was {}",
            hex::encode_upper(body)
        );

        assert_round_trip(&events, &options);
    }

    #[test]
    fn test_round_trip_content_mode() {
        let mut events = EventBuffer::new();
        events.start_node("Transform", Some("ROOT")).unwrap();
        events.start_field("translation").unwrap();
        events.field_value(Some("1 2.5 -3")).unwrap();
        events.start_field("rotation").unwrap();
        events.field_value(Some("0 1 0 1.5707")).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Shape", None).unwrap();
        events.start_field("appearance").unwrap();
        events.start_node("Appearance", None).unwrap();
        events.start_field("material").unwrap();
        events.start_node("Material", None).unwrap();
        events.start_field("diffuseColor").unwrap();
        events.field_value(Some("1 0 0")).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();
        events.start_field("geometry").unwrap();
        events.start_node("IndexedFaceSet", None).unwrap();
        events.start_field("coord").unwrap();
        events.start_node("Coordinate", Some("PTS")).unwrap();
        events.start_field("point").unwrap();
        events
            .field_value(Some("[ 0 0 0, 1 0 0, 1 1 0, 0 1 0 ]"))
            .unwrap();
        events.end_node().unwrap();
        events.start_field("coordIndex").unwrap();
        events.field_value(Some("[ 0 1 2 -1 0 2 3 -1 ]")).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();

        assert_round_trip(&events, &ExportOptions::default());
        assert_round_trip(&events, &canonical_options());
        assert_round_trip(
            &events,
            &ExportOptions {
                compression: CompressionProfile::SmallestNonlossy,
                ..ExportOptions::default()
            },
        );
    }

    #[test]
    fn test_round_trip_strings_and_empty_fields() {
        let mut events = EventBuffer::new();
        events.start_node("Group", None).unwrap();
        events.start_field("children").unwrap();
        events.start_node("WorldInfo", None).unwrap();
        events.start_field("title").unwrap();
        events.field_value(Some("\"demo \\\"scene\\\"\"")).unwrap();
        events.start_field("info").unwrap();
        events
            .field_value_list(&["line one".to_string(), "line two".to_string()])
            .unwrap();
        events.end_node().unwrap();
        events.start_node("Shape", None).unwrap();
        events.start_field("geometry").unwrap();
        events.field_value(Some("NULL")).unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();

        assert_round_trip(&events, &ExportOptions::default());
    }

    #[test]
    fn test_remove_defaults_elides_and_reconstructs() {
        let mut events = EventBuffer::new();
        events.start_node("Shape", None).unwrap();
        events.start_field("geometry").unwrap();
        events.start_node("Box", None).unwrap();
        // exactly the schema default, dropped from the wire
        events.start_field("size").unwrap();
        events.field_value(Some("2 2 2")).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();

        let options = ExportOptions {
            remove_defaults: true,
            ..ExportOptions::default()
        };
        let with_elision = encode(&events, &options);
        let without = encode(&events, &ExportOptions::default());
        assert!(with_elision.len() < without.len());

        assert_round_trip(&events, &options);
    }

    #[test]
    fn test_routes_round_trip() {
        let mut events = EventBuffer::new();
        events.start_node("Group", None).unwrap();
        events.start_field("children").unwrap();
        events.start_node("TimeSensor", Some("CLOCK")).unwrap();
        events.start_field("loop").unwrap();
        events.field_value(Some("TRUE")).unwrap();
        events.end_node().unwrap();
        events
            .start_node("OrientationInterpolator", Some("SPIN"))
            .unwrap();
        events.start_field("key").unwrap();
        events.field_value(Some("[ 0 1 ]")).unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();
        events
            .route("CLOCK", "fraction_changed", "SPIN", "set_fraction")
            .unwrap();

        assert_round_trip(&events, &ExportOptions::default());
    }

    #[test]
    fn test_proto_declarations_round_trip() {
        let mut events = EventBuffer::new();
        events.start_proto_decl("TwoBox").unwrap();
        events
            .proto_field_decl(
                FieldAccess::Field,
                FieldType::SFVec3f,
                "offset",
                Some("1 0 0"),
            )
            .unwrap();
        events
            .proto_field_decl(FieldAccess::EventIn, FieldType::SFBool, "set_visible", None)
            .unwrap();
        events.end_proto_decl().unwrap();
        events.start_node("Group", None).unwrap();
        events.start_field("children").unwrap();
        events.start_node("TwoBox", None).unwrap();
        events.start_field("offset").unwrap();
        events.field_value(Some("0 3 0")).unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();

        assert_round_trip(&events, &ExportOptions::default());
        assert_round_trip(&events, &canonical_options());
    }

    #[test]
    fn test_structural_violation_fails_fast() {
        let mut events = EventBuffer::new();
        events.field_value(Some("1")).unwrap();

        let mut out = Vec::new();
        assert!(matches!(
            export(&events, &mut out, &ExportOptions::default()),
            Err(ExportError::Structural { .. })
        ));
    }

    #[test]
    fn test_every_record_is_byte_aligned() {
        // widths chosen so op + operands never fill whole bytes
        let events = group_with_shape();
        let options = canonical_options();
        let bytes = encode(&events, &options);

        let mut decoded = EventBuffer::new();
        decode(&bytes, &mut decoded, &options).unwrap();
        // decoding consumed the stream exactly, which it can only do if
        // every record started on a byte boundary
        assert!(!decoded.is_empty());
    }
}
