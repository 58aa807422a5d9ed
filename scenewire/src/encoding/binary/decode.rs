//! Reads a binary stream back into the event protocol.
//!
//! The reader rebuilds the dictionaries from the header, resolves field
//! types against the same schema source the writer used (built-in
//! vocabulary plus the header's proto declaration tables), and drives a
//! [`SceneHandler`] with the reconstructed events.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::super::compress::CodecRegistry;
use super::super::dict::{
    Dictionaries, DictionaryMode, FORMAT_VERSION_CANONICAL, FORMAT_VERSION_CONTENT,
    NODE_ID_BASE, NODE_ID_DYNAMIC, NODE_ID_END_FIELDS,
};
use super::super::ByteReader;
use super::{FIELD_METHOD_BITS, OP_BITS, OP_COMMENT, OP_NODE, OP_ROUTE, OP_USE};
use crate::encoding::bits::BitUnpacker;
use crate::error::{DecodeError, DecodeResult};
use crate::event::SceneHandler;
use crate::options::ExportOptions;
use crate::schema::{
    canonical_max, ExternProtoDef, FieldAccess, FieldDecl, FieldType, ProtoDef, SchemaSet,
    CANONICAL_NUMBERS,
};
use crate::values::FieldValue;

/// Nodes deeper than this indicate a corrupt or hostile stream.
const MAX_DEPTH: usize = 512;

/// Decode a binary stream, pushing events into `handler`. The strategy set
/// is derived from the options' compression profile and must cover every
/// (type, method) pair the stream uses.
pub fn decode<H: SceneHandler>(
    data: &[u8],
    handler: &mut H,
    options: &ExportOptions,
) -> DecodeResult<()> {
    let registry =
        CodecRegistry::for_profile(options.compression, options.quantize_tolerance);
    decode_with(data, handler, &registry)
}

pub fn decode_with<H: SceneHandler>(
    data: &[u8],
    handler: &mut H,
    registry: &CodecRegistry,
) -> DecodeResult<()> {
    let mut reader = ByteReader::new(data);
    let (dicts, schemas) = read_header(&mut reader, handler)?;

    let mut body = BodyDecoder {
        reader,
        dicts,
        schemas,
        registry,
        handler,
        depth: 0,
    };
    body.run()
}

fn read_header<H: SceneHandler>(
    reader: &mut ByteReader<'_>,
    handler: &mut H,
) -> DecodeResult<(Dictionaries, SchemaSet)> {
    let version = reader.read_u8()?;
    let mode = match version {
        FORMAT_VERSION_CONTENT => DictionaryMode::FromContent,
        FORMAT_VERSION_CANONICAL => DictionaryMode::Canonical,
        other => {
            return Err(DecodeError::at(
                0,
                format!("unsupported format version {}", other),
            ))
        }
    };

    let node_num_bits = reader.read_u8()? as u32;
    let def_num_bits = reader.read_u8()? as u32;
    let field_num_bits = reader.read_u8()? as u32;

    let mut node_ids: IndexMap<String, u32> = IndexMap::new();
    let mut next_dynamic = match mode {
        DictionaryMode::FromContent => NODE_ID_BASE,
        DictionaryMode::Canonical => {
            for (name, number) in CANONICAL_NUMBERS {
                node_ids.insert((*name).to_string(), *number);
            }
            canonical_max() + 1
        }
    };
    let dynamic_count = read_count(reader, "node dictionary")?;
    for _ in 0..dynamic_count {
        let name = reader.read_utf()?;
        node_ids.insert(name, next_dynamic);
        next_dynamic += 1;
    }

    let mut def_ids = IndexMap::new();
    let def_count = read_count(reader, "DEF dictionary")?;
    for index in 0..def_count {
        let name = reader.read_utf()?;
        def_ids.insert(name, index as u32 + 1);
    }

    let mut fields_by_node: HashMap<u32, IndexSet<String>> = HashMap::new();
    let field_entry_count = read_count(reader, "field dictionary")?;
    for index in 0..field_entry_count {
        let node_id = match mode {
            DictionaryMode::FromContent => NODE_ID_BASE + index as u32,
            DictionaryMode::Canonical => reader.read_u16()? as u32,
        };
        let field_count = reader.read_u8()? as usize;
        let mut fields = IndexSet::new();
        for _ in 0..field_count {
            fields.insert(reader.read_utf()?);
        }
        fields_by_node.insert(node_id, fields);
    }

    let schemas = read_proto_tables(reader, handler)?;

    Ok((
        Dictionaries::from_wire(
            mode,
            node_num_bits,
            def_num_bits,
            field_num_bits,
            node_ids,
            def_ids,
            fields_by_node,
        ),
        schemas,
    ))
}

fn read_count(reader: &mut ByteReader<'_>, what: &str) -> DecodeResult<usize> {
    let offset = reader.offset();
    let count = reader.read_i32()?;
    usize::try_from(count)
        .map_err(|_| DecodeError::at(offset, format!("negative {} count", what)))
}

fn read_field_decl(
    reader: &mut ByteReader<'_>,
    with_default: bool,
) -> DecodeResult<(FieldDecl, Option<String>)> {
    let offset = reader.offset();
    let access = FieldAccess::from_code(reader.read_u8()?)
        .ok_or_else(|| DecodeError::at(offset, "invalid field access code"))?;
    let tag = reader.read_u8()?;
    let field_type = FieldType::try_from(tag)
        .map_err(|_| DecodeError::at(offset, format!("invalid field type tag {}", tag)))?;
    let name = reader.read_utf()?;

    let mut decl = FieldDecl::new(access, field_type, &name);
    let mut raw_default = None;
    if with_default && reader.read_u8()? != 0 {
        let raw = reader.read_utf()?;
        if !field_type.is_node() {
            decl.default = Some(
                FieldValue::parse(field_type, &raw)
                    .map_err(|err| DecodeError::at(offset, err.to_string()))?,
            );
        }
        raw_default = Some(raw);
    }

    Ok((decl, raw_default))
}

fn read_proto_tables<H: SceneHandler>(
    reader: &mut ByteReader<'_>,
    handler: &mut H,
) -> DecodeResult<SchemaSet> {
    let mut schemas = SchemaSet::new();

    let proto_count = reader.read_u16()? as usize;
    for _ in 0..proto_count {
        let name = reader.read_utf()?;
        handler.start_proto_decl(&name)?;

        let field_count = reader.read_u8()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        let mut raw_defaults = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let (decl, raw_default) = read_field_decl(reader, true)?;
            handler.proto_field_decl(
                decl.access,
                decl.field_type,
                &decl.name,
                raw_default.as_deref(),
            )?;
            fields.push(decl);
            raw_defaults.push(raw_default);
        }
        handler.end_proto_decl()?;

        schemas.add_proto(ProtoDef {
            name,
            fields,
            raw_defaults,
        });
    }

    let extern_count = reader.read_u16()? as usize;
    for _ in 0..extern_count {
        let name = reader.read_utf()?;
        handler.start_extern_proto_decl(&name)?;

        let field_count = reader.read_u8()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let (decl, _) = read_field_decl(reader, false)?;
            handler.proto_field_decl(decl.access, decl.field_type, &decl.name, None)?;
            fields.push(decl);
        }

        let uri_count = reader.read_u16()? as usize;
        let mut uris = Vec::with_capacity(uri_count);
        for _ in 0..uri_count {
            uris.push(reader.read_utf()?);
        }
        handler.extern_proto_uri(&uris)?;
        handler.end_extern_proto_decl()?;

        schemas.add_extern(ExternProtoDef { name, fields, uris });
    }

    Ok(schemas)
}

enum NodeRecord {
    Node { node_id: u32, def_id: u32 },
    Use { def_id: u32 },
    ListEnd,
}

struct BodyDecoder<'a, H: SceneHandler> {
    reader: ByteReader<'a>,
    dicts: Dictionaries,
    schemas: SchemaSet,
    registry: &'a CodecRegistry,
    handler: &'a mut H,
    depth: usize,
}

impl<'a, H: SceneHandler> BodyDecoder<'a, H> {
    fn run(&mut self) -> DecodeResult<()> {
        while let Some(first) = self.reader.peek_u8() {
            match (first >> 6) as u64 {
                OP_ROUTE => self.decode_route()?,
                OP_COMMENT => self.skip_comment()?,
                _ => match self.read_node_record()? {
                    NodeRecord::Node { node_id, def_id } => {
                        self.decode_node(node_id, def_id)?;
                    }
                    NodeRecord::Use { def_id } => {
                        let def_name = self.def_name(def_id)?.to_string();
                        self.handler.use_ref(&def_name)?;
                    }
                    NodeRecord::ListEnd => {
                        return Err(DecodeError::at(
                            self.reader.offset(),
                            "list terminator outside a child list",
                        ))
                    }
                },
            }
        }

        Ok(())
    }

    /// Reserved OP_COMMENT record: length(14 bits) + raw bytes, skipped.
    fn skip_comment(&mut self) -> DecodeResult<()> {
        let first = self.reader.read_u8()?;
        let second = self.reader.read_u8()?;
        let len = (((first & 0x3f) as usize) << 8) | second as usize;
        self.reader.take(len)?;

        Ok(())
    }

    /// Read one node-position record: OP_NODE, OP_USE, or the zero list
    /// terminator. Routes and comments never appear in node position.
    fn read_node_record(&mut self) -> DecodeResult<NodeRecord> {
        let offset = self.reader.offset();
        let first = self.reader.read_u8()?;
        let opcode = (first >> 6) as u64;

        match opcode {
            OP_NODE => {
                let rest = self.reader.take(self.dicts.node_op_bytes - 1)?;
                let mut record = Vec::with_capacity(self.dicts.node_op_bytes);
                record.push(first);
                record.extend_from_slice(rest);
                let mut bits = BitUnpacker::new(&record);
                bits.unpack(OP_BITS)?;
                let node_id = bits.unpack(self.dicts.node_num_bits)? as u32;
                let def_id = bits.unpack(self.dicts.def_num_bits)? as u32;
                if node_id == NODE_ID_END_FIELDS {
                    return Ok(NodeRecord::ListEnd);
                }
                Ok(NodeRecord::Node { node_id, def_id })
            }
            OP_USE => {
                let rest = self.reader.take(self.dicts.use_op_bytes - 1)?;
                let mut record = Vec::with_capacity(self.dicts.use_op_bytes);
                record.push(first);
                record.extend_from_slice(rest);
                let mut bits = BitUnpacker::new(&record);
                bits.unpack(OP_BITS)?;
                let def_id = bits.unpack(self.dicts.def_num_bits)? as u32;
                Ok(NodeRecord::Use { def_id })
            }
            _ => Err(DecodeError::at(
                offset,
                format!("unexpected opcode {} in node position", opcode),
            )),
        }
    }

    fn decode_route(&mut self) -> DecodeResult<()> {
        let offset = self.reader.offset();
        let record = self.reader.take(self.dicts.route_op_bytes)?;
        let mut bits = BitUnpacker::new(record);
        bits.unpack(OP_BITS)?;
        let src_def = bits.unpack(self.dicts.def_num_bits)? as u32;
        let src_field = bits.unpack(self.dicts.field_num_bits)? as u32;
        let dest_def = bits.unpack(self.dicts.def_num_bits)? as u32;
        let dest_field = bits.unpack(self.dicts.field_num_bits)? as u32;

        let src_def_name = self.def_name(src_def)?.to_string();
        let dest_def_name = self.def_name(dest_def)?.to_string();
        let src_field_name = self.route_field_name(src_def, src_field, offset)?;
        let dest_field_name = self.route_field_name(dest_def, dest_field, offset)?;

        self.handler
            .route(&src_def_name, &src_field_name, &dest_def_name, &dest_field_name)?;

        Ok(())
    }

    fn route_field_name(
        &self,
        def_id: u32,
        field_wire_id: u32,
        offset: usize,
    ) -> DecodeResult<String> {
        let node_id = self
            .dicts
            .def_node_id(def_id)
            .ok_or_else(|| DecodeError::at(offset, "route references an unknown DEF"))?;
        let field_id = field_wire_id
            .checked_sub(1)
            .ok_or_else(|| DecodeError::at(offset, "route references field id 0"))?;
        self.dicts
            .field_name(node_id, field_id)
            .map(str::to_string)
            .ok_or_else(|| DecodeError::at(offset, "route references an unknown field"))
    }

    fn def_name(&self, def_id: u32) -> DecodeResult<&str> {
        self.dicts.def_name(def_id).ok_or_else(|| {
            DecodeError::at(
                self.reader.offset(),
                format!("DEF index {} out of range", def_id),
            )
        })
    }

    fn decode_node(&mut self, node_id: u32, def_id: u32) -> DecodeResult<()> {
        if node_id == NODE_ID_DYNAMIC {
            return Err(DecodeError::at(
                self.reader.offset(),
                "dynamic (script) nodes carry their own format",
            ));
        }
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::at(self.reader.offset(), "node tree too deep"));
        }

        let name = self
            .dicts
            .node_name(node_id)
            .ok_or_else(|| {
                DecodeError::at(
                    self.reader.offset(),
                    format!("node number {} out of range", node_id),
                )
            })?
            .to_string();
        let kind = self.schemas.resolve(&name).ok_or_else(|| {
            DecodeError::at(
                self.reader.offset(),
                format!("no schema for node type '{}'", name),
            )
        })?;

        let def_name = match def_id {
            0 => None,
            id => Some(self.def_name(id)?.to_string()),
        };
        if def_id != 0 {
            self.dicts.record_def_node(def_id, node_id);
        }

        self.handler.start_node(&name, def_name.as_deref())?;

        loop {
            let offset = self.reader.offset();
            let record = self.reader.take(self.dicts.field_op_bytes)?;
            let mut bits = BitUnpacker::new(record);
            let field_wire_id = bits.unpack(self.dicts.field_num_bits)? as u32;
            let method = bits.unpack(FIELD_METHOD_BITS)? as u8;

            if field_wire_id == 0 {
                break;
            }

            let field_name = self
                .dicts
                .field_name(node_id, field_wire_id - 1)
                .ok_or_else(|| {
                    DecodeError::at(
                        offset,
                        format!("field id {} out of range for '{}'", field_wire_id, name),
                    )
                })?
                .to_string();
            let decl = kind.field_declaration(&field_name).ok_or_else(|| {
                DecodeError::at(
                    offset,
                    format!("no declaration for '{}' on '{}'", field_name, name),
                )
            })?;
            let field_type = decl.field_type;

            self.handler.start_field(&field_name)?;

            match field_type {
                FieldType::SFNode => match self.read_node_record()? {
                    NodeRecord::Node { node_id, def_id } => self.decode_node(node_id, def_id)?,
                    NodeRecord::Use { def_id } => {
                        let def_name = self.def_name(def_id)?.to_string();
                        self.handler.use_ref(&def_name)?;
                    }
                    NodeRecord::ListEnd => self.handler.field_value(None)?,
                },
                FieldType::MFNode => {
                    loop {
                        match self.read_node_record()? {
                            NodeRecord::Node { node_id, def_id } => {
                                self.decode_node(node_id, def_id)?
                            }
                            NodeRecord::Use { def_id } => {
                                let def_name = self.def_name(def_id)?.to_string();
                                self.handler.use_ref(&def_name)?;
                            }
                            NodeRecord::ListEnd => break,
                        }
                    }
                    self.handler.end_field()?;
                }
                _ => {
                    let value = self
                        .registry
                        .decode_field(field_type, method, &mut self.reader)?;
                    self.handler
                        .field_value(Some(&value.to_classic(field_type)))?;
                }
            }
        }

        self.handler.end_node()?;
        self.depth -= 1;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::binary::export;
    use crate::event::{Event, EventBuffer};

    #[test]
    fn test_truncated_stream_is_rejected() {
        let mut events = EventBuffer::new();
        events.start_node("Group", None).unwrap();
        events.end_node().unwrap();

        let mut bytes = Vec::new();
        export(&events, &mut bytes, &ExportOptions::default()).unwrap();
        bytes.truncate(bytes.len() - 1);

        let mut decoded = EventBuffer::new();
        assert!(decode(&bytes, &mut decoded, &ExportOptions::default()).is_err());
    }

    #[test]
    fn test_bad_version_is_rejected() {
        let mut decoded = EventBuffer::new();
        let err = decode(&[0x09, 1, 1, 1], &mut decoded, &ExportOptions::default());
        assert!(matches!(err, Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_decoded_events_are_well_formed() {
        let mut events = EventBuffer::new();
        events.start_node("Transform", Some("T")).unwrap();
        events.start_field("scale").unwrap();
        events.field_value(Some("2 2 2")).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Shape", None).unwrap();
        events.start_field("geometry").unwrap();
        events.start_node("Sphere", None).unwrap();
        events.start_field("radius").unwrap();
        events.field_value(Some("0.5")).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();
        events.use_ref("T").unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();

        let mut bytes = Vec::new();
        export(&events, &mut bytes, &ExportOptions::default()).unwrap();

        let mut decoded = EventBuffer::new();
        decode(&bytes, &mut decoded, &ExportOptions::default()).unwrap();

        let mut depth = 0i32;
        for event in decoded.events() {
            match event {
                Event::StartNode { .. } => depth += 1,
                Event::EndNode => {
                    depth -= 1;
                    assert!(depth >= 0);
                }
                _ => {}
            }
        }
        assert_eq!(depth, 0);
        assert!(decoded
            .events()
            .iter()
            .any(|e| matches!(e, Event::UseRef { def_name } if def_name == "T")));
    }
}
