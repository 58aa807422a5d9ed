//! Pass 1 of the binary encoding: a full traversal of the event stream that
//! assigns first-seen ordering to node-type names, DEF names, and per-type
//! field names, and gathers the aggregate counts the bit widths are sized
//! from. This pass never writes to the output stream.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use indexmap::{IndexMap, IndexSet};

use crate::error::{ExportError, ExportResult};
use crate::event::{EventBuffer, SceneHandler};
use crate::schema::{
    ExternProtoDef, FieldAccess, FieldDecl, FieldType, NodeKind, ProtoDef, SchemaSet,
};
use crate::values::FieldValue;

/// Bits needed to represent every value in `0..=max_value`.
///
/// `num_bits(0) == 0`: a field whose only value is zero is absent from the
/// stream entirely. Encoder and decoder must agree on this function exactly;
/// any divergence shifts every subsequent byte-alignment boundary.
pub fn num_bits(max_value: u32) -> u32 {
    32 - max_value.leading_zeros()
}

struct Frame {
    type_name: String,
    instance_fields: HashSet<String>,
}

struct ProtoBuilder {
    name: String,
    fields: Vec<FieldDecl>,
    raw_defaults: Vec<Option<String>>,
    uris: Vec<String>,
    is_extern: bool,
}

/// Everything the statistics pass observed, plus the schema set built from
/// the document's own prototype declarations.
pub struct SceneStatistics {
    schemas: SchemaSet,
    /// Node-type names in first-seen order (instances and proto
    /// declarations both claim a slot).
    node_types: IndexSet<String>,
    node_counts: IndexMap<String, u64>,
    def_names: IndexSet<String>,
    def_node_types: HashMap<String, String>,
    node_fields: IndexMap<String, IndexSet<String>>,
    total_nodes: u64,
    total_fields: u64,
    field_type_counts: [u64; FieldType::MAX_TAG as usize + 1],
    max_instance_fields: usize,

    frames: Vec<Frame>,
    current_proto: Option<ProtoBuilder>,
}

impl SceneStatistics {
    fn new() -> SceneStatistics {
        SceneStatistics {
            schemas: SchemaSet::new(),
            node_types: IndexSet::new(),
            node_counts: IndexMap::new(),
            def_names: IndexSet::new(),
            def_node_types: HashMap::new(),
            node_fields: IndexMap::new(),
            total_nodes: 0,
            total_fields: 0,
            field_type_counts: [0; FieldType::MAX_TAG as usize + 1],
            max_instance_fields: 0,
            frames: Vec::new(),
            current_proto: None,
        }
    }

    /// Run the statistics pass over a recorded document.
    pub fn collect(events: &EventBuffer) -> ExportResult<SceneStatistics> {
        let mut stats = SceneStatistics::new();
        events.replay(&mut stats)?;

        if !stats.frames.is_empty() {
            return Err(ExportError::Structural {
                event: "endDocument",
                depth: stats.frames.len(),
                message: "document ended with unclosed nodes".to_string(),
            });
        }

        Ok(stats)
    }

    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn node_types(&self) -> &IndexSet<String> {
        &self.node_types
    }

    pub fn def_names(&self) -> &IndexSet<String> {
        &self.def_names
    }

    pub fn node_fields(&self) -> &IndexMap<String, IndexSet<String>> {
        &self.node_fields
    }

    pub fn def_node_type(&self, def_name: &str) -> Option<&str> {
        self.def_node_types.get(def_name).map(String::as_str)
    }

    pub fn total_node_count(&self) -> u64 {
        self.total_nodes
    }

    pub fn total_field_count(&self) -> u64 {
        self.total_fields
    }

    /// Maximum number of distinct fields used on any single node instance.
    pub fn max_instance_field_count(&self) -> usize {
        self.max_instance_fields
    }

    /// Size of the largest per-type field dictionary. Field ids are offset
    /// by one on the wire, so this is also the largest field id that can
    /// occur.
    pub fn largest_field_dict(&self) -> usize {
        self.node_fields
            .values()
            .map(IndexSet::len)
            .max()
            .unwrap_or(0)
    }

    fn resolve(&self, name: &str) -> ExportResult<NodeKind> {
        self.schemas
            .resolve(name)
            .ok_or_else(|| ExportError::UnknownNode(name.to_string()))
    }

    fn record_route_field(&mut self, def_name: &str, field_name: &str) -> ExportResult<()> {
        let type_name = self
            .def_node_types
            .get(def_name)
            .ok_or_else(|| ExportError::UnknownDef(def_name.to_string()))?
            .clone();

        let kind = self.resolve(&type_name)?;
        if kind.field_declaration(field_name).is_none() {
            return Err(ExportError::UnknownField {
                node: type_name,
                field: field_name.to_string(),
            });
        }

        self.node_fields
            .entry(type_name)
            .or_default()
            .insert(field_name.to_string());

        Ok(())
    }

    /// A human-readable summary of the collected statistics.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total node count: {}", self.total_nodes);
        let _ = writeln!(out, "Total field count: {}", self.total_fields);
        let _ = writeln!(out, "Node type count: {}", self.node_counts.len());
        let _ = writeln!(
            out,
            "Prototype count: {}",
            self.schemas.proto_count() + self.schemas.extern_count()
        );
        let _ = writeln!(out, "DEFed nodes: {}", self.def_names.len());
        let _ = writeln!(
            out,
            "Maximum fields on one instance: {}",
            self.max_instance_fields
        );

        let mut by_count: Vec<(&String, &u64)> = self.node_counts.iter().collect();
        by_count.sort_by(|a, b| b.1.cmp(a.1));
        for (name, count) in by_count {
            let _ = writeln!(out, "{:8} {}", count, name);
        }

        for tag in 1..=FieldType::MAX_TAG {
            let count = self.field_type_counts[tag as usize];
            if count > 0 {
                let ty = FieldType::try_from(tag).expect("tag in range");
                let _ = writeln!(out, "{}: {}", ty, count);
            }
        }

        out
    }
}

impl SceneHandler for SceneStatistics {
    fn start_node(&mut self, name: &str, def_name: Option<&str>) -> ExportResult<()> {
        // fails early when neither the vocabulary nor a declared proto
        // knows this type
        self.resolve(name)?;

        self.node_types.insert(name.to_string());
        *self.node_counts.entry(name.to_string()).or_insert(0) += 1;
        self.node_fields.entry(name.to_string()).or_default();
        self.total_nodes += 1;

        if let Some(def_name) = def_name {
            // a repeated DEF keeps its first id; disambiguation is the
            // upstream pass's job
            if self.def_names.insert(def_name.to_string()) {
                self.def_node_types
                    .insert(def_name.to_string(), name.to_string());
            }
        }

        self.frames.push(Frame {
            type_name: name.to_string(),
            instance_fields: HashSet::new(),
        });

        Ok(())
    }

    fn end_node(&mut self) -> ExportResult<()> {
        let frame = self.frames.pop().ok_or(ExportError::Structural {
            event: "endNode",
            depth: 0,
            message: "no node open".to_string(),
        })?;

        if frame.instance_fields.len() > self.max_instance_fields {
            self.max_instance_fields = frame.instance_fields.len();
        }

        Ok(())
    }

    fn start_field(&mut self, name: &str) -> ExportResult<()> {
        self.total_fields += 1;

        let frame = self.frames.last_mut().ok_or(ExportError::Structural {
            event: "startField",
            depth: 0,
            message: format!("field '{}' outside any node", name),
        })?;
        frame.instance_fields.insert(name.to_string());
        let type_name = frame.type_name.clone();

        let kind = self.resolve(&type_name)?;
        let decl = kind
            .field_declaration(name)
            .ok_or_else(|| ExportError::UnknownField {
                node: type_name.clone(),
                field: name.to_string(),
            })?;
        self.field_type_counts[u8::from(decl.field_type) as usize] += 1;

        self.node_fields
            .entry(type_name)
            .or_default()
            .insert(name.to_string());

        Ok(())
    }

    fn use_ref(&mut self, def_name: &str) -> ExportResult<()> {
        if !self.def_names.contains(def_name) {
            return Err(ExportError::UnknownDef(def_name.to_string()));
        }

        Ok(())
    }

    fn start_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        // a proto type claims a node-number slot whether or not the
        // document instantiates it
        self.node_types.insert(name.to_string());
        self.current_proto = Some(ProtoBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            raw_defaults: Vec::new(),
            uris: Vec::new(),
            is_extern: false,
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
        let builder = self.current_proto.as_mut().ok_or(ExportError::Structural {
            event: "protoFieldDecl",
            depth: 0,
            message: format!("field '{}' outside a proto declaration", name),
        })?;

        let mut decl = FieldDecl::new(access, field_type, name);
        if let Some(raw) = default {
            if !field_type.is_node() {
                decl.default = Some(FieldValue::parse(field_type, raw)?);
            }
        }
        builder.fields.push(decl);
        builder.raw_defaults.push(default.map(str::to_string));

        Ok(())
    }

    fn end_proto_decl(&mut self) -> ExportResult<()> {
        let builder = self.current_proto.take().ok_or(ExportError::Structural {
            event: "endProtoDecl",
            depth: 0,
            message: "no proto declaration open".to_string(),
        })?;

        self.schemas.add_proto(ProtoDef {
            name: builder.name,
            fields: builder.fields,
            raw_defaults: builder.raw_defaults,
        });

        Ok(())
    }

    fn start_extern_proto_decl(&mut self, name: &str) -> ExportResult<()> {
        self.node_types.insert(name.to_string());
        self.current_proto = Some(ProtoBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            raw_defaults: Vec::new(),
            uris: Vec::new(),
            is_extern: true,
        });

        Ok(())
    }

    fn extern_proto_uri(&mut self, uris: &[String]) -> ExportResult<()> {
        if let Some(builder) = self.current_proto.as_mut() {
            builder.uris = uris.to_vec();
        }

        Ok(())
    }

    fn end_extern_proto_decl(&mut self) -> ExportResult<()> {
        let builder = self.current_proto.take().ok_or(ExportError::Structural {
            event: "endExternProtoDecl",
            depth: 0,
            message: "no externproto declaration open".to_string(),
        })?;

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
        // route endpoints must be representable in the field dictionaries
        self.record_route_field(src_def, src_field)?;
        self.record_route_field(dest_def, dest_field)?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventBuffer;

    fn scene() -> EventBuffer {
        let mut events = EventBuffer::new();
        events.start_node("Transform", Some("ROOT")).unwrap();
        events.start_field("translation").unwrap();
        events.field_value(Some("1 2 3")).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Shape", None).unwrap();
        events.start_field("geometry").unwrap();
        events.start_node("Box", Some("B")).unwrap();
        events.start_field("size").unwrap();
        events.field_value(Some("1 1 1")).unwrap();
        events.end_node().unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();
        events
    }

    #[test]
    fn test_num_bits() {
        assert_eq!(num_bits(0), 0);
        assert_eq!(num_bits(1), 1);
        assert_eq!(num_bits(2), 2);
        assert_eq!(num_bits(7), 3);
        assert_eq!(num_bits(8), 4);
        assert_eq!(num_bits(101), 7);
        assert_eq!(num_bits(u32::MAX), 32);

        // numBits(2^k - 1) == k and numBits(2^k) == k + 1
        for k in 1..31 {
            assert_eq!(num_bits((1u32 << k) - 1), k);
            assert_eq!(num_bits(1u32 << k), k + 1);
        }

        // monotonic over a dense prefix
        for v in 1..4096u32 {
            assert!(num_bits(v) >= num_bits(v - 1));
        }
    }

    #[test]
    fn test_first_seen_order() {
        let stats = SceneStatistics::collect(&scene()).unwrap();

        let types: Vec<&str> = stats.node_types().iter().map(String::as_str).collect();
        assert_eq!(types, ["Transform", "Shape", "Box"]);

        let transform_fields: Vec<&str> = stats.node_fields()["Transform"]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(transform_fields, ["translation", "children"]);

        let defs: Vec<&str> = stats.def_names().iter().map(String::as_str).collect();
        assert_eq!(defs, ["ROOT", "B"]);
    }

    #[test]
    fn test_statistics_are_deterministic() {
        let events = scene();
        let first = SceneStatistics::collect(&events).unwrap();
        let second = SceneStatistics::collect(&events).unwrap();

        assert_eq!(first.node_types(), second.node_types());
        assert_eq!(first.def_names(), second.def_names());
        assert_eq!(first.node_fields(), second.node_fields());
    }

    #[test]
    fn test_instance_field_counts() {
        let stats = SceneStatistics::collect(&scene()).unwrap();
        assert_eq!(stats.total_node_count(), 3);
        assert_eq!(stats.total_field_count(), 4);
        assert_eq!(stats.max_instance_field_count(), 2);
        assert_eq!(stats.largest_field_dict(), 2);
    }

    #[test]
    fn test_unknown_field_fails_fast() {
        let mut events = EventBuffer::new();
        events.start_node("Box", None).unwrap();
        events.start_field("notAField").unwrap();
        events.field_value(Some("1")).unwrap();
        events.end_node().unwrap();

        assert!(matches!(
            SceneStatistics::collect(&events),
            Err(ExportError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_route_fields_enter_dictionary() {
        let mut events = EventBuffer::new();
        events.start_node("Group", None).unwrap();
        events.start_field("children").unwrap();
        events.start_node("TimeSensor", Some("CLOCK")).unwrap();
        events.end_node().unwrap();
        events.start_node("Transform", Some("T")).unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();
        events
            .route("CLOCK", "fraction_changed", "T", "rotation")
            .unwrap();

        let stats = SceneStatistics::collect(&events).unwrap();
        assert!(stats.node_fields()["TimeSensor"].contains("fraction_changed"));
        assert!(stats.node_fields()["Transform"].contains("rotation"));
    }
}
