//! Frozen dictionary tables for one export session.
//!
//! Pass 1 ([`SceneStatistics`]) observes the document; [`Dictionaries::build`]
//! turns its first-seen orderings into immutable id tables and the bit
//! widths every body record is sized with. The binary writer holds the
//! result by reference for its whole lifetime.

use std::collections::HashMap;
use std::io::{self, Write};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::stats::{num_bits, SceneStatistics};
use super::write_utf;
use crate::error::{ExportError, ExportResult};
use crate::schema::{canonical_max, canonical_number, SchemaSet};

/// Reserved node numbers. 0 terminates field lists and MFNode child lists;
/// 1 marks dynamic (script) nodes, which carry their own format.
pub const NODE_ID_END_FIELDS: u32 = 0;
pub const NODE_ID_DYNAMIC: u32 = 1;
pub const NODE_ID_BASE: u32 = 2;

pub const FORMAT_VERSION_CONTENT: u8 = 1;
pub const FORMAT_VERSION_CANONICAL: u8 = 2;

/// How node numbers are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DictionaryMode {
    /// Dense first-seen ids starting at 2; every name is carried in the
    /// stream header.
    #[default]
    #[serde(rename = "fromContent")]
    FromContent,
    /// Ids from the baked canonical table; only names beyond it are carried
    /// in the header.
    #[serde(rename = "canonical")]
    Canonical,
}

/// Number of whole bytes a packed record of `bits` bits occupies.
pub fn bytes_for(bits: u32) -> usize {
    ((bits + 7) / 8) as usize
}

#[derive(Debug)]
pub struct Dictionaries {
    mode: DictionaryMode,

    node_ids: IndexMap<String, u32>,
    node_by_id: HashMap<u32, String>,
    /// Names serialized in the header, in id order. All of them under
    /// `FromContent`; only beyond-canonical names under `Canonical`.
    dynamic_names: Vec<String>,

    def_ids: IndexMap<String, u32>,
    /// DEF id of a node → node id, for resolving ROUTE endpoints.
    def_node_ids: HashMap<u32, u32>,

    fields_by_node: HashMap<u32, IndexSet<String>>,

    pub node_num_bits: u32,
    pub def_num_bits: u32,
    pub field_num_bits: u32,

    pub node_op_bytes: usize,
    pub use_op_bytes: usize,
    pub field_op_bytes: usize,
    pub route_op_bytes: usize,
}

impl Dictionaries {
    /// Freeze the statistics pass into id tables and bit widths.
    pub fn build(stats: &SceneStatistics, mode: DictionaryMode) -> ExportResult<Dictionaries> {
        let mut node_ids = IndexMap::new();
        let mut dynamic_names = Vec::new();
        let mut max_node_id = match mode {
            DictionaryMode::FromContent => NODE_ID_DYNAMIC,
            // the whole canonical range is addressable whether or not the
            // document uses it
            DictionaryMode::Canonical => canonical_max(),
        };

        let mut next_dynamic = match mode {
            DictionaryMode::FromContent => NODE_ID_BASE,
            DictionaryMode::Canonical => canonical_max() + 1,
        };
        for name in stats.node_types() {
            let id = match mode {
                DictionaryMode::Canonical => canonical_number(name).unwrap_or_else(|| {
                    let id = next_dynamic;
                    next_dynamic += 1;
                    dynamic_names.push(name.clone());
                    id
                }),
                DictionaryMode::FromContent => {
                    let id = next_dynamic;
                    next_dynamic += 1;
                    dynamic_names.push(name.clone());
                    id
                }
            };
            node_ids.insert(name.clone(), id);
            if id > max_node_id {
                max_node_id = id;
            }
        }

        let mut def_ids = IndexMap::new();
        let mut def_node_ids = HashMap::new();
        for (index, def_name) in stats.def_names().iter().enumerate() {
            let def_id = index as u32 + 1;
            def_ids.insert(def_name.clone(), def_id);
            if let Some(type_name) = stats.def_node_type(def_name) {
                if let Some(node_id) = node_ids.get(type_name) {
                    def_node_ids.insert(def_id, *node_id);
                }
            }
        }

        let mut fields_by_node = HashMap::new();
        for (type_name, fields) in stats.node_fields() {
            let node_id = *node_ids
                .get(type_name)
                .expect("field table references unknown node type");
            fields_by_node.insert(node_id, fields.clone());
        }

        let node_num_bits = num_bits(max_node_id);
        let def_num_bits = num_bits(def_ids.len() as u32);
        // +1 leaves id 0 free as the end-of-fields marker
        let field_num_bits = num_bits(1 + stats.largest_field_dict() as u32);

        Ok(Dictionaries {
            mode,
            node_ids,
            node_by_id: HashMap::new(),
            dynamic_names,
            def_ids,
            def_node_ids,
            fields_by_node,
            node_num_bits,
            def_num_bits,
            field_num_bits,
            node_op_bytes: bytes_for(2 + node_num_bits + def_num_bits),
            use_op_bytes: bytes_for(2 + def_num_bits),
            field_op_bytes: bytes_for(field_num_bits + 3),
            route_op_bytes: bytes_for(2 + 2 * def_num_bits + 2 * field_num_bits),
        }
        .index_by_id())
    }

    /// Reassemble dictionaries from decoded header data.
    pub fn from_wire(
        mode: DictionaryMode,
        node_num_bits: u32,
        def_num_bits: u32,
        field_num_bits: u32,
        node_ids: IndexMap<String, u32>,
        def_ids: IndexMap<String, u32>,
        fields_by_node: HashMap<u32, IndexSet<String>>,
    ) -> Dictionaries {
        let dynamic_names = Vec::new();
        Dictionaries {
            mode,
            node_ids,
            node_by_id: HashMap::new(),
            dynamic_names,
            def_ids,
            def_node_ids: HashMap::new(),
            fields_by_node,
            node_num_bits,
            def_num_bits,
            field_num_bits,
            node_op_bytes: bytes_for(2 + node_num_bits + def_num_bits),
            use_op_bytes: bytes_for(2 + def_num_bits),
            field_op_bytes: bytes_for(field_num_bits + 3),
            route_op_bytes: bytes_for(2 + 2 * def_num_bits + 2 * field_num_bits),
        }
        .index_by_id()
    }

    fn index_by_id(mut self) -> Dictionaries {
        self.node_by_id = self
            .node_ids
            .iter()
            .map(|(name, id)| (*id, name.clone()))
            .collect();
        self
    }

    pub fn mode(&self) -> DictionaryMode {
        self.mode
    }

    pub fn format_version(&self) -> u8 {
        match self.mode {
            DictionaryMode::FromContent => FORMAT_VERSION_CONTENT,
            DictionaryMode::Canonical => FORMAT_VERSION_CANONICAL,
        }
    }

    pub fn node_id(&self, name: &str) -> Option<u32> {
        self.node_ids.get(name).copied()
    }

    pub fn node_name(&self, id: u32) -> Option<&str> {
        self.node_by_id.get(&id).map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn def_id(&self, name: &str) -> Option<u32> {
        self.def_ids.get(name).copied()
    }

    pub fn def_name(&self, id: u32) -> Option<&str> {
        self.def_ids
            .get_index(id.checked_sub(1)? as usize)
            .map(|(name, _)| name.as_str())
    }

    pub fn def_count(&self) -> usize {
        self.def_ids.len()
    }

    /// Node id of the node a DEF names (route endpoint resolution).
    pub fn def_node_id(&self, def_id: u32) -> Option<u32> {
        self.def_node_ids.get(&def_id).copied()
    }

    pub fn record_def_node(&mut self, def_id: u32, node_id: u32) {
        self.def_node_ids.insert(def_id, node_id);
    }

    /// Dictionary-local (0-based) field id; the wire offsets this by one.
    pub fn field_id(&self, node_id: u32, field_name: &str) -> Option<u32> {
        self.fields_by_node
            .get(&node_id)?
            .get_index_of(field_name)
            .map(|index| index as u32)
    }

    pub fn field_name(&self, node_id: u32, field_id: u32) -> Option<&str> {
        self.fields_by_node
            .get(&node_id)?
            .get_index(field_id as usize)
            .map(String::as_str)
    }

    /// Serialize the header: format version, bit widths, the three
    /// dictionaries, then the auxiliary proto declaration tables.
    pub fn write_header<W: Write>(&self, w: &mut W, schemas: &SchemaSet) -> ExportResult<()> {
        w.write_all(&[
            self.format_version(),
            self.node_num_bits as u8,
            self.def_num_bits as u8,
            self.field_num_bits as u8,
        ])?;

        w.write_all(&(self.dynamic_names.len() as i32).to_be_bytes())?;
        for name in &self.dynamic_names {
            write_utf(w, name)?;
        }

        w.write_all(&(self.def_ids.len() as i32).to_be_bytes())?;
        for name in self.def_ids.keys() {
            write_utf(w, name)?;
        }

        w.write_all(&(self.node_ids.len() as i32).to_be_bytes())?;
        for (name, id) in &self.node_ids {
            if self.mode == DictionaryMode::Canonical {
                // canonical ids are sparse, so entries carry their id
                w.write_all(&(*id as u16).to_be_bytes())?;
            }
            let fields = self.fields_by_node.get(id);
            let count = fields.map(IndexSet::len).unwrap_or(0);
            if count > u8::MAX as usize {
                return Err(ExportError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("node type '{}' uses {} fields", name, count),
                )));
            }
            w.write_all(&[count as u8])?;
            if let Some(fields) = fields {
                for field in fields {
                    write_utf(w, field)?;
                }
            }
        }

        self.write_proto_tables(w, schemas)?;

        Ok(())
    }

    fn write_proto_tables<W: Write>(&self, w: &mut W, schemas: &SchemaSet) -> ExportResult<()> {
        w.write_all(&(schemas.proto_count() as u16).to_be_bytes())?;
        for proto in schemas.protos() {
            write_utf(w, &proto.name)?;
            w.write_all(&[proto.fields.len() as u8])?;
            for (index, field) in proto.fields.iter().enumerate() {
                w.write_all(&[field.access.code(), u8::from(field.field_type)])?;
                write_utf(w, &field.name)?;
                match proto.raw_defaults.get(index).and_then(Option::as_deref) {
                    Some(raw) => {
                        w.write_all(&[1])?;
                        write_utf(w, raw)?;
                    }
                    None => w.write_all(&[0])?,
                }
            }
        }

        w.write_all(&(schemas.extern_count() as u16).to_be_bytes())?;
        for proto in schemas.externs() {
            write_utf(w, &proto.name)?;
            w.write_all(&[proto.fields.len() as u8])?;
            for field in &proto.fields {
                w.write_all(&[field.access.code(), u8::from(field.field_type)])?;
                write_utf(w, &field.name)?;
            }
            w.write_all(&(proto.uris.len() as u16).to_be_bytes())?;
            for uri in &proto.uris {
                write_utf(w, uri)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{EventBuffer, SceneHandler};

    fn group_shape() -> EventBuffer {
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
    fn test_bytes_for() {
        assert_eq!(bytes_for(1), 1);
        assert_eq!(bytes_for(8), 1);
        assert_eq!(bytes_for(9), 2);
        assert_eq!(bytes_for(16), 2);
        assert_eq!(bytes_for(17), 3);
    }

    #[test]
    fn test_canonical_ids() {
        let stats = SceneStatistics::collect(&group_shape()).unwrap();
        let dicts = Dictionaries::build(&stats, DictionaryMode::Canonical).unwrap();

        assert_eq!(dicts.node_id("Group"), Some(30));
        assert_eq!(dicts.node_id("Shape"), Some(54));
        // the canonical range sizes the width even when mostly unused
        assert_eq!(dicts.node_num_bits, 7);
        assert_eq!(dicts.def_num_bits, 0);
        assert_eq!(dicts.node_op_bytes, 2);
        assert_eq!(dicts.use_op_bytes, 1);
    }

    #[test]
    fn test_content_ids_are_dense_first_seen() {
        let stats = SceneStatistics::collect(&group_shape()).unwrap();
        let dicts = Dictionaries::build(&stats, DictionaryMode::FromContent).unwrap();

        assert_eq!(dicts.node_id("Group"), Some(NODE_ID_BASE));
        assert_eq!(dicts.node_id("Shape"), Some(NODE_ID_BASE + 1));
        assert_eq!(dicts.node_num_bits, 2);
        assert_eq!(dicts.node_name(NODE_ID_BASE), Some("Group"));
    }

    #[test]
    fn test_field_ids_offset() {
        let stats = SceneStatistics::collect(&group_shape()).unwrap();
        let dicts = Dictionaries::build(&stats, DictionaryMode::FromContent).unwrap();

        let group = dicts.node_id("Group").unwrap();
        assert_eq!(dicts.field_id(group, "children"), Some(0));
        assert_eq!(dicts.field_name(group, 0), Some("children"));
        assert_eq!(dicts.field_id(group, "bboxSize"), None);
        // one field observed: ids 0..=1 on the wire (0 is the end marker)
        assert_eq!(dicts.field_num_bits, 1);
        assert_eq!(dicts.field_op_bytes, 1);
    }

    #[test]
    fn test_def_ids() {
        let mut events = EventBuffer::new();
        events.start_node("Transform", Some("A")).unwrap();
        events.start_field("children").unwrap();
        events.start_node("Box", Some("B")).unwrap();
        events.end_node().unwrap();
        events.end_field().unwrap();
        events.end_node().unwrap();

        let stats = SceneStatistics::collect(&events).unwrap();
        let dicts = Dictionaries::build(&stats, DictionaryMode::FromContent).unwrap();

        assert_eq!(dicts.def_id("A"), Some(1));
        assert_eq!(dicts.def_id("B"), Some(2));
        assert_eq!(dicts.def_name(1), Some("A"));
        assert_eq!(dicts.def_name(0), None);
        assert_eq!(dicts.def_num_bits, 2);
        assert_eq!(
            dicts.def_node_id(1),
            Some(dicts.node_id("Transform").unwrap())
        );
    }
}
