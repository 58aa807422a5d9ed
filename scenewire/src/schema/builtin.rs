//! The built-in node vocabulary: the canonical node-number table (a closed,
//! versioned enumeration baked into the binary format) and field
//! declarations with default values for the common node set.

use indexmap::IndexMap;
use lazy_static::lazy_static;

use super::{BuiltinNode, FieldAccess, FieldDecl, FieldType};
use crate::values::FieldValue;

/// Canonical node numbers. Numbers 0 and 1 are reserved (end-of-fields and
/// the dynamic/script marker); assignments below never change within a
/// format version.
pub const CANONICAL_NUMBERS: &[(&str, u32)] = &[
    ("Anchor", 2),
    ("Appearance", 3),
    ("AudioClip", 4),
    ("Background", 5),
    ("Billboard", 6),
    ("Box", 7),
    ("Arc2D", 8),
    ("ArcClose2D", 9),
    ("Circle2D", 10),
    ("Disk2D", 11),
    ("Polyline2D", 12),
    ("Polypoint2D", 13),
    ("Rectangle2D", 14),
    ("TriangleSet2D", 15),
    ("Collision", 16),
    ("ColorInterpolator", 17),
    ("Color", 18),
    ("Cone", 19),
    ("Coordinate", 20),
    ("CoordinateInterpolator", 21),
    ("Cylinder", 22),
    ("CylinderSensor", 23),
    ("DirectionalLight", 24),
    ("ElevationGrid", 25),
    ("Extrusion", 26),
    ("FillProperties", 27),
    ("Fog", 28),
    ("FontStyle", 29),
    ("Group", 30),
    ("ImageTexture", 31),
    ("IndexedFaceSet", 32),
    ("IndexedLineSet", 33),
    ("Inline", 34),
    ("KeySensor", 35),
    ("LineProperties", 36),
    ("LoadSensor", 37),
    ("LOD", 38),
    ("Material", 39),
    ("MovieTexture", 40),
    ("MultiTexture", 41),
    ("NavigationInfo", 42),
    ("Normal", 43),
    ("NormalInterpolator", 44),
    ("OrientationInterpolator", 45),
    ("PixelTexture", 46),
    ("PlaneSensor", 47),
    ("PointLight", 48),
    ("PointSet", 49),
    ("PositionInterpolator", 50),
    ("ProximitySensor", 51),
    ("ScalarInterpolator", 52),
    ("Script", 53),
    ("Shape", 54),
    ("Sound", 55),
    ("Sphere", 56),
    ("SphereSensor", 57),
    ("SpotLight", 58),
    ("StringSensor", 59),
    ("Switch", 60),
    ("Text", 61),
    ("TextureCoordinate", 62),
    ("TextureTransform", 63),
    ("TimeSensor", 64),
    ("TouchSensor", 65),
    ("Transform", 66),
    ("TriangleFanSet", 67),
    ("TriangleSet", 68),
    ("TriangleStripSet", 69),
    ("Viewpoint", 70),
    ("VisibilitySensor", 71),
    ("WorldInfo", 72),
    ("EspduTransform", 73),
    ("ReceiverPdu", 74),
    ("SignalPdu", 75),
    ("TransmitterPdu", 76),
    ("GeoCoordinate", 77),
    ("GeoElevationGrid", 78),
    ("GeoInline", 79),
    ("GeoLocation", 80),
    ("GeoLOD", 81),
    ("GeoMetadata", 82),
    ("GeoOrigin", 83),
    ("GeoPositionInterpolator", 84),
    ("GeoTouchSensor", 85),
    ("GeoViewpoint", 86),
    ("Displacer", 87),
    ("Humanoid", 88),
    ("Joint", 89),
    ("Segment", 90),
    ("Site", 91),
    ("Contour2D", 92),
    ("CoordinateDeformer", 93),
    ("NurbsCurve", 94),
    ("NurbsCurve2D", 95),
    ("NurbsGroup", 96),
    ("NurbsPositionInterpolator", 97),
    ("NurbsSurface", 98),
    ("NurbsTextureSurface", 99),
    ("ContourPolyline2D", 100),
    ("TrimmedSurface", 101),
];

pub fn canonical_number(name: &str) -> Option<u32> {
    CANONICAL_NUMBERS
        .iter()
        .find(|(entry, _)| *entry == name)
        .map(|(_, number)| *number)
}

pub fn canonical_max() -> u32 {
    CANONICAL_NUMBERS[CANONICAL_NUMBERS.len() - 1].1
}

pub fn builtin_node(name: &str) -> Option<&'static BuiltinNode> {
    BUILTIN_NODES.get(name)
}

fn field(field_type: FieldType, name: &str) -> FieldDecl {
    FieldDecl::new(FieldAccess::Field, field_type, name)
}

fn exposed(field_type: FieldType, name: &str) -> FieldDecl {
    FieldDecl::new(FieldAccess::ExposedField, field_type, name)
}

fn event_in(field_type: FieldType, name: &str) -> FieldDecl {
    FieldDecl::new(FieldAccess::EventIn, field_type, name)
}

fn event_out(field_type: FieldType, name: &str) -> FieldDecl {
    FieldDecl::new(FieldAccess::EventOut, field_type, name)
}

fn floats(vals: &[f32]) -> FieldValue {
    FieldValue::Floats(vals.to_vec())
}

fn sf_bool(b: bool) -> FieldValue {
    FieldValue::Bool(b)
}

fn sf_float(v: f32) -> FieldValue {
    FieldValue::Float(v)
}

fn sf_time(v: f64) -> FieldValue {
    FieldValue::Double(v)
}

fn sf_string(s: &str) -> FieldValue {
    FieldValue::Str(s.to_string())
}

fn strings(vals: &[&str]) -> FieldValue {
    FieldValue::Strs(vals.iter().map(|s| s.to_string()).collect())
}

fn bbox_fields() -> [FieldDecl; 2] {
    [
        field(FieldType::SFVec3f, "bboxCenter").with_default(floats(&[0.0, 0.0, 0.0])),
        field(FieldType::SFVec3f, "bboxSize").with_default(floats(&[-1.0, -1.0, -1.0])),
    ]
}

fn grouping_events() -> [FieldDecl; 2] {
    [
        event_in(FieldType::MFNode, "addChildren"),
        event_in(FieldType::MFNode, "removeChildren"),
    ]
}

lazy_static! {
    static ref BUILTIN_NODES: IndexMap<&'static str, BuiltinNode> = {
        let mut nodes = IndexMap::new();
        for node in build_nodes() {
            nodes.insert(node.name, node);
        }
        nodes
    };
}

fn build_nodes() -> Vec<BuiltinNode> {
    let mut nodes = Vec::new();
    let mut add = |name: &'static str, fields: Vec<FieldDecl>| {
        let number = canonical_number(name).expect("node missing from canonical table");
        nodes.push(BuiltinNode {
            name,
            number,
            fields,
        });
    };

    add("Anchor", {
        let mut f = vec![
            exposed(FieldType::MFNode, "children"),
            exposed(FieldType::SFString, "description").with_default(sf_string("")),
            exposed(FieldType::MFString, "parameter").with_default(strings(&[])),
            exposed(FieldType::MFString, "url").with_default(strings(&[])),
        ];
        f.extend(bbox_fields());
        f.extend(grouping_events());
        f
    });

    add(
        "Appearance",
        vec![
            exposed(FieldType::SFNode, "material"),
            exposed(FieldType::SFNode, "texture"),
            exposed(FieldType::SFNode, "textureTransform"),
        ],
    );

    add(
        "AudioClip",
        vec![
            exposed(FieldType::SFString, "description").with_default(sf_string("")),
            exposed(FieldType::SFBool, "loop").with_default(sf_bool(false)),
            exposed(FieldType::SFFloat, "pitch").with_default(sf_float(1.0)),
            exposed(FieldType::SFTime, "startTime").with_default(sf_time(0.0)),
            exposed(FieldType::SFTime, "stopTime").with_default(sf_time(0.0)),
            exposed(FieldType::MFString, "url").with_default(strings(&[])),
            event_out(FieldType::SFTime, "duration_changed"),
            event_out(FieldType::SFBool, "isActive"),
        ],
    );

    add(
        "Background",
        vec![
            event_in(FieldType::SFBool, "set_bind"),
            exposed(FieldType::MFFloat, "groundAngle").with_default(floats(&[])),
            exposed(FieldType::MFColor, "groundColor").with_default(floats(&[])),
            exposed(FieldType::MFString, "backUrl").with_default(strings(&[])),
            exposed(FieldType::MFString, "bottomUrl").with_default(strings(&[])),
            exposed(FieldType::MFString, "frontUrl").with_default(strings(&[])),
            exposed(FieldType::MFString, "leftUrl").with_default(strings(&[])),
            exposed(FieldType::MFString, "rightUrl").with_default(strings(&[])),
            exposed(FieldType::MFString, "topUrl").with_default(strings(&[])),
            exposed(FieldType::MFFloat, "skyAngle").with_default(floats(&[])),
            exposed(FieldType::MFColor, "skyColor").with_default(floats(&[0.0, 0.0, 0.0])),
            event_out(FieldType::SFBool, "isBound"),
        ],
    );

    add("Billboard", {
        let mut f = vec![
            exposed(FieldType::SFVec3f, "axisOfRotation").with_default(floats(&[0.0, 1.0, 0.0])),
            exposed(FieldType::MFNode, "children"),
        ];
        f.extend(bbox_fields());
        f.extend(grouping_events());
        f
    });

    add(
        "Box",
        vec![field(FieldType::SFVec3f, "size").with_default(floats(&[2.0, 2.0, 2.0]))],
    );

    add("Collision", {
        let mut f = vec![
            exposed(FieldType::MFNode, "children"),
            exposed(FieldType::SFBool, "collide").with_default(sf_bool(true)),
            field(FieldType::SFNode, "proxy"),
            event_out(FieldType::SFTime, "collideTime"),
        ];
        f.extend(bbox_fields());
        f.extend(grouping_events());
        f
    });

    add(
        "Color",
        vec![exposed(FieldType::MFColor, "color").with_default(floats(&[]))],
    );

    add(
        "ColorInterpolator",
        vec![
            event_in(FieldType::SFFloat, "set_fraction"),
            exposed(FieldType::MFFloat, "key").with_default(floats(&[])),
            exposed(FieldType::MFColor, "keyValue").with_default(floats(&[])),
            event_out(FieldType::SFColor, "value_changed"),
        ],
    );

    add(
        "Cone",
        vec![
            field(FieldType::SFFloat, "bottomRadius").with_default(sf_float(1.0)),
            field(FieldType::SFFloat, "height").with_default(sf_float(2.0)),
            field(FieldType::SFBool, "side").with_default(sf_bool(true)),
            field(FieldType::SFBool, "bottom").with_default(sf_bool(true)),
        ],
    );

    add(
        "Coordinate",
        vec![exposed(FieldType::MFVec3f, "point").with_default(floats(&[]))],
    );

    add(
        "CoordinateInterpolator",
        vec![
            event_in(FieldType::SFFloat, "set_fraction"),
            exposed(FieldType::MFFloat, "key").with_default(floats(&[])),
            exposed(FieldType::MFVec3f, "keyValue").with_default(floats(&[])),
            event_out(FieldType::MFVec3f, "value_changed"),
        ],
    );

    add(
        "Cylinder",
        vec![
            field(FieldType::SFBool, "bottom").with_default(sf_bool(true)),
            field(FieldType::SFFloat, "height").with_default(sf_float(2.0)),
            field(FieldType::SFFloat, "radius").with_default(sf_float(1.0)),
            field(FieldType::SFBool, "side").with_default(sf_bool(true)),
            field(FieldType::SFBool, "top").with_default(sf_bool(true)),
        ],
    );

    add(
        "DirectionalLight",
        vec![
            exposed(FieldType::SFFloat, "ambientIntensity").with_default(sf_float(0.0)),
            exposed(FieldType::SFColor, "color").with_default(floats(&[1.0, 1.0, 1.0])),
            exposed(FieldType::SFVec3f, "direction").with_default(floats(&[0.0, 0.0, -1.0])),
            exposed(FieldType::SFFloat, "intensity").with_default(sf_float(1.0)),
            exposed(FieldType::SFBool, "on").with_default(sf_bool(true)),
        ],
    );

    add(
        "ElevationGrid",
        vec![
            event_in(FieldType::MFFloat, "set_height"),
            exposed(FieldType::SFNode, "color"),
            exposed(FieldType::SFNode, "normal"),
            exposed(FieldType::SFNode, "texCoord"),
            field(FieldType::MFFloat, "height").with_default(floats(&[])),
            field(FieldType::SFBool, "ccw").with_default(sf_bool(true)),
            field(FieldType::SFBool, "colorPerVertex").with_default(sf_bool(true)),
            field(FieldType::SFFloat, "creaseAngle").with_default(sf_float(0.0)),
            field(FieldType::SFBool, "normalPerVertex").with_default(sf_bool(true)),
            field(FieldType::SFBool, "solid").with_default(sf_bool(true)),
            field(FieldType::SFInt32, "xDimension").with_default(FieldValue::Int(0)),
            field(FieldType::SFFloat, "xSpacing").with_default(sf_float(1.0)),
            field(FieldType::SFInt32, "zDimension").with_default(FieldValue::Int(0)),
            field(FieldType::SFFloat, "zSpacing").with_default(sf_float(1.0)),
        ],
    );

    add(
        "Fog",
        vec![
            exposed(FieldType::SFColor, "color").with_default(floats(&[1.0, 1.0, 1.0])),
            exposed(FieldType::SFString, "fogType").with_default(sf_string("LINEAR")),
            exposed(FieldType::SFFloat, "visibilityRange").with_default(sf_float(0.0)),
            event_in(FieldType::SFBool, "set_bind"),
            event_out(FieldType::SFBool, "isBound"),
        ],
    );

    add(
        "FontStyle",
        vec![
            field(FieldType::MFString, "family").with_default(strings(&["SERIF"])),
            field(FieldType::SFBool, "horizontal").with_default(sf_bool(true)),
            field(FieldType::MFString, "justify").with_default(strings(&["BEGIN"])),
            field(FieldType::SFString, "language").with_default(sf_string("")),
            field(FieldType::SFBool, "leftToRight").with_default(sf_bool(true)),
            field(FieldType::SFFloat, "size").with_default(sf_float(1.0)),
            field(FieldType::SFFloat, "spacing").with_default(sf_float(1.0)),
            field(FieldType::SFString, "style").with_default(sf_string("PLAIN")),
            field(FieldType::SFBool, "topToBottom").with_default(sf_bool(true)),
        ],
    );

    add("Group", {
        let mut f = vec![exposed(FieldType::MFNode, "children")];
        f.extend(bbox_fields());
        f.extend(grouping_events());
        f
    });

    add(
        "ImageTexture",
        vec![
            exposed(FieldType::MFString, "url").with_default(strings(&[])),
            field(FieldType::SFBool, "repeatS").with_default(sf_bool(true)),
            field(FieldType::SFBool, "repeatT").with_default(sf_bool(true)),
        ],
    );

    add(
        "IndexedFaceSet",
        vec![
            event_in(FieldType::MFInt32, "set_colorIndex"),
            event_in(FieldType::MFInt32, "set_coordIndex"),
            event_in(FieldType::MFInt32, "set_normalIndex"),
            event_in(FieldType::MFInt32, "set_texCoordIndex"),
            exposed(FieldType::SFNode, "color"),
            exposed(FieldType::SFNode, "coord"),
            exposed(FieldType::SFNode, "normal"),
            exposed(FieldType::SFNode, "texCoord"),
            field(FieldType::SFBool, "ccw").with_default(sf_bool(true)),
            field(FieldType::MFInt32, "colorIndex").with_default(FieldValue::Ints(Vec::new())),
            field(FieldType::SFBool, "colorPerVertex").with_default(sf_bool(true)),
            field(FieldType::SFBool, "convex").with_default(sf_bool(true)),
            field(FieldType::MFInt32, "coordIndex").with_default(FieldValue::Ints(Vec::new())),
            field(FieldType::SFFloat, "creaseAngle").with_default(sf_float(0.0)),
            field(FieldType::MFInt32, "normalIndex").with_default(FieldValue::Ints(Vec::new())),
            field(FieldType::SFBool, "normalPerVertex").with_default(sf_bool(true)),
            field(FieldType::SFBool, "solid").with_default(sf_bool(true)),
            field(FieldType::MFInt32, "texCoordIndex").with_default(FieldValue::Ints(Vec::new())),
        ],
    );

    add(
        "IndexedLineSet",
        vec![
            event_in(FieldType::MFInt32, "set_colorIndex"),
            event_in(FieldType::MFInt32, "set_coordIndex"),
            exposed(FieldType::SFNode, "color"),
            exposed(FieldType::SFNode, "coord"),
            field(FieldType::MFInt32, "colorIndex").with_default(FieldValue::Ints(Vec::new())),
            field(FieldType::SFBool, "colorPerVertex").with_default(sf_bool(true)),
            field(FieldType::MFInt32, "coordIndex").with_default(FieldValue::Ints(Vec::new())),
        ],
    );

    add("Inline", {
        let mut f = vec![exposed(FieldType::MFString, "url").with_default(strings(&[]))];
        f.extend(bbox_fields());
        f
    });

    add(
        "LOD",
        vec![
            exposed(FieldType::MFNode, "level"),
            field(FieldType::SFVec3f, "center").with_default(floats(&[0.0, 0.0, 0.0])),
            field(FieldType::MFFloat, "range").with_default(floats(&[])),
        ],
    );

    add(
        "Material",
        vec![
            exposed(FieldType::SFFloat, "ambientIntensity").with_default(sf_float(0.2)),
            exposed(FieldType::SFColor, "diffuseColor").with_default(floats(&[0.8, 0.8, 0.8])),
            exposed(FieldType::SFColor, "emissiveColor").with_default(floats(&[0.0, 0.0, 0.0])),
            exposed(FieldType::SFFloat, "shininess").with_default(sf_float(0.2)),
            exposed(FieldType::SFColor, "specularColor").with_default(floats(&[0.0, 0.0, 0.0])),
            exposed(FieldType::SFFloat, "transparency").with_default(sf_float(0.0)),
        ],
    );

    add(
        "NavigationInfo",
        vec![
            event_in(FieldType::SFBool, "set_bind"),
            exposed(FieldType::MFFloat, "avatarSize").with_default(floats(&[0.25, 1.6, 0.75])),
            exposed(FieldType::SFBool, "headlight").with_default(sf_bool(true)),
            exposed(FieldType::SFFloat, "speed").with_default(sf_float(1.0)),
            exposed(FieldType::MFString, "type").with_default(strings(&["WALK", "ANY"])),
            exposed(FieldType::SFFloat, "visibilityLimit").with_default(sf_float(0.0)),
            event_out(FieldType::SFBool, "isBound"),
        ],
    );

    add(
        "Normal",
        vec![exposed(FieldType::MFVec3f, "vector").with_default(floats(&[]))],
    );

    add(
        "NormalInterpolator",
        vec![
            event_in(FieldType::SFFloat, "set_fraction"),
            exposed(FieldType::MFFloat, "key").with_default(floats(&[])),
            exposed(FieldType::MFVec3f, "keyValue").with_default(floats(&[])),
            event_out(FieldType::MFVec3f, "value_changed"),
        ],
    );

    add(
        "OrientationInterpolator",
        vec![
            event_in(FieldType::SFFloat, "set_fraction"),
            exposed(FieldType::MFFloat, "key").with_default(floats(&[])),
            exposed(FieldType::MFRotation, "keyValue").with_default(floats(&[])),
            event_out(FieldType::SFRotation, "value_changed"),
        ],
    );

    add(
        "PixelTexture",
        vec![
            exposed(FieldType::SFImage, "image").with_default(FieldValue::Ints(vec![0, 0, 0])),
            field(FieldType::SFBool, "repeatS").with_default(sf_bool(true)),
            field(FieldType::SFBool, "repeatT").with_default(sf_bool(true)),
        ],
    );

    add(
        "PointLight",
        vec![
            exposed(FieldType::SFFloat, "ambientIntensity").with_default(sf_float(0.0)),
            exposed(FieldType::SFVec3f, "attenuation").with_default(floats(&[1.0, 0.0, 0.0])),
            exposed(FieldType::SFColor, "color").with_default(floats(&[1.0, 1.0, 1.0])),
            exposed(FieldType::SFFloat, "intensity").with_default(sf_float(1.0)),
            exposed(FieldType::SFVec3f, "location").with_default(floats(&[0.0, 0.0, 0.0])),
            exposed(FieldType::SFBool, "on").with_default(sf_bool(true)),
            exposed(FieldType::SFFloat, "radius").with_default(sf_float(100.0)),
        ],
    );

    add(
        "PointSet",
        vec![
            exposed(FieldType::SFNode, "color"),
            exposed(FieldType::SFNode, "coord"),
        ],
    );

    add(
        "PositionInterpolator",
        vec![
            event_in(FieldType::SFFloat, "set_fraction"),
            exposed(FieldType::MFFloat, "key").with_default(floats(&[])),
            exposed(FieldType::MFVec3f, "keyValue").with_default(floats(&[])),
            event_out(FieldType::SFVec3f, "value_changed"),
        ],
    );

    add(
        "ScalarInterpolator",
        vec![
            event_in(FieldType::SFFloat, "set_fraction"),
            exposed(FieldType::MFFloat, "key").with_default(floats(&[])),
            exposed(FieldType::MFFloat, "keyValue").with_default(floats(&[])),
            event_out(FieldType::SFFloat, "value_changed"),
        ],
    );

    add(
        "Shape",
        vec![
            exposed(FieldType::SFNode, "appearance"),
            exposed(FieldType::SFNode, "geometry"),
        ],
    );

    add(
        "Sound",
        vec![
            exposed(FieldType::SFVec3f, "direction").with_default(floats(&[0.0, 0.0, 1.0])),
            exposed(FieldType::SFFloat, "intensity").with_default(sf_float(1.0)),
            exposed(FieldType::SFVec3f, "location").with_default(floats(&[0.0, 0.0, 0.0])),
            exposed(FieldType::SFFloat, "maxBack").with_default(sf_float(10.0)),
            exposed(FieldType::SFFloat, "maxFront").with_default(sf_float(10.0)),
            exposed(FieldType::SFFloat, "minBack").with_default(sf_float(1.0)),
            exposed(FieldType::SFFloat, "minFront").with_default(sf_float(1.0)),
            exposed(FieldType::SFFloat, "priority").with_default(sf_float(0.0)),
            exposed(FieldType::SFNode, "source"),
            field(FieldType::SFBool, "spatialize").with_default(sf_bool(true)),
        ],
    );

    add(
        "Sphere",
        vec![field(FieldType::SFFloat, "radius").with_default(sf_float(1.0))],
    );

    add(
        "SpotLight",
        vec![
            exposed(FieldType::SFFloat, "ambientIntensity").with_default(sf_float(0.0)),
            exposed(FieldType::SFVec3f, "attenuation").with_default(floats(&[1.0, 0.0, 0.0])),
            exposed(FieldType::SFFloat, "beamWidth").with_default(sf_float(1.570_796)),
            exposed(FieldType::SFColor, "color").with_default(floats(&[1.0, 1.0, 1.0])),
            exposed(FieldType::SFFloat, "cutOffAngle").with_default(sf_float(0.785_398)),
            exposed(FieldType::SFVec3f, "direction").with_default(floats(&[0.0, 0.0, -1.0])),
            exposed(FieldType::SFFloat, "intensity").with_default(sf_float(1.0)),
            exposed(FieldType::SFVec3f, "location").with_default(floats(&[0.0, 0.0, 0.0])),
            exposed(FieldType::SFBool, "on").with_default(sf_bool(true)),
            exposed(FieldType::SFFloat, "radius").with_default(sf_float(100.0)),
        ],
    );

    add(
        "Switch",
        vec![
            exposed(FieldType::MFNode, "choice"),
            exposed(FieldType::SFInt32, "whichChoice").with_default(FieldValue::Int(-1)),
        ],
    );

    add(
        "Text",
        vec![
            exposed(FieldType::MFString, "string").with_default(strings(&[])),
            exposed(FieldType::SFNode, "fontStyle"),
            exposed(FieldType::MFFloat, "length").with_default(floats(&[])),
            exposed(FieldType::SFFloat, "maxExtent").with_default(sf_float(0.0)),
        ],
    );

    add(
        "TextureCoordinate",
        vec![exposed(FieldType::MFVec2f, "point").with_default(floats(&[]))],
    );

    add(
        "TextureTransform",
        vec![
            exposed(FieldType::SFVec2f, "center").with_default(floats(&[0.0, 0.0])),
            exposed(FieldType::SFFloat, "rotation").with_default(sf_float(0.0)),
            exposed(FieldType::SFVec2f, "scale").with_default(floats(&[1.0, 1.0])),
            exposed(FieldType::SFVec2f, "translation").with_default(floats(&[0.0, 0.0])),
        ],
    );

    add(
        "TimeSensor",
        vec![
            exposed(FieldType::SFTime, "cycleInterval").with_default(sf_time(1.0)),
            exposed(FieldType::SFBool, "enabled").with_default(sf_bool(true)),
            exposed(FieldType::SFBool, "loop").with_default(sf_bool(false)),
            exposed(FieldType::SFTime, "startTime").with_default(sf_time(0.0)),
            exposed(FieldType::SFTime, "stopTime").with_default(sf_time(0.0)),
            event_out(FieldType::SFTime, "cycleTime"),
            event_out(FieldType::SFFloat, "fraction_changed"),
            event_out(FieldType::SFBool, "isActive"),
            event_out(FieldType::SFTime, "time"),
        ],
    );

    add(
        "TouchSensor",
        vec![
            exposed(FieldType::SFBool, "enabled").with_default(sf_bool(true)),
            event_out(FieldType::SFVec3f, "hitNormal_changed"),
            event_out(FieldType::SFVec3f, "hitPoint_changed"),
            event_out(FieldType::SFVec2f, "hitTexCoord_changed"),
            event_out(FieldType::SFBool, "isActive"),
            event_out(FieldType::SFBool, "isOver"),
            event_out(FieldType::SFTime, "touchTime"),
        ],
    );

    add("Transform", {
        let mut f = vec![
            exposed(FieldType::SFVec3f, "center").with_default(floats(&[0.0, 0.0, 0.0])),
            exposed(FieldType::MFNode, "children"),
            exposed(FieldType::SFRotation, "rotation").with_default(floats(&[0.0, 0.0, 1.0, 0.0])),
            exposed(FieldType::SFVec3f, "scale").with_default(floats(&[1.0, 1.0, 1.0])),
            exposed(FieldType::SFRotation, "scaleOrientation")
                .with_default(floats(&[0.0, 0.0, 1.0, 0.0])),
            exposed(FieldType::SFVec3f, "translation").with_default(floats(&[0.0, 0.0, 0.0])),
        ];
        f.extend(bbox_fields());
        f.extend(grouping_events());
        f
    });

    add(
        "Viewpoint",
        vec![
            event_in(FieldType::SFBool, "set_bind"),
            exposed(FieldType::SFFloat, "fieldOfView").with_default(sf_float(0.785_398)),
            exposed(FieldType::SFBool, "jump").with_default(sf_bool(true)),
            exposed(FieldType::SFRotation, "orientation")
                .with_default(floats(&[0.0, 0.0, 1.0, 0.0])),
            exposed(FieldType::SFVec3f, "position").with_default(floats(&[0.0, 0.0, 10.0])),
            field(FieldType::SFString, "description").with_default(sf_string("")),
            event_out(FieldType::SFTime, "bindTime"),
            event_out(FieldType::SFBool, "isBound"),
        ],
    );

    add(
        "WorldInfo",
        vec![
            field(FieldType::MFString, "info").with_default(strings(&[])),
            field(FieldType::SFString, "title").with_default(sf_string("")),
        ],
    );

    nodes
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_canonical_numbers() {
        assert_eq!(canonical_number("Group"), Some(30));
        assert_eq!(canonical_number("Shape"), Some(54));
        assert_eq!(canonical_number("Script"), Some(53));
        assert_eq!(canonical_number("NoSuchNode"), None);
        assert_eq!(canonical_max(), 101);
    }

    #[test]
    fn test_builtin_numbers_match_canonical_table() {
        for (name, node) in BUILTIN_NODES.iter() {
            assert_eq!(canonical_number(name), Some(node.number), "{}", name);
        }
    }

    #[test]
    fn test_group_schema() {
        let group = builtin_node("Group").unwrap();
        let children = group.fields.iter().find(|f| f.name == "children").unwrap();
        assert_eq!(children.field_type, FieldType::MFNode);
        assert_eq!(children.access, FieldAccess::ExposedField);

        let bbox = group.fields.iter().find(|f| f.name == "bboxSize").unwrap();
        assert_eq!(
            bbox.default,
            Some(FieldValue::Floats(vec![-1.0, -1.0, -1.0]))
        );
    }
}
