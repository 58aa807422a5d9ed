//! Per-field-type compression strategies and the registry dispatching to
//! them.
//!
//! Every strategy's payload is self-delimiting: array lengths and
//! compressed-byte lengths travel inside the payload, never inferred from
//! surrounding context, so a reader can always skip or re-frame a field it
//! has a strategy for. The registry binds one active method per field type
//! at encode time (last registration wins) and resolves (type, method)
//! pairs read off the wire at decode time.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::rc::Rc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use int_enum::IntEnum;

use super::bits::{BitPacker, BitUnpacker};
use super::quant::{FloatQuantizer, EXPONENT_BITS, MANTISSA_BITS};
use super::{write_utf, ByteReader};
use crate::error::{DecodeError, DecodeResult, ExportError, ExportResult};
use crate::options::CompressionProfile;
use crate::schema::{FieldType, Storage};
use crate::values::FieldValue;

/// Wire selector for the strategy a field value was encoded with. Three
/// bits are reserved in every field record.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntEnum)]
pub enum CompressionMethod {
    /// Fixed-width IEEE scalars and UTF-8 strings.
    Raw = 0,
    /// Span-delta + zigzag varints + zlib, for integer arrays. Lossless.
    DeltaZlib = 1,
    /// Reduced-mantissa float codes, bit-packed + zlib. Lossy within a
    /// tolerance.
    QuantizedZlib = 2,
    /// The value's classic text form. The safe fallback for any type.
    Text = 3,
}

/// A strategy encoding and decoding one typed value.
pub trait FieldCodec {
    fn supports(&self, field_type: FieldType, method: CompressionMethod) -> bool;

    fn encode(
        &self,
        out: &mut Vec<u8>,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<()>;

    fn decode(&self, input: &mut ByteReader<'_>, field_type: FieldType)
        -> DecodeResult<FieldValue>;
}

fn type_mismatch(field_type: FieldType, value: &FieldValue) -> ExportError {
    ExportError::Value(crate::values::ValueError {
        field_type,
        message: format!("value {:?} does not match the declared storage class", value),
    })
}

// ---------------------------------------------------------------------------
// raw IEEE / UTF-8 baseline
// ---------------------------------------------------------------------------

/// Encodes every non-node field type in plain big-endian IEEE form.
/// Single-valued vector forms omit their length; the reader recomputes it
/// from the declared type.
pub struct RawCodec;

impl FieldCodec for RawCodec {
    fn supports(&self, field_type: FieldType, method: CompressionMethod) -> bool {
        method == CompressionMethod::Raw && !field_type.is_node()
    }

    fn encode(
        &self,
        out: &mut Vec<u8>,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<()> {
        let counted = field_type.fixed_len().is_none();
        match value {
            FieldValue::Bool(b) => out.push(*b as u8),
            FieldValue::Bools(vals) => {
                out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
                out.extend(vals.iter().map(|b| *b as u8));
            }
            FieldValue::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Ints(vals) => {
                if counted {
                    out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
                }
                for v in vals {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            FieldValue::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Longs(vals) => {
                out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
                for v in vals {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            FieldValue::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Floats(vals) => {
                if counted {
                    out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
                }
                for v in vals {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            FieldValue::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Doubles(vals) => {
                if counted {
                    out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
                }
                for v in vals {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            FieldValue::Str(s) => write_utf(out, s)?,
            FieldValue::Strs(vals) => {
                out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
                for s in vals {
                    write_utf(out, s)?;
                }
            }
        }

        Ok(())
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        field_type: FieldType,
    ) -> DecodeResult<FieldValue> {
        let array_len = |input: &mut ByteReader<'_>| -> io::Result<usize> {
            match field_type.fixed_len() {
                Some(fixed) => Ok(fixed),
                None => Ok(input.read_u32()? as usize),
            }
        };

        Ok(match field_type.storage() {
            Storage::Bool => FieldValue::Bool(input.read_u8()? != 0),
            Storage::BoolArray => {
                let len = input.read_u32()? as usize;
                let bytes = input.take(len)?;
                FieldValue::Bools(bytes.iter().map(|b| *b != 0).collect())
            }
            Storage::Int => FieldValue::Int(input.read_i32()?),
            Storage::IntArray => {
                let len = array_len(input)?;
                let mut vals = Vec::with_capacity(len);
                for _ in 0..len {
                    vals.push(input.read_i32()?);
                }
                FieldValue::Ints(vals)
            }
            Storage::Long => {
                let bytes = input.take(8)?;
                FieldValue::Long(i64::from_be_bytes(bytes.try_into().expect("8 bytes")))
            }
            Storage::LongArray => {
                let len = input.read_u32()? as usize;
                let mut vals = Vec::with_capacity(len);
                for _ in 0..len {
                    let bytes = input.take(8)?;
                    vals.push(i64::from_be_bytes(bytes.try_into().expect("8 bytes")));
                }
                FieldValue::Longs(vals)
            }
            Storage::Float => FieldValue::Float(f32::from_bits(input.read_u32()?)),
            Storage::FloatArray => {
                let len = array_len(input)?;
                let mut vals = Vec::with_capacity(len);
                for _ in 0..len {
                    vals.push(f32::from_bits(input.read_u32()?));
                }
                FieldValue::Floats(vals)
            }
            Storage::Double => {
                let bytes = input.take(8)?;
                FieldValue::Double(f64::from_be_bytes(bytes.try_into().expect("8 bytes")))
            }
            Storage::DoubleArray => {
                let len = array_len(input)?;
                let mut vals = Vec::with_capacity(len);
                for _ in 0..len {
                    let bytes = input.take(8)?;
                    vals.push(f64::from_be_bytes(bytes.try_into().expect("8 bytes")));
                }
                FieldValue::Doubles(vals)
            }
            Storage::Str => FieldValue::Str(input.read_utf()?),
            Storage::StrArray => {
                let len = input.read_u32()? as usize;
                let mut vals = Vec::with_capacity(len);
                for _ in 0..len {
                    vals.push(input.read_utf()?);
                }
                FieldValue::Strs(vals)
            }
            Storage::Node | Storage::NodeArray => {
                return Err(DecodeError::at(
                    input.offset(),
                    "node-valued fields have no inline payload",
                ))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// delta + zlib for integer arrays
// ---------------------------------------------------------------------------

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn read_varint(input: &mut &[u8]) -> io::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *input.first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "varint ended early")
        })?;
        *input = &input[1..];
        if shift >= 64 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint too large"));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte < 0x80 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn deflate(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn inflate(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Lossless integer-array compression: values are delta-coded against the
/// value one span earlier, zigzag-varint packed, and deflated.
pub struct DeltaZlibCodec;

impl FieldCodec for DeltaZlibCodec {
    fn supports(&self, field_type: FieldType, method: CompressionMethod) -> bool {
        method == CompressionMethod::DeltaZlib && field_type.storage() == Storage::IntArray
    }

    fn encode(
        &self,
        out: &mut Vec<u8>,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<()> {
        let vals = match value {
            FieldValue::Ints(vals) => vals,
            other => return Err(type_mismatch(field_type, other)),
        };

        out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
        if vals.is_empty() {
            return Ok(());
        }

        let span = field_type.span();
        let mut deltas = Vec::with_capacity(vals.len() * 2);
        for (i, v) in vals.iter().enumerate() {
            let previous = if i >= span { vals[i - span] as i64 } else { 0 };
            write_varint(&mut deltas, zigzag(*v as i64 - previous));
        }

        let compressed = deflate(&deltas)?;
        out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);

        Ok(())
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        field_type: FieldType,
    ) -> DecodeResult<FieldValue> {
        let count = input.read_u32()? as usize;
        if count == 0 {
            return Ok(FieldValue::Ints(Vec::new()));
        }

        let compressed_len = input.read_u32()? as usize;
        let start = input.offset();
        let deltas = inflate(input.take(compressed_len)?)?;

        let span = field_type.span();
        let mut cursor = &deltas[..];
        let mut vals: Vec<i32> = Vec::with_capacity(count);
        for i in 0..count {
            let delta = unzigzag(read_varint(&mut cursor)?);
            let previous = if i >= span { vals[i - span] as i64 } else { 0 };
            let value = previous + delta;
            let value = i32::try_from(value)
                .map_err(|_| DecodeError::at(start, "delta stream exceeds 32-bit range"))?;
            vals.push(value);
        }

        Ok(FieldValue::Ints(vals))
    }
}

// ---------------------------------------------------------------------------
// quantized + zlib for float arrays
// ---------------------------------------------------------------------------

/// Lossy float-array compression: reduced-mantissa codes chosen from the
/// configured tolerance, bit-packed and deflated.
pub struct QuantizedZlibCodec {
    tolerance: f32,
}

impl QuantizedZlibCodec {
    pub fn new(tolerance: f32) -> QuantizedZlibCodec {
        QuantizedZlibCodec { tolerance }
    }
}

impl FieldCodec for QuantizedZlibCodec {
    fn supports(&self, field_type: FieldType, method: CompressionMethod) -> bool {
        method == CompressionMethod::QuantizedZlib
            && field_type.storage() == Storage::FloatArray
    }

    fn encode(
        &self,
        out: &mut Vec<u8>,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<()> {
        let vals = match value {
            FieldValue::Floats(vals) => vals,
            other => return Err(type_mismatch(field_type, other)),
        };

        let quantizer = FloatQuantizer::choose(vals, self.tolerance);
        out.push(EXPONENT_BITS as u8);
        out.push(quantizer.mantissa_bits() as u8);
        out.extend_from_slice(&(vals.len() as u32).to_be_bytes());
        if vals.is_empty() {
            return Ok(());
        }

        let mut packer =
            BitPacker::with_capacity(vals.len() * quantizer.code_bits() as usize / 8 + 1);
        for v in vals {
            packer.pack(quantizer.encode(*v), quantizer.code_bits())?;
        }
        let packed = packer.into_bytes();

        let compressed = deflate(&packed)?;
        out.extend_from_slice(&(packed.len() as u32).to_be_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);

        Ok(())
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        _field_type: FieldType,
    ) -> DecodeResult<FieldValue> {
        let exp_bits = input.read_u8()? as u32;
        let man_bits = input.read_u8()? as u32;
        if exp_bits != EXPONENT_BITS || man_bits > MANTISSA_BITS {
            return Err(DecodeError::at(
                input.offset(),
                format!("unsupported quantization layout {}/{}", exp_bits, man_bits),
            ));
        }

        let count = input.read_u32()? as usize;
        if count == 0 {
            return Ok(FieldValue::Floats(Vec::new()));
        }

        let packed_len = input.read_u32()? as usize;
        let compressed_len = input.read_u32()? as usize;
        let offset = input.offset();
        let packed = inflate(input.take(compressed_len)?)?;
        if packed.len() != packed_len {
            return Err(DecodeError::at(
                offset,
                format!(
                    "quantized payload inflated to {} bytes, expected {}",
                    packed.len(),
                    packed_len
                ),
            ));
        }

        let quantizer = FloatQuantizer::new(man_bits);
        let mut unpacker = BitUnpacker::new(&packed);
        let mut vals = Vec::with_capacity(count);
        for _ in 0..count {
            vals.push(quantizer.decode(unpacker.unpack(quantizer.code_bits())?));
        }

        Ok(FieldValue::Floats(vals))
    }
}

// ---------------------------------------------------------------------------
// textual fallback
// ---------------------------------------------------------------------------

/// Round-trips any value through its classic text form. Never the smallest
/// choice, always a correct one.
pub struct TextCodec;

impl FieldCodec for TextCodec {
    fn supports(&self, field_type: FieldType, method: CompressionMethod) -> bool {
        method == CompressionMethod::Text && !field_type.is_node()
    }

    fn encode(
        &self,
        out: &mut Vec<u8>,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<()> {
        write_utf(out, &value.to_classic(field_type))?;
        Ok(())
    }

    fn decode(
        &self,
        input: &mut ByteReader<'_>,
        field_type: FieldType,
    ) -> DecodeResult<FieldValue> {
        let offset = input.offset();
        let text = input.read_utf()?;
        FieldValue::parse(field_type, &text)
            .map_err(|err| DecodeError::at(offset, err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

/// The strategy table: one binding per (field type, method), plus the
/// active encode method per field type.
pub struct CodecRegistry {
    bindings: HashMap<(FieldType, CompressionMethod), Rc<dyn FieldCodec>>,
    active: HashMap<FieldType, CompressionMethod>,
    sealed: bool,
}

impl CodecRegistry {
    /// Every field type bound to the raw baseline, with the text fallback
    /// alongside.
    pub fn with_defaults() -> CodecRegistry {
        let mut registry = CodecRegistry {
            bindings: HashMap::new(),
            active: HashMap::new(),
            sealed: false,
        };

        let raw: Rc<dyn FieldCodec> = Rc::new(RawCodec);
        let text: Rc<dyn FieldCodec> = Rc::new(TextCodec);
        for tag in 1..=FieldType::MAX_TAG {
            let ty = FieldType::try_from(tag).expect("tag in range");
            if ty.is_node() {
                continue;
            }
            registry.register(ty, CompressionMethod::Text, text.clone());
            registry.register(ty, CompressionMethod::Raw, raw.clone());
        }

        registry
    }

    /// The registry a compression profile selects.
    pub fn for_profile(profile: CompressionProfile, tolerance: f32) -> CodecRegistry {
        let mut registry = CodecRegistry::with_defaults();

        if matches!(
            profile,
            CompressionProfile::SmallestNonlossy | CompressionProfile::SmallestLossy
        ) {
            let delta: Rc<dyn FieldCodec> = Rc::new(DeltaZlibCodec);
            for ty in [FieldType::MFInt32, FieldType::SFImage, FieldType::MFImage] {
                registry.register(ty, CompressionMethod::DeltaZlib, delta.clone());
            }
        }

        if profile == CompressionProfile::SmallestLossy {
            let quantized: Rc<dyn FieldCodec> = Rc::new(QuantizedZlibCodec::new(tolerance));
            for ty in [
                FieldType::MFFloat,
                FieldType::MFVec2f,
                FieldType::MFVec3f,
                FieldType::MFVec4f,
                FieldType::MFColor,
                FieldType::MFColorRGBA,
                FieldType::MFRotation,
                FieldType::MFMatrix3f,
                FieldType::MFMatrix4f,
            ] {
                registry.register(ty, CompressionMethod::QuantizedZlib, quantized.clone());
            }
        }

        registry
    }

    /// Bind a strategy. The last registration for a type selects its encode
    /// method. Rejected with a warning once the session is sealed or when
    /// the strategy disclaims the pair.
    pub fn register(
        &mut self,
        field_type: FieldType,
        method: CompressionMethod,
        codec: Rc<dyn FieldCodec>,
    ) {
        if self.sealed {
            log::warn!(
                "registry is sealed, ignoring {}/{:?} registration",
                field_type,
                method
            );
            return;
        }
        if !codec.supports(field_type, method) {
            log::warn!(
                "strategy cannot support {}/{:?}, registration ignored",
                field_type,
                method
            );
            return;
        }

        self.bindings.insert((field_type, method), codec);
        self.active.insert(field_type, method);
    }

    /// Close the registry for registration; called when document processing
    /// begins.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn active_method(&self, field_type: FieldType) -> CompressionMethod {
        self.active
            .get(&field_type)
            .copied()
            .unwrap_or(CompressionMethod::Raw)
    }

    /// Encode `value`, returning the method selector to put in the field
    /// record and the payload bytes. An unusable active binding falls back
    /// to the text strategy rather than corrupting the stream.
    pub fn encode_field(
        &self,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<(CompressionMethod, Vec<u8>)> {
        let method = self.active_method(field_type);
        let codec = match self.bindings.get(&(field_type, method)) {
            Some(codec) => codec,
            None => {
                log::warn!(
                    "no strategy for {}/{:?}, falling back to text",
                    field_type,
                    method
                );
                return self.encode_with(CompressionMethod::Text, field_type, value);
            }
        };

        let mut out = Vec::new();
        codec.encode(&mut out, field_type, value)?;
        Ok((method, out))
    }

    fn encode_with(
        &self,
        method: CompressionMethod,
        field_type: FieldType,
        value: &FieldValue,
    ) -> ExportResult<(CompressionMethod, Vec<u8>)> {
        let codec = self
            .bindings
            .get(&(field_type, method))
            .expect("text fallback is always bound");
        let mut out = Vec::new();
        codec.encode(&mut out, field_type, value)?;
        Ok((method, out))
    }

    /// Decode a payload with the method read off the wire.
    pub fn decode_field(
        &self,
        field_type: FieldType,
        method: u8,
        input: &mut ByteReader<'_>,
    ) -> DecodeResult<FieldValue> {
        let method = CompressionMethod::try_from(method).map_err(|_| {
            DecodeError::UnknownMethod { field_type, method }
        })?;
        let codec = self
            .bindings
            .get(&(field_type, method))
            .ok_or(DecodeError::UnknownMethod {
                field_type,
                method: u8::from(method),
            })?;

        codec.decode(input, field_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(
        registry: &CodecRegistry,
        field_type: FieldType,
        value: FieldValue,
    ) -> FieldValue {
        let (method, payload) = registry.encode_field(field_type, &value).unwrap();
        let mut reader = ByteReader::new(&payload);
        let decoded = registry
            .decode_field(field_type, u8::from(method), &mut reader)
            .unwrap();
        assert!(reader.is_empty(), "payload not fully consumed");
        decoded
    }

    #[test]
    fn test_raw_scalar_bytes() {
        let registry = CodecRegistry::with_defaults();
        let (method, payload) = registry
            .encode_field(FieldType::SFInt32, &FieldValue::Int(0x0102_0304))
            .unwrap();
        assert_eq!(method, CompressionMethod::Raw);
        assert_eq!(payload, vec![0x01, 0x02, 0x03, 0x04]);

        let (_, payload) = registry
            .encode_field(FieldType::SFBool, &FieldValue::Bool(true))
            .unwrap();
        assert_eq!(payload, vec![0x01]);
    }

    #[test]
    fn test_raw_fixed_vector_has_no_length() {
        let registry = CodecRegistry::with_defaults();
        let (_, payload) = registry
            .encode_field(
                FieldType::SFVec3f,
                &FieldValue::Floats(vec![1.0, 2.0, 3.0]),
            )
            .unwrap();
        assert_eq!(payload.len(), 12);

        let (_, payload) = registry
            .encode_field(FieldType::MFFloat, &FieldValue::Floats(vec![1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn test_raw_round_trips() {
        let registry = CodecRegistry::with_defaults();
        let cases = [
            (FieldType::SFBool, FieldValue::Bool(false)),
            (FieldType::SFInt32, FieldValue::Int(-5)),
            (FieldType::SFFloat, FieldValue::Float(2.75)),
            (FieldType::SFTime, FieldValue::Double(12.125)),
            (FieldType::SFString, FieldValue::Str("hello".into())),
            (
                FieldType::SFVec3f,
                FieldValue::Floats(vec![0.5, -1.5, 8.0]),
            ),
            (
                FieldType::MFInt32,
                FieldValue::Ints(vec![3, -3, 70000]),
            ),
            (
                FieldType::MFString,
                FieldValue::Strs(vec!["a".into(), "b c".into()]),
            ),
            (FieldType::MFVec3d, FieldValue::Doubles(vec![1.0; 6])),
            (FieldType::MFBool, FieldValue::Bools(vec![true, false])),
            (FieldType::MFFloat, FieldValue::Floats(Vec::new())),
        ];

        for (ty, value) in cases {
            assert_eq!(round_trip(&registry, ty, value.clone()), value, "{}", ty);
        }
    }

    #[test]
    fn test_delta_zlib_exact() {
        let registry =
            CodecRegistry::for_profile(CompressionProfile::SmallestNonlossy, 0.001);
        assert_eq!(
            registry.active_method(FieldType::MFInt32),
            CompressionMethod::DeltaZlib
        );

        let value = FieldValue::Ints(vec![1, 2, 3, 100000]);
        assert_eq!(round_trip(&registry, FieldType::MFInt32, value.clone()), value);

        let long: Vec<i32> = (0..10_000).map(|i| i * 3 - 5000).collect();
        let value = FieldValue::Ints(long);
        assert_eq!(round_trip(&registry, FieldType::MFInt32, value.clone()), value);

        let value = FieldValue::Ints(vec![i32::MIN, i32::MAX, 0, -1]);
        assert_eq!(round_trip(&registry, FieldType::MFInt32, value.clone()), value);

        let value = FieldValue::Ints(Vec::new());
        assert_eq!(round_trip(&registry, FieldType::MFInt32, value.clone()), value);
    }

    #[test]
    fn test_delta_zlib_compresses_regular_data() {
        let registry =
            CodecRegistry::for_profile(CompressionProfile::SmallestNonlossy, 0.001);
        let vals: Vec<i32> = (0..3000).collect();
        let (_, payload) = registry
            .encode_field(FieldType::MFInt32, &FieldValue::Ints(vals))
            .unwrap();
        // raw form would be 4 + 3000 * 4 bytes
        assert!(payload.len() < 1000, "payload was {} bytes", payload.len());
    }

    #[test]
    fn test_quantized_zlib_within_tolerance() {
        let tolerance = 0.001;
        let registry = CodecRegistry::for_profile(CompressionProfile::SmallestLossy, tolerance);
        assert_eq!(
            registry.active_method(FieldType::MFVec3f),
            CompressionMethod::QuantizedZlib
        );

        let vals: Vec<f32> = (0..300).map(|i| (i as f32) * 0.01 - 1.5).collect();
        let decoded = round_trip(&registry, FieldType::MFVec3f, FieldValue::Floats(vals.clone()));
        let decoded = match decoded {
            FieldValue::Floats(vals) => vals,
            other => panic!("unexpected value {:?}", other),
        };
        assert_eq!(decoded.len(), vals.len());
        for (a, b) in vals.iter().zip(&decoded) {
            assert!((a - b).abs() <= tolerance);
        }
    }

    #[test]
    fn test_quantized_zlib_exact_with_zero_tolerance() {
        let registry = CodecRegistry::for_profile(CompressionProfile::SmallestLossy, 0.0);
        let value = FieldValue::Floats(vec![1.0, -2.5, 3.25e7, 1.0e-12]);
        assert_eq!(round_trip(&registry, FieldType::MFFloat, value.clone()), value);
    }

    #[test]
    fn test_text_fallback_round_trips() {
        let codec = TextCodec;
        let value = FieldValue::Strs(vec!["quote \" inside".into()]);
        let mut out = Vec::new();
        codec.encode(&mut out, FieldType::MFString, &value).unwrap();
        let mut reader = ByteReader::new(&out);
        assert_eq!(codec.decode(&mut reader, FieldType::MFString).unwrap(), value);
    }

    #[test]
    fn test_sealed_registry_rejects_registration() {
        let mut registry = CodecRegistry::with_defaults();
        registry.seal();
        registry.register(
            FieldType::MFInt32,
            CompressionMethod::DeltaZlib,
            Rc::new(DeltaZlibCodec),
        );
        assert_eq!(
            registry.active_method(FieldType::MFInt32),
            CompressionMethod::Raw
        );
    }

    #[test]
    fn test_unsupported_registration_is_ignored() {
        let mut registry = CodecRegistry::with_defaults();
        // delta-zlib cannot encode float arrays
        registry.register(
            FieldType::MFVec3f,
            CompressionMethod::DeltaZlib,
            Rc::new(DeltaZlibCodec),
        );
        assert_eq!(
            registry.active_method(FieldType::MFVec3f),
            CompressionMethod::Raw
        );
    }

    #[test]
    fn test_unknown_method_on_decode() {
        let registry = CodecRegistry::with_defaults();
        let mut reader = ByteReader::new(&[]);
        assert!(matches!(
            registry.decode_field(FieldType::MFInt32, 1, &mut reader),
            Err(DecodeError::UnknownMethod { .. })
        ));
    }
}
