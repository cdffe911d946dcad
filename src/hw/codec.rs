//! Host sample encodings and their conversion to canonical samples.
//!
//! A [`HostSampleFormat`] is a plain description (container width, float or
//! integer, byte order, nominal full-scale range). [`SampleCodec::new`]
//! resolves it once into a pair of monomorphic conversion functions so the
//! real-time path never branches on the format per sample.

use crate::Sample;
use crate::error::{ErrorCode, PadError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Widest integer nominal range that survives an `f64` round trip,
/// rounding bias included: `aligned(64, 53, _)` and below.
pub const MAX_NOMINAL_MAGNITUDE: i64 = 1 << 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostSampleFormat {
    /// Container width in bits: 8, 16, 24 (packed), 32 or 64.
    pub scalar_width: u32,
    pub is_float: bool,
    pub big_endian: bool,
    pub nominal_min: i64,
    pub nominal_max: i64,
}

impl HostSampleFormat {
    /// Integer samples filling their whole container.
    pub const fn int(width: u32, big_endian: bool) -> Self {
        Self::aligned(width, width, big_endian)
    }

    /// `bits` of signed data right-aligned in a `width`-bit container, as in
    /// ASIO's `Int32LSB16`/`Int32LSB24` types.
    pub const fn aligned(width: u32, bits: u32, big_endian: bool) -> Self {
        let (nominal_min, nominal_max) = if bits >= 64 {
            (i64::MIN, i64::MAX)
        } else {
            let half = 1_i64 << (bits - 1);
            (-half, half - 1)
        };
        Self {
            scalar_width: width,
            is_float: false,
            big_endian,
            nominal_min,
            nominal_max,
        }
    }

    pub const fn float(width: u32, big_endian: bool) -> Self {
        Self {
            scalar_width: width,
            is_float: true,
            big_endian,
            nominal_min: -1,
            nominal_max: 1,
        }
    }

    pub const fn int8() -> Self {
        Self::int(8, false)
    }
    pub const fn int16_le() -> Self {
        Self::int(16, false)
    }
    pub const fn int16_be() -> Self {
        Self::int(16, true)
    }
    pub const fn int24_le() -> Self {
        Self::int(24, false)
    }
    pub const fn int24_be() -> Self {
        Self::int(24, true)
    }
    pub const fn int32_le() -> Self {
        Self::int(32, false)
    }
    pub const fn int32_be() -> Self {
        Self::int(32, true)
    }
    pub const fn int32_lsb16() -> Self {
        Self::aligned(32, 16, false)
    }
    pub const fn int32_lsb24() -> Self {
        Self::aligned(32, 24, false)
    }
    pub const fn float32_le() -> Self {
        Self::float(32, false)
    }
    pub const fn float32_be() -> Self {
        Self::float(32, true)
    }
    pub const fn float64_le() -> Self {
        Self::float(64, false)
    }
    pub const fn float64_be() -> Self {
        Self::float(64, true)
    }

    pub fn native_f32() -> Self {
        Self::float(32, cfg!(target_endian = "big"))
    }

    pub fn bytes(&self) -> usize {
        self.scalar_width as usize / 8
    }

    pub fn is_native_endian(&self) -> bool {
        self.big_endian == cfg!(target_endian = "big") || self.scalar_width == 8
    }

    pub fn validate(&self) -> Result<()> {
        let width_ok = if self.is_float {
            matches!(self.scalar_width, 32 | 64)
        } else {
            matches!(self.scalar_width, 8 | 16 | 24 | 32 | 64)
        };
        if !width_ok {
            return Err(PadError::soft(
                ErrorCode::UnsupportedSampleFormat,
                format!(
                    "{}-bit {} samples are not supported",
                    self.scalar_width,
                    if self.is_float { "float" } else { "integer" }
                ),
            ));
        }
        if self.nominal_min >= 0 || self.nominal_max <= 0 {
            return Err(PadError::soft(
                ErrorCode::UnsupportedSampleFormat,
                format!(
                    "nominal range [{}, {}] does not straddle zero",
                    self.nominal_min, self.nominal_max
                ),
            ));
        }
        if !self.is_float
            && (self.nominal_min < -MAX_NOMINAL_MAGNITUDE || self.nominal_max > MAX_NOMINAL_MAGNITUDE)
        {
            return Err(PadError::soft(
                ErrorCode::UnsupportedSampleFormat,
                format!(
                    "nominal range [{}, {}] is wider than a canonical sample holds exactly",
                    self.nominal_min, self.nominal_max
                ),
            ));
        }
        if !self.is_float && self.scalar_width < 64 {
            let half = 1_i64 << (self.scalar_width - 1);
            if self.nominal_min < -half || self.nominal_max > half - 1 {
                return Err(PadError::soft(
                    ErrorCode::UnsupportedSampleFormat,
                    format!(
                        "nominal range [{}, {}] exceeds a {}-bit container",
                        self.nominal_min, self.nominal_max, self.scalar_width
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToCanonical,
    FromCanonical,
}

type DecodeFn = fn(&SampleCodec, &[u8], &mut [Sample]) -> usize;
type EncodeFn = fn(&SampleCodec, &[Sample], &mut [u8]) -> usize;

#[derive(Clone, Copy)]
pub struct SampleCodec {
    format: HostSampleFormat,
    scale: f64,
    lo: f64,
    hi: f64,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl std::fmt::Debug for SampleCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleCodec")
            .field("format", &self.format)
            .finish()
    }
}

impl SampleCodec {
    pub fn new(format: HostSampleFormat) -> Result<Self> {
        format.validate()?;
        let (decode, encode) = resolve(&format);
        Ok(Self {
            format,
            scale: -(format.nominal_min as f64),
            lo: format.nominal_min as f64,
            hi: format.nominal_max as f64,
            decode,
            encode,
        })
    }

    pub fn format(&self) -> &HostSampleFormat {
        &self.format
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes()
    }

    /// Decode as many whole samples as both buffers hold; returns the count.
    pub fn decode(&self, host: &[u8], canonical: &mut [Sample]) -> usize {
        (self.decode)(self, host, canonical)
    }

    pub fn encode(&self, canonical: &[Sample], host: &mut [u8]) -> usize {
        (self.encode)(self, canonical, host)
    }

    pub fn convert(&self, direction: Direction, host: &mut [u8], canonical: &mut [Sample]) -> usize {
        match direction {
            Direction::ToCanonical => self.decode(host, canonical),
            Direction::FromCanonical => self.encode(canonical, host),
        }
    }

    pub fn to_canonical(&self, raw: &[u8]) -> Sample {
        let mut out = [0.0];
        self.decode(raw, &mut out);
        out[0]
    }

    pub fn from_canonical(&self, value: Sample, raw: &mut [u8]) {
        self.encode(&[value], raw);
    }

    /// Fill `host` with the encoding of silence.
    pub fn encode_silence(&self, host: &mut [u8]) {
        // Zero is all-zero bytes in every supported encoding.
        host.fill(0);
    }
}

trait Container {
    const BYTES: usize;
    fn read<B: ByteOrder>(buf: &[u8]) -> i64;
    fn write<B: ByteOrder>(buf: &mut [u8], value: i64);
}

struct C8;
struct C16;
struct C24;
struct C32;
struct C64;

impl Container for C8 {
    const BYTES: usize = 1;
    fn read<B: ByteOrder>(buf: &[u8]) -> i64 {
        buf[0] as i8 as i64
    }
    fn write<B: ByteOrder>(buf: &mut [u8], value: i64) {
        buf[0] = value as i8 as u8;
    }
}

impl Container for C16 {
    const BYTES: usize = 2;
    fn read<B: ByteOrder>(buf: &[u8]) -> i64 {
        B::read_i16(buf) as i64
    }
    fn write<B: ByteOrder>(buf: &mut [u8], value: i64) {
        B::write_i16(buf, value as i16);
    }
}

// Packed: exactly three bytes are touched, never a fourth.
impl Container for C24 {
    const BYTES: usize = 3;
    fn read<B: ByteOrder>(buf: &[u8]) -> i64 {
        B::read_i24(&buf[..3]) as i64
    }
    fn write<B: ByteOrder>(buf: &mut [u8], value: i64) {
        B::write_i24(&mut buf[..3], value as i32);
    }
}

impl Container for C32 {
    const BYTES: usize = 4;
    fn read<B: ByteOrder>(buf: &[u8]) -> i64 {
        B::read_i32(buf) as i64
    }
    fn write<B: ByteOrder>(buf: &mut [u8], value: i64) {
        B::write_i32(buf, value as i32);
    }
}

impl Container for C64 {
    const BYTES: usize = 8;
    fn read<B: ByteOrder>(buf: &[u8]) -> i64 {
        B::read_i64(buf)
    }
    fn write<B: ByteOrder>(buf: &mut [u8], value: i64) {
        B::write_i64(buf, value);
    }
}

fn decode_int<C: Container, B: ByteOrder>(codec: &SampleCodec, src: &[u8], dst: &mut [Sample]) -> usize {
    let mut n = 0;
    for (raw, out) in src.chunks_exact(C::BYTES).zip(dst.iter_mut()) {
        *out = C::read::<B>(raw) as f64 / codec.scale;
        n += 1;
    }
    n
}

// Round to nearest with a +0.5 bias, then clip to the nominal range.
fn encode_int<C: Container, B: ByteOrder>(codec: &SampleCodec, src: &[Sample], dst: &mut [u8]) -> usize {
    let mut n = 0;
    for (raw, &value) in dst.chunks_exact_mut(C::BYTES).zip(src.iter()) {
        let scaled = (value * codec.scale + 0.5).floor().clamp(codec.lo, codec.hi);
        C::write::<B>(raw, scaled as i64);
        n += 1;
    }
    n
}

fn decode_f32<B: ByteOrder>(_codec: &SampleCodec, src: &[u8], dst: &mut [Sample]) -> usize {
    let mut n = 0;
    for (raw, out) in src.chunks_exact(4).zip(dst.iter_mut()) {
        *out = B::read_f32(raw) as f64;
        n += 1;
    }
    n
}

// Float destinations clip only; no rounding bias.
fn encode_f32<B: ByteOrder>(codec: &SampleCodec, src: &[Sample], dst: &mut [u8]) -> usize {
    let mut n = 0;
    for (raw, &value) in dst.chunks_exact_mut(4).zip(src.iter()) {
        B::write_f32(raw, value.clamp(codec.lo, codec.hi) as f32);
        n += 1;
    }
    n
}

fn decode_f64<B: ByteOrder>(_codec: &SampleCodec, src: &[u8], dst: &mut [Sample]) -> usize {
    let mut n = 0;
    for (raw, out) in src.chunks_exact(8).zip(dst.iter_mut()) {
        *out = B::read_f64(raw);
        n += 1;
    }
    n
}

fn encode_f64<B: ByteOrder>(codec: &SampleCodec, src: &[Sample], dst: &mut [u8]) -> usize {
    let mut n = 0;
    for (raw, &value) in dst.chunks_exact_mut(8).zip(src.iter()) {
        B::write_f64(raw, value.clamp(codec.lo, codec.hi));
        n += 1;
    }
    n
}

macro_rules! int_pair {
    ($c:ty, $b:ty) => {
        (
            decode_int::<$c, $b> as DecodeFn,
            encode_int::<$c, $b> as EncodeFn,
        )
    };
}

macro_rules! float_pair {
    ($decode:ident, $encode:ident, $b:ty) => {
        ($decode::<$b> as DecodeFn, $encode::<$b> as EncodeFn)
    };
}

fn resolve(format: &HostSampleFormat) -> (DecodeFn, EncodeFn) {
    match (format.is_float, format.scalar_width, format.big_endian) {
        (true, 32, false) => float_pair!(decode_f32, encode_f32, LittleEndian),
        (true, 32, true) => float_pair!(decode_f32, encode_f32, BigEndian),
        (true, _, false) => float_pair!(decode_f64, encode_f64, LittleEndian),
        (true, _, true) => float_pair!(decode_f64, encode_f64, BigEndian),
        (false, 8, _) => int_pair!(C8, LittleEndian),
        (false, 16, false) => int_pair!(C16, LittleEndian),
        (false, 16, true) => int_pair!(C16, BigEndian),
        (false, 24, false) => int_pair!(C24, LittleEndian),
        (false, 24, true) => int_pair!(C24, BigEndian),
        (false, 32, false) => int_pair!(C32, LittleEndian),
        (false, 32, true) => int_pair!(C32, BigEndian),
        (false, _, false) => int_pair!(C64, LittleEndian),
        (false, _, true) => int_pair!(C64, BigEndian),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(format: HostSampleFormat) -> SampleCodec {
        SampleCodec::new(format).unwrap()
    }

    #[test]
    fn int16_round_trip_is_exact_in_both_byte_orders() {
        for format in [HostSampleFormat::int16_le(), HostSampleFormat::int16_be()] {
            let c = codec(format);
            let mut raw = [0_u8; 2];
            let mut back = [0_u8; 2];
            for v in i16::MIN..=i16::MAX {
                if format.big_endian {
                    BigEndian::write_i16(&mut raw, v);
                } else {
                    LittleEndian::write_i16(&mut raw, v);
                }
                c.from_canonical(c.to_canonical(&raw), &mut back);
                assert_eq!(raw, back, "value {v}");
            }
        }
    }

    #[test]
    fn int8_round_trip_is_exact() {
        let c = codec(HostSampleFormat::int8());
        for v in i8::MIN..=i8::MAX {
            let raw = [v as u8];
            let mut back = [0_u8];
            c.from_canonical(c.to_canonical(&raw), &mut back);
            assert_eq!(raw, back);
        }
    }

    #[test]
    fn known_byte_layouts() {
        let mut raw = [0_u8; 2];
        codec(HostSampleFormat::int16_be()).from_canonical(0.5, &mut raw);
        assert_eq!(raw, [0x40, 0x00]);
        codec(HostSampleFormat::int16_le()).from_canonical(0.5, &mut raw);
        assert_eq!(raw, [0x00, 0x40]);

        let mut raw24 = [0_u8; 3];
        codec(HostSampleFormat::int24_be()).from_canonical(-1.0, &mut raw24);
        assert_eq!(raw24, [0x80, 0x00, 0x00]);
    }

    #[test]
    fn packed_24_bit_never_touches_a_fourth_byte() {
        let c = codec(HostSampleFormat::int24_le());
        let mut buf = [0xAA_u8; 7];
        c.encode(&[0.25, -0.25], &mut buf[..6]);
        assert_eq!(buf[6], 0xAA);
        let mut out = [0.0; 2];
        assert_eq!(c.decode(&buf[..6], &mut out), 2);
        assert_eq!(out, [0.25, -0.25]);
    }

    #[test]
    fn overrange_clips_to_format_limits() {
        let c = codec(HostSampleFormat::int16_le());
        let mut raw = [0_u8; 2];
        c.from_canonical(1.5, &mut raw);
        assert_eq!(i16::from_le_bytes(raw), i16::MAX);
        c.from_canonical(-1.5, &mut raw);
        assert_eq!(i16::from_le_bytes(raw), i16::MIN);
        c.from_canonical(1.0, &mut raw);
        assert_eq!(i16::from_le_bytes(raw), i16::MAX);

        let c32 = codec(HostSampleFormat::int32_be());
        let mut raw32 = [0_u8; 4];
        c32.from_canonical(1.5, &mut raw32);
        assert_eq!(i32::from_be_bytes(raw32), i32::MAX);
    }

    #[test]
    fn rounding_is_to_nearest_for_negative_values() {
        let c = codec(HostSampleFormat::int16_le());
        let mut raw = [0_u8; 2];
        // -1.3 LSB rounds to -1, -1.7 LSB to -2.
        c.from_canonical(-1.3 / 32768.0, &mut raw);
        assert_eq!(i16::from_le_bytes(raw), -1);
        c.from_canonical(-1.7 / 32768.0, &mut raw);
        assert_eq!(i16::from_le_bytes(raw), -2);
    }

    #[test]
    fn float_formats_clip_without_bias() {
        let c = codec(HostSampleFormat::float32_le());
        let mut raw = [0_u8; 4];
        c.from_canonical(0.1, &mut raw);
        assert_eq!(f32::from_le_bytes(raw), 0.1_f32);
        c.from_canonical(1.5, &mut raw);
        assert_eq!(f32::from_le_bytes(raw), 1.0);

        let c64 = codec(HostSampleFormat::float64_be());
        let mut raw64 = [0_u8; 8];
        c64.from_canonical(-2.0, &mut raw64);
        assert_eq!(f64::from_be_bytes(raw64), -1.0);
        c64.from_canonical(0.123_456_789, &mut raw64);
        assert_eq!(c64.to_canonical(&raw64), 0.123_456_789);
    }

    #[test]
    fn aligned_container_uses_nominal_range() {
        let c = codec(HostSampleFormat::int32_lsb16());
        let mut raw = [0_u8; 4];
        c.from_canonical(1.5, &mut raw);
        assert_eq!(i32::from_le_bytes(raw), 32767);
        c.from_canonical(-0.5, &mut raw);
        assert_eq!(i32::from_le_bytes(raw), -16384);
        assert_eq!(c.to_canonical(&(-16384_i32).to_le_bytes()), -0.5);
    }

    #[test]
    fn validate_rejects_odd_formats() {
        assert!(SampleCodec::new(HostSampleFormat::float(16, false)).is_err());
        assert!(SampleCodec::new(HostSampleFormat::int(12, false)).is_err());
        let mut wide = HostSampleFormat::int16_le();
        wide.nominal_max = 1 << 20;
        let err = SampleCodec::new(wide).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedSampleFormat);
    }

    #[test]
    fn full_range_64_bit_integers_are_rejected() {
        for big_endian in [false, true] {
            let err = SampleCodec::new(HostSampleFormat::int(64, big_endian)).unwrap_err();
            assert_eq!(err.code, ErrorCode::UnsupportedSampleFormat);
            assert!(!err.is_hard());
        }
        assert!(SampleCodec::new(HostSampleFormat::aligned(64, 54, false)).is_err());
    }

    #[test]
    fn aligned_64_bit_round_trips_at_the_limits() {
        for big_endian in [false, true] {
            let c = codec(HostSampleFormat::aligned(64, 53, big_endian));
            let half = 1_i64 << 52;
            for v in [-half, -half + 1, -1, 0, 1, 123_456_789_012_345, half - 2, half - 1] {
                let raw = if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
                let mut back = [0_u8; 8];
                c.from_canonical(c.to_canonical(&raw), &mut back);
                assert_eq!(raw, back, "value {v}");
            }
        }
    }

    #[test]
    fn convert_dispatches_on_direction() {
        let c = codec(HostSampleFormat::int16_le());
        let mut host = [0_u8; 4];
        let mut canonical = [0.5, -0.25];
        assert_eq!(c.convert(Direction::FromCanonical, &mut host, &mut canonical), 2);
        let mut back = [0.0; 2];
        assert_eq!(c.convert(Direction::ToCanonical, &mut host, &mut back), 2);
        assert_eq!(back, canonical);
    }

    #[test]
    fn native_endian_detection() {
        assert!(HostSampleFormat::native_f32().is_native_endian());
        assert!(HostSampleFormat::int8().is_native_endian());
    }
}
