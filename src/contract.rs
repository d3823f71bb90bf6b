use std::collections::BTreeMap;
use std::ops::Range;
use std::{fmt, fmt::Display};

/// Ticks per second of every timestamp handled by the engine (nanoseconds).
pub const TIME_UNIT: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framerate {
    num: u32,
    den: u32,
}

impl Framerate {
    pub fn new(num: u32, den: u32) -> Result<Self, ParserError> {
        if num == 0 || den == 0 {
            return Err(ParserError::InvalidConfig(format!(
                "framerate must be non-zero, got {num}/{den}"
            )));
        }
        Ok(Self { num, den })
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    /// Start of frame slot `index` on the nanosecond timeline, rounded down.
    pub fn timestamp_of(&self, index: u64) -> i64 {
        let ticks =
            i128::from(index) * i128::from(TIME_UNIT) * i128::from(self.den) / i128::from(self.num);
        i64::try_from(ticks).unwrap_or(i64::MAX)
    }
}

impl Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    AccessUnit,
    NalUnit,
}

impl Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessUnit => f.write_str("au"),
            Self::NalUnit => f.write_str("nalu"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    ConstrainedBaseline,
    Baseline,
    Main,
    Extended,
    High,
    High10,
    High422,
    High444Predictive,
    Cavlc444Intra,
    Unknown(u8),
}

impl Profile {
    /// Maps `profile_idc` and the SPS constraint flag byte to a named profile.
    pub fn from_sps_fields(profile_idc: u8, constraint_flags: u8) -> Self {
        match profile_idc {
            66 if constraint_flags & 0x40 != 0 => Self::ConstrainedBaseline,
            66 => Self::Baseline,
            77 => Self::Main,
            88 => Self::Extended,
            100 => Self::High,
            110 => Self::High10,
            122 => Self::High422,
            244 => Self::High444Predictive,
            44 => Self::Cavlc444Intra,
            other => Self::Unknown(other),
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstrainedBaseline => f.write_str("constrained_baseline"),
            Self::Baseline => f.write_str("baseline"),
            Self::Main => f.write_str("main"),
            Self::Extended => f.write_str("extended"),
            Self::High => f.write_str("high"),
            Self::High10 => f.write_str("high_10"),
            Self::High422 => f.write_str("high_422"),
            Self::High444Predictive => f.write_str("high_444_predictive"),
            Self::Cavlc444Intra => f.write_str("cavlc_444_intra"),
            Self::Unknown(idc) => write!(f, "unknown({idc})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    NonIdrSlice,
    PartitionA,
    PartitionB,
    PartitionC,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    SpsExtension,
    Prefix,
    SubsetSps,
    AuxiliarySlice,
    Other(u8),
}

impl NalType {
    pub fn from_header(header: u8) -> Self {
        match header & 0x1f {
            1 => Self::NonIdrSlice,
            2 => Self::PartitionA,
            3 => Self::PartitionB,
            4 => Self::PartitionC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::Prefix,
            15 => Self::SubsetSps,
            19 => Self::AuxiliarySlice,
            other => Self::Other(other),
        }
    }

    /// Slice data of the primary coded picture.
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::NonIdrSlice | Self::PartitionA | Self::PartitionB | Self::PartitionC | Self::IdrSlice
        )
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, Self::Sps | Self::Pps | Self::SubsetSps | Self::SpsExtension)
    }
}

/// One NAL unit inside an access unit, as byte ranges of that access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub nal_type: NalType,
    /// Start code included.
    pub prefixed: Range<usize>,
    pub unprefixed: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuMetadata {
    pub key_frame: bool,
    pub vcl_type: Option<NalType>,
    pub has_parameter_sets: bool,
}

/// Opaque per-chunk metadata, carried through to every buffer untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope(BTreeMap<String, String>);

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub payload: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub envelope: Envelope,
}

impl Chunk {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            pts: None,
            dts: None,
            envelope: Envelope::default(),
        }
    }

    #[must_use]
    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    #[must_use]
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }
}

/// Position of a NAL-aligned buffer within its access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuBoundary {
    pub starts_au: bool,
    pub ends_au: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferMetadata {
    pub envelope: Envelope,
    pub key_frame: bool,
    pub nalus: Option<Vec<NalUnit>>,
    pub au_boundary: Option<AuBoundary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub payload: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub metadata: BufferMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub profile: Profile,
    pub framerate: Option<Framerate>,
    pub alignment: Alignment,
}

impl Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamFormat({}x{}, profile={}, framerate={}, alignment={})",
            self.width,
            self.height,
            self.profile,
            self.framerate
                .map_or_else(|| "none".to_string(), |rate| rate.to_string()),
            self.alignment
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Upstream-directed: ask the source for a key frame.
    RequestKeyframe,
    Buffers(Vec<Buffer>),
    FormatChange(StreamFormat),
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionChange {
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectorReport {
    pub au_sizes: Vec<u32>,
    pub picture_numbers: Vec<u32>,
    pub resolution_changes: Vec<ResolutionChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectorFlush {
    pub au_sizes: Vec<u32>,
    pub picture_numbers: Vec<u32>,
}

impl From<DetectorFlush> for DetectorReport {
    fn from(flush: DetectorFlush) -> Self {
        Self {
            au_sizes: flush.au_sizes,
            picture_numbers: flush.picture_numbers,
            resolution_changes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    TruncatedAccessUnit { discarded_bytes: usize },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedAccessUnit { discarded_bytes } => write!(
                f,
                "discarded {discarded_bytes} bytes of an incomplete access unit at end of stream"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutput {
    pub actions: Vec<Action>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseSummary {
    pub chunks: usize,
    pub access_units: usize,
    pub skipped_access_units: usize,
    pub format_changes: usize,
    pub discarded_bytes: usize,
}

impl Display for ParseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ParseSummary(chunks={}, access_units={}, skipped_access_units={}, format_changes={}, discarded_bytes={})",
            self.chunks,
            self.access_units,
            self.skipped_access_units,
            self.format_changes,
            self.discarded_bytes
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    pub framerate: Option<Framerate>,
    /// Prepended to the first chunk only, e.g. out-of-band SPS/PPS.
    pub prefix_bytes: Vec<u8>,
    pub alignment: Alignment,
    /// Only honoured with [`Alignment::AccessUnit`].
    pub attach_nalu_list: bool,
    pub skip_until_keyframe: bool,
}

impl ParserConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = Some(framerate);
        self
    }

    #[must_use]
    pub fn with_prefix_bytes(mut self, prefix: Vec<u8>) -> Self {
        self.prefix_bytes = prefix;
        self
    }

    #[must_use]
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    #[must_use]
    pub fn with_nalu_list(mut self, attach: bool) -> Self {
        self.attach_nalu_list = attach;
        self
    }

    #[must_use]
    pub fn with_skip_until_keyframe(mut self, skip: bool) -> Self {
        self.skip_until_keyframe = skip;
        self
    }
}

impl Display for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ParserConfig(framerate={}, prefix_bytes={}, alignment={}, attach_nalu_list={}, skip_until_keyframe={})",
            self.framerate
                .map_or_else(|| "none".to_string(), |rate| rate.to_string()),
            self.prefix_bytes.len(),
            self.alignment,
            self.attach_nalu_list,
            self.skip_until_keyframe
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("failed to create boundary detector: {0}")]
    DetectorCreate(String),
    #[error("boundary detector error: {0}")]
    Detector(String),
    #[error("detector reported {reported} access unit bytes but only {available} are available")]
    ProtocolViolation { reported: usize, available: usize },
    #[error("{access_units} access units but {picture_numbers} output picture numbers")]
    PictureNumberMismatch {
        access_units: usize,
        picture_numbers: usize,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("parser halted after a previous fatal error")]
    Halted,
    #[error("stream already ended")]
    StreamEnded,
}

/// Locates access-unit boundaries in a byte stream fed incrementally.
///
/// Each `parse` call receives only the bytes not seen before; reported sizes
/// tile the stream from its first byte, an access unit may span many calls.
pub trait BoundaryDetector {
    fn parse(&mut self, bytes: &[u8]) -> Result<DetectorReport, ParserError>;

    fn flush(&mut self) -> Result<DetectorFlush, ParserError>;

    fn profile(&self) -> Profile;
}

pub trait NalClassifier {
    fn classify(&self, access_unit: &[u8]) -> (Vec<NalUnit>, AuMetadata);
}
