use crate::{BoundaryDetector, DetectorFlush, DetectorReport, NalType, ParserError, Profile};

pub const DEFAULT_MAX_ACCESS_UNIT_BYTES: usize = 64 * 1024 * 1024;

/// Incremental access-unit boundary detector for Annex-B H.264.
///
/// Only unseen bytes are passed to [`BoundaryDetector::parse`]; the detector
/// keeps the bytes of the access unit it is still building. A new access unit
/// opens before an AUD, SEI, SPS, PPS or prefix NAL, or before a slice whose
/// `first_mb_in_slice` is zero, once the current one holds a VCL NAL.
/// Picture numbers follow decode order.
#[derive(Debug)]
pub struct AnnexBDetector {
    pending: Vec<u8>,
    scan_from: usize,
    last_payload_start: Option<usize>,
    current_has_vcl: bool,
    next_picture_number: u32,
    profile: Profile,
    max_access_unit_bytes: usize,
}

impl AnnexBDetector {
    pub fn create() -> Result<Self, ParserError> {
        Self::with_limit(DEFAULT_MAX_ACCESS_UNIT_BYTES)
    }

    pub fn with_limit(max_access_unit_bytes: usize) -> Result<Self, ParserError> {
        if max_access_unit_bytes == 0 {
            return Err(ParserError::DetectorCreate(
                "access unit size limit must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            pending: Vec::new(),
            scan_from: 0,
            last_payload_start: None,
            current_has_vcl: false,
            next_picture_number: 0,
            profile: Profile::Unknown(0),
            max_access_unit_bytes,
        })
    }

    fn scan(&mut self, finalize: bool, report: &mut DetectorReport) -> Result<(), ParserError> {
        loop {
            let Some(mut code) = find_start_code_prefix(&self.pending, self.scan_from) else {
                self.scan_from = self.scan_from.max(self.pending.len().saturating_sub(2));
                break;
            };
            // header plus two bytes decide both the boundary and the SPS profile
            if !finalize && code + 6 > self.pending.len() {
                self.scan_from = code;
                break;
            }
            let Some(header) = self.pending.get(code + 3).copied() else {
                self.scan_from = code;
                break;
            };

            let lower = self.last_payload_start.unwrap_or(0);
            let start = if code > lower && self.pending[code - 1] == 0 {
                code - 1
            } else {
                code
            };

            let nal_type = NalType::from_header(header);
            let first_byte = self.pending.get(code + 4).copied();
            if nal_type == NalType::Sps {
                if let (Some(profile_idc), Some(flags)) = (first_byte, self.pending.get(code + 5)) {
                    self.profile = Profile::from_sps_fields(profile_idc, *flags);
                }
            }

            if self.current_has_vcl && opens_access_unit(nal_type, first_byte) {
                self.emit(start, report)?;
                code -= start;
            }
            if nal_type.is_vcl() {
                self.current_has_vcl = true;
            }
            self.last_payload_start = Some(code + 3);
            self.scan_from = code + 3;
        }

        if self.pending.len() > self.max_access_unit_bytes {
            return Err(ParserError::Detector(format!(
                "access unit exceeds {} bytes",
                self.max_access_unit_bytes
            )));
        }
        Ok(())
    }

    fn emit(&mut self, len: usize, report: &mut DetectorReport) -> Result<(), ParserError> {
        let size = u32::try_from(len)
            .map_err(|_| ParserError::Detector(format!("access unit of {len} bytes")))?;
        report.au_sizes.push(size);
        report.picture_numbers.push(self.next_picture_number);
        self.next_picture_number = self.next_picture_number.wrapping_add(1);
        self.pending.drain(..len);
        self.current_has_vcl = false;
        Ok(())
    }
}

impl BoundaryDetector for AnnexBDetector {
    fn parse(&mut self, bytes: &[u8]) -> Result<DetectorReport, ParserError> {
        self.pending.extend_from_slice(bytes);
        let mut report = DetectorReport::default();
        self.scan(false, &mut report)?;
        Ok(report)
    }

    fn flush(&mut self) -> Result<DetectorFlush, ParserError> {
        let mut report = DetectorReport::default();
        self.scan(true, &mut report)?;
        if self.current_has_vcl {
            self.emit(self.pending.len(), &mut report)?;
        }
        self.pending.clear();
        self.scan_from = 0;
        self.last_payload_start = None;
        self.current_has_vcl = false;

        Ok(DetectorFlush {
            au_sizes: report.au_sizes,
            picture_numbers: report.picture_numbers,
        })
    }

    fn profile(&self) -> Profile {
        self.profile
    }
}

fn find_start_code_prefix(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(3)
        .position(|window| window == [0, 0, 1])
        .map(|offset| from + offset)
}

fn opens_access_unit(nal_type: NalType, first_byte: Option<u8>) -> bool {
    match nal_type {
        NalType::AccessUnitDelimiter
        | NalType::Sei
        | NalType::Sps
        | NalType::Pps
        | NalType::Prefix
        | NalType::SubsetSps => true,
        NalType::Other(16..=18) => true,
        // first_mb_in_slice == 0 encodes as a single set bit
        NalType::NonIdrSlice | NalType::PartitionA | NalType::IdrSlice => {
            first_byte.is_none_or(|byte| byte & 0x80 != 0)
        }
        _ => false,
    }
}
