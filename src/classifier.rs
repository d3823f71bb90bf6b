use crate::{AuMetadata, NalClassifier, NalType, NalUnit};

/// Splits an Annex-B access unit at its start codes and reads NAL headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct H264NalClassifier;

impl NalClassifier for H264NalClassifier {
    fn classify(&self, access_unit: &[u8]) -> (Vec<NalUnit>, AuMetadata) {
        let start_codes = find_start_codes(access_unit);
        let mut nalus: Vec<NalUnit> = Vec::with_capacity(start_codes.len());
        let mut metadata = AuMetadata::default();

        for (position, (start, start_len)) in start_codes.iter().copied().enumerate() {
            let end = start_codes
                .get(position + 1)
                .map_or(access_unit.len(), |(next, _)| *next);
            let payload_start = start + start_len;
            let Some(header) = access_unit.get(payload_start).copied() else {
                // a trailing start code with no header stays with the previous NAL
                if let Some(previous) = nalus.last_mut() {
                    previous.prefixed.end = end;
                    previous.unprefixed.end = end;
                }
                continue;
            };

            let nal_type = NalType::from_header(header);
            if nal_type.is_vcl() {
                metadata.vcl_type.get_or_insert(nal_type);
                metadata.key_frame |= nal_type == NalType::IdrSlice;
            }
            metadata.has_parameter_sets |= nal_type.is_parameter_set();

            nalus.push(NalUnit {
                nal_type,
                prefixed: start..end,
                unprefixed: payload_start..end,
            });
        }

        (nalus, metadata)
    }
}

/// Offsets and lengths of every 3- or 4-byte start code in `data`.
pub(crate) fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 3 <= data.len() {
        if i + 4 <= data.len()
            && data[i] == 0
            && data[i + 1] == 0
            && data[i + 2] == 0
            && data[i + 3] == 1
        {
            out.push((i, 4));
            i += 4;
            continue;
        }
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            out.push((i, 3));
            i += 3;
            continue;
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_frame_access_unit() {
        let au = [
            0, 0, 0, 1, 0x09, 0xF0, //
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, //
            0, 0, 1, 0x68, 0xCE, //
            0, 0, 0, 1, 0x65, 0x88, 0x84,
        ];
        let (nalus, metadata) = H264NalClassifier.classify(&au);

        let types = nalus.iter().map(|n| n.nal_type).collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                NalType::AccessUnitDelimiter,
                NalType::Sps,
                NalType::Pps,
                NalType::IdrSlice
            ]
        );
        assert_eq!(nalus[2].prefixed, 14..19);
        assert_eq!(nalus[2].unprefixed, 17..19);
        assert_eq!(nalus[3].unprefixed.end, au.len());
        assert!(metadata.key_frame);
        assert!(metadata.has_parameter_sets);
        assert_eq!(metadata.vcl_type, Some(NalType::IdrSlice));
    }

    #[test]
    fn predicted_access_unit_is_not_key() {
        let au = [0, 0, 0, 1, 0x41, 0x9A, 0x22];
        let (nalus, metadata) = H264NalClassifier.classify(&au);
        assert_eq!(nalus.len(), 1);
        assert!(!metadata.key_frame);
        assert_eq!(metadata.vcl_type, Some(NalType::NonIdrSlice));
    }

    #[test]
    fn dangling_start_code_extends_the_last_nal() {
        let au = [0, 0, 0, 1, 0x65, 0x88, 0x84, 0, 0, 1];
        let (nalus, metadata) = H264NalClassifier.classify(&au);
        assert_eq!(nalus.len(), 1);
        assert_eq!(nalus[0].prefixed, 0..au.len());
        assert_eq!(nalus[0].unprefixed, 4..au.len());
        assert!(metadata.key_frame);
    }

    #[test]
    fn bytes_without_start_code_yield_nothing() {
        let (nalus, metadata) = H264NalClassifier.classify(&[0x65, 0x88]);
        assert!(nalus.is_empty());
        assert_eq!(metadata, AuMetadata::default());
    }
}
