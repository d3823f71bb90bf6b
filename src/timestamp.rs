use crate::{Framerate, ParserConfig, ParserError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    /// Access units inherit the timestamps of the chunk they started in.
    PassThrough,
    /// Timestamps are rebuilt from the framerate, picture numbers and decode order.
    Synthesized(Framerate),
}

impl TimestampMode {
    pub fn from_config(config: &ParserConfig) -> Self {
        match config.framerate {
            Some(rate) => Self::Synthesized(rate),
            None => Self::PassThrough,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamps {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
}

#[derive(Debug)]
pub struct TimestampSynchronizer {
    mode: TimestampMode,
    frame_counter: u64,
}

impl TimestampSynchronizer {
    pub fn new(mode: TimestampMode) -> Self {
        Self {
            mode,
            frame_counter: 0,
        }
    }

    pub fn mode(&self) -> TimestampMode {
        self.mode
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// In synthesized mode every access unit needs exactly one picture number.
    pub fn check(&self, access_units: usize, picture_numbers: usize) -> Result<(), ParserError> {
        match self.mode {
            TimestampMode::Synthesized(_) if access_units != picture_numbers => {
                Err(ParserError::PictureNumberMismatch {
                    access_units,
                    picture_numbers,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn assign(&mut self, declared: Timestamps, picture_number: Option<u32>) -> Timestamps {
        match (self.mode, picture_number) {
            (TimestampMode::Synthesized(rate), Some(picture_number)) => {
                let stamps = Timestamps {
                    pts: Some(rate.timestamp_of(u64::from(picture_number))),
                    dts: Some(rate.timestamp_of(self.frame_counter)),
                };
                self.frame_counter += 1;
                stamps
            }
            _ => declared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesized(num: u32, den: u32) -> TimestampSynchronizer {
        TimestampSynchronizer::new(TimestampMode::Synthesized(Framerate::new(num, den).unwrap()))
    }

    #[test]
    fn pass_through_keeps_declared_values() {
        let mut sync = TimestampSynchronizer::new(TimestampMode::PassThrough);
        let declared = Timestamps {
            pts: Some(1000),
            dts: Some(900),
        };
        assert_eq!(sync.assign(declared, Some(7)), declared);
        assert_eq!(sync.assign(declared, None), declared);
        assert_eq!(sync.frame_counter(), 0);
    }

    #[test]
    fn synthesized_uses_floor_division() {
        let mut sync = synthesized(30, 1);
        let declared = Timestamps::default();
        sync.assign(declared, Some(0));
        sync.assign(declared, Some(1));
        assert_eq!(sync.frame_counter(), 2);

        let stamps = sync.assign(declared, Some(2));
        assert_eq!(stamps.pts, Some(66_666_666));
        assert_eq!(stamps.dts, Some(66_666_666));
        assert_eq!(sync.frame_counter(), 3);
    }

    #[test]
    fn reordered_pictures_keep_non_monotonic_pts() {
        let mut sync = synthesized(25, 1);
        let pts = [0u32, 3, 1, 2]
            .into_iter()
            .map(|p| sync.assign(Timestamps::default(), Some(p)).pts.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(pts, vec![0, 120_000_000, 40_000_000, 80_000_000]);
    }

    #[test]
    fn fractional_rate_is_deterministic() {
        let mut sync = synthesized(30_000, 1001);
        let first = sync.assign(Timestamps::default(), Some(1));
        assert_eq!(first.pts, Some(33_366_666));
        assert_eq!(first.dts, Some(0));
    }

    #[test]
    fn mismatch_only_matters_when_synthesizing() {
        assert!(synthesized(30, 1).check(3, 2).is_err());
        assert!(synthesized(30, 1).check(2, 2).is_ok());
        assert!(
            TimestampSynchronizer::new(TimestampMode::PassThrough)
                .check(3, 0)
                .is_ok()
        );
    }
}
