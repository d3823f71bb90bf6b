use std::collections::VecDeque;

mod assembler;
mod bitstream;
mod classifier;
mod contract;
mod engine;
mod keyframe_gate;
mod splicer;
mod timestamp;

pub use assembler::{AccessUnitAssembler, AssembledUnit};
pub use bitstream::{AnnexBDetector, DEFAULT_MAX_ACCESS_UNIT_BYTES};
pub use classifier::H264NalClassifier;
pub use contract::{
    Action, Alignment, AuBoundary, AuMetadata, BoundaryDetector, Buffer, BufferMetadata, Chunk,
    DetectorFlush, DetectorReport, Diagnostic, Envelope, FlushOutput, Framerate, NalClassifier,
    NalType, NalUnit, ParseSummary, ParserConfig, ParserError, Profile, ResolutionChange,
    StreamFormat, TIME_UNIT,
};
pub use engine::{EngineState, ParserEngine, Phase};
pub use keyframe_gate::KeyframeGate;
pub use splicer::{ReleasedUnit, splice};
pub use timestamp::{TimestampMode, TimestampSynchronizer, Timestamps};

/// Queues engine output so a host can pull it one action at a time.
pub struct ParseSession {
    engine: ParserEngine,
    ready: VecDeque<Action>,
}

impl ParseSession {
    pub fn new(engine: ParserEngine) -> Self {
        Self {
            engine,
            ready: VecDeque::new(),
        }
    }

    pub fn annexb(config: ParserConfig) -> Result<Self, ParserError> {
        Ok(Self::new(ParserEngine::annexb(config)?))
    }

    pub fn submit(&mut self, chunk: Chunk) -> Result<(), ParserError> {
        let actions = self.engine.process(chunk)?;
        self.ready.extend(actions);
        Ok(())
    }

    pub fn try_reap(&mut self) -> Option<Action> {
        self.ready.pop_front()
    }

    pub fn pending_actions(&self) -> usize {
        self.ready.len()
    }

    /// Flushes the engine and returns every action not reaped yet, ending
    /// with [`Action::EndOfStream`].
    pub fn finish(&mut self) -> Result<FlushOutput, ParserError> {
        let flushed = self.engine.flush()?;
        let mut actions = std::mem::take(&mut self.ready)
            .into_iter()
            .collect::<Vec<_>>();
        actions.extend(flushed.actions);
        Ok(FlushOutput {
            actions,
            diagnostics: flushed.diagnostics,
        })
    }

    pub fn summary(&self) -> ParseSummary {
        self.engine.summary()
    }

    pub fn engine(&self) -> &ParserEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_picture_stream() -> Vec<u8> {
        vec![
            0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1E, //
            0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80, //
            0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, //
            0, 0, 0, 1, 0x41, 0x9A, 0x22, 0x11,
        ]
    }

    #[test]
    fn session_queues_until_reaped() {
        let mut session = ParseSession::annexb(ParserConfig::new()).unwrap();
        session.submit(Chunk::new(two_picture_stream())).unwrap();

        assert_eq!(session.pending_actions(), 1);
        let Some(Action::Buffers(buffers)) = session.try_reap() else {
            panic!("expected the first access unit");
        };
        assert_eq!(buffers.len(), 1);
        assert!(buffers[0].metadata.key_frame);
        assert!(session.try_reap().is_none());

        let finished = session.finish().unwrap();
        assert_eq!(finished.actions.len(), 2);
        assert_eq!(finished.actions[1], Action::EndOfStream);
        assert!(finished.diagnostics.is_empty());
        assert_eq!(session.summary().access_units, 2);
    }

    #[test]
    fn session_carries_the_trailing_picture() {
        let mut session = ParseSession::annexb(ParserConfig::new()).unwrap();
        session.submit(Chunk::new(two_picture_stream())).unwrap();
        assert_eq!(session.engine().state().partial_len(), 8);
        assert_eq!(session.summary().chunks, 1);
    }
}
