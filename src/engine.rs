use crate::assembler::AccessUnitAssembler;
use crate::bitstream::AnnexBDetector;
use crate::classifier::H264NalClassifier;
use crate::keyframe_gate::KeyframeGate;
use crate::splicer::{ReleasedUnit, splice};
use crate::timestamp::{TimestampMode, TimestampSynchronizer, Timestamps};
use crate::{
    Action, Alignment, AuBoundary, AuMetadata, BoundaryDetector, Buffer, BufferMetadata, Chunk,
    DetectorReport, Diagnostic, Envelope, FlushOutput, Framerate, NalClassifier, NalUnit,
    ParseSummary, ParserConfig, ParserError, StreamFormat,
};

/// Timestamps and envelope of the chunk an access unit started in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Origin {
    timestamps: Timestamps,
    envelope: Envelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Halted,
    Ended,
}

/// Everything carried from one call to the next. Only the engine mutates it.
#[derive(Debug)]
pub struct EngineState {
    assembler: AccessUnitAssembler<Origin>,
    timestamps: TimestampSynchronizer,
    gate: KeyframeGate,
    alignment: Alignment,
    attach_nalu_list: bool,
    framerate: Option<Framerate>,
    prefix: Option<Vec<u8>>,
    phase: Phase,
    summary: ParseSummary,
}

impl EngineState {
    pub fn new(config: ParserConfig) -> Self {
        let mode = TimestampMode::from_config(&config);
        let ParserConfig {
            framerate,
            prefix_bytes,
            alignment,
            attach_nalu_list,
            skip_until_keyframe,
        } = config;
        Self {
            assembler: AccessUnitAssembler::new(),
            timestamps: TimestampSynchronizer::new(mode),
            gate: KeyframeGate::new(skip_until_keyframe),
            alignment,
            attach_nalu_list,
            framerate,
            prefix: (!prefix_bytes.is_empty()).then_some(prefix_bytes),
            phase: Phase::Running,
            summary: ParseSummary::default(),
        }
    }

    pub fn partial_len(&self) -> usize {
        self.assembler.partial_len()
    }

    /// Timestamps of the chunk in which the carried partial access unit began.
    pub fn pending_timestamps(&self) -> Option<(Option<i64>, Option<i64>)> {
        self.assembler
            .pending_origin()
            .map(|origin| (origin.timestamps.pts, origin.timestamps.dts))
    }

    pub fn frame_counter(&self) -> u64 {
        self.timestamps.frame_counter()
    }

    pub fn timestamp_mode(&self) -> TimestampMode {
        self.timestamps.mode()
    }

    pub fn awaiting_keyframe(&self) -> bool {
        self.gate.is_waiting()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn buffers_for(
        &self,
        bytes: Vec<u8>,
        nalus: Vec<NalUnit>,
        au: AuMetadata,
        stamps: Timestamps,
        envelope: Envelope,
    ) -> Vec<Buffer> {
        let metadata = BufferMetadata {
            envelope,
            key_frame: au.key_frame,
            nalus: None,
            au_boundary: None,
        };
        if self.alignment == Alignment::AccessUnit || nalus.is_empty() {
            let au_boundary = (self.alignment == Alignment::NalUnit).then_some(AuBoundary {
                starts_au: true,
                ends_au: true,
            });
            let nalus = (self.alignment == Alignment::AccessUnit && self.attach_nalu_list)
                .then_some(nalus);
            return vec![Buffer {
                payload: bytes,
                pts: stamps.pts,
                dts: stamps.dts,
                metadata: BufferMetadata {
                    nalus,
                    au_boundary,
                    ..metadata
                },
            }];
        }

        let last = nalus.len() - 1;
        nalus
            .iter()
            .enumerate()
            .map(|(position, nalu)| {
                // bytes ahead of the first start code ride with the first NAL
                let start = if position == 0 { 0 } else { nalu.prefixed.start };
                let end = if position == last {
                    bytes.len()
                } else {
                    nalu.prefixed.end
                };
                Buffer {
                    payload: bytes[start..end].to_vec(),
                    pts: stamps.pts,
                    dts: stamps.dts,
                    metadata: BufferMetadata {
                        au_boundary: Some(AuBoundary {
                            starts_au: position == 0,
                            ends_au: position == last,
                        }),
                        ..metadata.clone()
                    },
                }
            })
            .collect()
    }
}

/// Turns detector reports into ordered output actions for one stream.
pub struct ParserEngine {
    detector: Box<dyn BoundaryDetector>,
    classifier: Box<dyn NalClassifier>,
    state: EngineState,
}

impl ParserEngine {
    pub fn new(
        config: ParserConfig,
        detector: Box<dyn BoundaryDetector>,
        classifier: Box<dyn NalClassifier>,
    ) -> Self {
        log::debug!("starting parser engine: {config}");
        Self {
            detector,
            classifier,
            state: EngineState::new(config),
        }
    }

    /// Engine over the built-in Annex-B detector and NAL classifier.
    pub fn annexb(config: ParserConfig) -> Result<Self, ParserError> {
        let detector = AnnexBDetector::create()?;
        Ok(Self::new(
            config,
            Box::new(detector),
            Box::new(H264NalClassifier),
        ))
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn summary(&self) -> ParseSummary {
        self.state.summary
    }

    /// Stream-start actions. The key-frame request is produced at most once;
    /// `process` and `flush` call this themselves.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state.gate.take_keyframe_request() {
            log::debug!("requesting key frame from upstream");
            vec![Action::RequestKeyframe]
        } else {
            Vec::new()
        }
    }

    pub fn process(&mut self, chunk: Chunk) -> Result<Vec<Action>, ParserError> {
        self.ensure_running()?;
        let mut actions = self.start();

        let Chunk {
            payload,
            pts,
            dts,
            envelope,
        } = chunk;
        let payload = match self.state.prefix.take() {
            Some(mut prefixed) => {
                prefixed.extend_from_slice(&payload);
                prefixed
            }
            None => payload,
        };

        let report = match self.detector.parse(&payload) {
            Ok(report) => report,
            Err(err) => return Err(self.halt(err)),
        };
        let origin = Origin {
            timestamps: Timestamps { pts, dts },
            envelope,
        };
        let produced = self
            .release(&payload, Some(origin), report)
            .map_err(|err| self.halt(err))?;

        self.state.summary.chunks += 1;
        log::debug!(
            "chunk of {} bytes produced {} actions, {} bytes carried over",
            payload.len(),
            produced.len(),
            self.state.partial_len()
        );
        actions.extend(produced);
        Ok(actions)
    }

    /// Drains the detector at end of stream. Whatever is still carried over
    /// afterwards is dropped and reported as a diagnostic.
    pub fn flush(&mut self) -> Result<FlushOutput, ParserError> {
        self.ensure_running()?;
        let mut actions = self.start();

        let flushed = match self.detector.flush() {
            Ok(flushed) => flushed,
            Err(err) => return Err(self.halt(err)),
        };
        let produced = self
            .release(&[], None, flushed.into())
            .map_err(|err| self.halt(err))?;
        actions.extend(produced);

        let mut diagnostics = Vec::new();
        let leftover = self.state.assembler.take_partial();
        if !leftover.is_empty() {
            log::debug!("dropping {} trailing bytes at end of stream", leftover.len());
            self.state.summary.discarded_bytes += leftover.len();
            diagnostics.push(Diagnostic::TruncatedAccessUnit {
                discarded_bytes: leftover.len(),
            });
        }

        actions.push(Action::EndOfStream);
        self.state.phase = Phase::Ended;
        Ok(FlushOutput {
            actions,
            diagnostics,
        })
    }

    fn release(
        &mut self,
        payload: &[u8],
        origin: Option<Origin>,
        report: DetectorReport,
    ) -> Result<Vec<Action>, ParserError> {
        let DetectorReport {
            au_sizes,
            picture_numbers,
            resolution_changes,
        } = report;
        let state = &mut self.state;

        state.assembler.check(payload.len(), &au_sizes)?;
        state
            .timestamps
            .check(au_sizes.len(), picture_numbers.len())?;
        let units = state.assembler.assemble(payload, origin, &au_sizes)?;

        let mut released = Vec::with_capacity(units.len());
        for (index, unit) in units.into_iter().enumerate() {
            let (nalus, au) = self.classifier.classify(&unit.bytes);
            if !state.gate.admit(au.key_frame) {
                state.summary.skipped_access_units += 1;
                continue;
            }

            let origin = unit.origin.unwrap_or_default();
            let stamps = state
                .timestamps
                .assign(origin.timestamps, picture_numbers.get(index).copied());
            let buffers = state.buffers_for(unit.bytes, nalus, au, stamps, origin.envelope);
            state.summary.access_units += 1;
            released.push(ReleasedUnit { index, buffers });
        }

        let profile = self.detector.profile();
        let framerate = state.framerate;
        let alignment = state.alignment;
        state.summary.format_changes += resolution_changes.len();
        Ok(splice(released, &resolution_changes, |change| {
            StreamFormat {
                width: change.width,
                height: change.height,
                profile,
                framerate,
                alignment,
            }
        }))
    }

    fn ensure_running(&self) -> Result<(), ParserError> {
        match self.state.phase {
            Phase::Running => Ok(()),
            Phase::Halted => Err(ParserError::Halted),
            Phase::Ended => Err(ParserError::StreamEnded),
        }
    }

    fn halt(&mut self, err: ParserError) -> ParserError {
        log::debug!("halting parser engine: {err}");
        self.state.phase = Phase::Halted;
        err
    }
}
