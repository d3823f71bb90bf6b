use crate::{Action, Buffer, ResolutionChange, StreamFormat};

/// Output of one access unit that passed the key-frame gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedUnit {
    /// Position in the detector's access-unit sequence for this call.
    pub index: usize,
    pub buffers: Vec<Buffer>,
}

/// Interleaves format changes into the released units of one call.
///
/// Events are taken left to right. Each one closes the run of units whose
/// index lies below the event index, so the cut position is the event index
/// minus the units already spliced off. Empty runs produce no buffer group.
pub fn splice<F>(
    released: Vec<ReleasedUnit>,
    changes: &[ResolutionChange],
    mut format_for: F,
) -> Vec<Action>
where
    F: FnMut(&ResolutionChange) -> StreamFormat,
{
    let mut actions = Vec::with_capacity(changes.len() * 2 + 1);
    let mut tail = released.into_iter().peekable();

    for change in changes {
        let mut run = Vec::new();
        while let Some(unit) = tail.next_if(|unit| unit.index < change.index as usize) {
            run.extend(unit.buffers);
        }
        if !run.is_empty() {
            actions.push(Action::Buffers(run));
        }
        actions.push(Action::FormatChange(format_for(change)));
    }

    let rest = tail.flat_map(|unit| unit.buffers).collect::<Vec<_>>();
    if !rest.is_empty() {
        actions.push(Action::Buffers(rest));
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Alignment, BufferMetadata, Profile};

    fn unit(index: usize) -> ReleasedUnit {
        ReleasedUnit {
            index,
            buffers: vec![Buffer {
                payload: vec![index as u8],
                pts: None,
                dts: None,
                metadata: BufferMetadata::default(),
            }],
        }
    }

    fn format(change: &ResolutionChange) -> StreamFormat {
        StreamFormat {
            width: change.width,
            height: change.height,
            profile: Profile::High,
            framerate: None,
            alignment: Alignment::AccessUnit,
        }
    }

    fn payloads(action: &Action) -> Vec<u8> {
        match action {
            Action::Buffers(buffers) => buffers.iter().map(|b| b.payload[0]).collect(),
            other => panic!("expected buffers, got {other:?}"),
        }
    }

    #[test]
    fn splits_at_reported_index() {
        let units = (0..5).map(unit).collect();
        let change = ResolutionChange {
            index: 3,
            width: 1280,
            height: 720,
        };
        let actions = splice(units, &[change], format);

        assert_eq!(actions.len(), 3);
        assert_eq!(payloads(&actions[0]), vec![0, 1, 2]);
        assert!(matches!(
            actions[1],
            Action::FormatChange(StreamFormat {
                width: 1280,
                height: 720,
                ..
            })
        ));
        assert_eq!(payloads(&actions[2]), vec![3, 4]);
    }

    #[test]
    fn multiple_events_do_not_drift() {
        let units = (0..6).map(unit).collect();
        let changes = [
            ResolutionChange {
                index: 2,
                width: 640,
                height: 360,
            },
            ResolutionChange {
                index: 5,
                width: 1920,
                height: 1080,
            },
        ];
        let actions = splice(units, &changes, format);

        assert_eq!(actions.len(), 5);
        assert_eq!(payloads(&actions[0]), vec![0, 1]);
        assert_eq!(payloads(&actions[2]), vec![2, 3, 4]);
        assert_eq!(payloads(&actions[4]), vec![5]);
    }

    #[test]
    fn change_at_edges_emits_no_empty_group() {
        let units = (0..2).map(unit).collect();
        let changes = [
            ResolutionChange {
                index: 0,
                width: 320,
                height: 240,
            },
            ResolutionChange {
                index: 2,
                width: 640,
                height: 480,
            },
        ];
        let actions = splice(units, &changes, format);

        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], Action::FormatChange(_)));
        assert_eq!(payloads(&actions[1]), vec![0, 1]);
        assert!(matches!(actions[2], Action::FormatChange(_)));
    }

    #[test]
    fn holes_left_by_gating_keep_original_positions() {
        let units = vec![unit(2), unit(3)];
        let change = ResolutionChange {
            index: 3,
            width: 800,
            height: 600,
        };
        let actions = splice(units, &[change], format);

        assert_eq!(payloads(&actions[0]), vec![2]);
        assert_eq!(payloads(&actions[2]), vec![3]);
    }
}
