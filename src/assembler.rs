use std::mem;

use crate::ParserError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledUnit<T> {
    pub bytes: Vec<u8>,
    /// Tag of the call whose bytes this access unit starts with.
    pub origin: Option<T>,
}

/// Cuts the detector's view of the stream into access units, carrying the
/// unresolved tail over to the next call.
///
/// Every call may attach an origin tag to its bytes. The carried tail keeps
/// the offsets at which each tagged call begins, so an access unit always
/// reports the tag of the call holding its first byte.
#[derive(Debug)]
pub struct AccessUnitAssembler<T> {
    partial: Vec<u8>,
    origins: Vec<(usize, T)>,
}

impl<T> Default for AccessUnitAssembler<T> {
    fn default() -> Self {
        Self {
            partial: Vec::new(),
            origins: Vec::new(),
        }
    }
}

impl<T: Clone> AccessUnitAssembler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    /// Tag of the call in which the carried tail started.
    pub fn pending_origin(&self) -> Option<&T> {
        self.origins.first().map(|(_, origin)| origin)
    }

    /// Fails when `au_sizes` claims more bytes than carried over plus `incoming`.
    pub fn check(&self, incoming: usize, au_sizes: &[u32]) -> Result<(), ParserError> {
        let reported = au_sizes.iter().map(|size| *size as usize).sum::<usize>();
        let available = self.partial.len() + incoming;
        if reported > available {
            return Err(ParserError::ProtocolViolation {
                reported,
                available,
            });
        }
        Ok(())
    }

    pub fn assemble(
        &mut self,
        raw: &[u8],
        origin: Option<T>,
        au_sizes: &[u32],
    ) -> Result<Vec<AssembledUnit<T>>, ParserError> {
        self.check(raw.len(), au_sizes)?;

        if let Some(origin) = origin {
            let carried = self.partial.len();
            self.origins.retain(|(start, _)| *start < carried);
            self.origins.push((carried, origin));
        }
        self.partial.extend_from_slice(raw);

        let mut units = Vec::with_capacity(au_sizes.len());
        let mut cursor = 0usize;
        for size in au_sizes {
            let end = cursor + *size as usize;
            units.push(AssembledUnit {
                bytes: self.partial[cursor..end].to_vec(),
                origin: self.origin_at(cursor),
            });
            cursor = end;
        }
        self.consume(cursor);

        Ok(units)
    }

    /// Empties the carry-over buffer, returning what it held.
    pub fn take_partial(&mut self) -> Vec<u8> {
        self.origins.clear();
        mem::take(&mut self.partial)
    }

    fn origin_at(&self, offset: usize) -> Option<T> {
        self.origins
            .iter()
            .rev()
            .find(|(start, _)| *start <= offset)
            .map(|(_, origin)| origin.clone())
    }

    fn consume(&mut self, consumed: usize) {
        if consumed == 0 {
            return;
        }
        self.partial.drain(..consumed);
        if self.partial.is_empty() {
            self.origins.clear();
            return;
        }
        let keep_from = self
            .origins
            .iter()
            .rposition(|(start, _)| *start <= consumed)
            .unwrap_or(0);
        self.origins.drain(..keep_from);
        for (start, _) in &mut self.origins {
            *start = start.saturating_sub(consumed);
        }
    }
}
