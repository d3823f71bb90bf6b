/// Drops access units until the first key frame when enabled.
#[derive(Debug)]
pub struct KeyframeGate {
    waiting: bool,
    request_pending: bool,
}

impl KeyframeGate {
    pub fn new(skip_until_keyframe: bool) -> Self {
        Self {
            waiting: skip_until_keyframe,
            request_pending: skip_until_keyframe,
        }
    }

    /// Returns true exactly once for an enabled gate.
    pub fn take_keyframe_request(&mut self) -> bool {
        std::mem::replace(&mut self.request_pending, false)
    }

    pub fn admit(&mut self, key_frame: bool) -> bool {
        if !self.waiting {
            return true;
        }
        if key_frame {
            self.waiting = false;
            log::info!("key frame reached, releasing access units");
            return true;
        }
        log::trace!("dropping access unit before first key frame");
        false
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }
}
