/// Project frame range and playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    first: i32,
    last: i32,
    current: i32,
}

impl Timeline {
    /// `first` and `last` are swapped when given in reverse order.
    pub fn new(first: i32, last: i32) -> Self {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        Self {
            first,
            last,
            current: first,
        }
    }

    pub fn first_frame(&self) -> i32 {
        self.first
    }

    pub fn last_frame(&self) -> i32 {
        self.last
    }

    pub fn current_frame(&self) -> i32 {
        self.current
    }

    pub fn frame_range(&self) -> (i32, i32) {
        (self.first, self.last)
    }

    /// Moves the playhead, clamped to the range. Returns the frame it landed on.
    pub fn seek(&mut self, frame: i32) -> i32 {
        self.current = frame.clamp(self.first, self.last);
        self.current
    }

    pub fn set_frame_range(&mut self, first: i32, last: i32) {
        let current = self.current;
        *self = Timeline::new(first, last);
        self.seek(current);
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Timeline::new(1, 100)
    }
}
