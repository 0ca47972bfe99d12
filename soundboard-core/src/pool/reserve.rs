use crate::engines::AudioOutput;

/// Stopped outputs kept for reuse so a button press does not always pay for
/// constructing a new one.
pub(crate) struct IdleReserve {
    outputs: Vec<Box<dyn AudioOutput>>,
    capacity: usize,
}

impl IdleReserve {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            outputs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Takes the most recently returned output.
    pub(crate) fn take(&mut self) -> Option<Box<dyn AudioOutput>> {
        self.outputs.pop()
    }

    /// Keeps `output` for reuse. When the reserve is full the output is
    /// dropped and false is returned.
    pub(crate) fn put(&mut self, output: Box<dyn AudioOutput>) -> bool {
        if self.outputs.len() >= self.capacity {
            return false;
        }
        self.outputs.push(output);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn clear(&mut self) {
        self.outputs.clear();
    }
}
