// Accumulates/splits sample runs of arbitrary length into chunks of a
// fixed length and passes each complete chunk to the handler, in input
// order. The internal buffer never holds a complete chunk.

pub struct StreamChunker<F: FnMut(&[f32])> {
    handle_chunk: F,
    chunk_len: usize,
    buffer: Vec<f32>,
}

impl<F: FnMut(&[f32])> StreamChunker<F> {
    /// Wrap a chunk handler with the chunk length it expects.
    pub fn new(handle_chunk: F, chunk_len: usize) -> Self {
        assert!(chunk_len > 0);
        Self {
            handle_chunk,
            chunk_len,
            buffer: Vec::with_capacity(chunk_len),
        }
    }

    /// Append a run of samples, invoking the handler once per
    /// completed chunk.
    pub fn append(&mut self, data: &[f32]) {
        let mut consumed = 0;

        // top up a partial chunk from a previous append first
        if !self.buffer.is_empty() {
            let want = self.chunk_len - self.buffer.len();
            let take = want.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            consumed = take;
            if self.buffer.len() < self.chunk_len {
                return;
            }
            let full = std::mem::take(&mut self.buffer);
            (self.handle_chunk)(&full);
            self.buffer = full;
            self.buffer.clear();
        }

        // hand over whole chunks straight from the input
        while data.len() - consumed >= self.chunk_len {
            (self.handle_chunk)(&data[consumed..consumed + self.chunk_len]);
            consumed += self.chunk_len;
        }

        // keep the remainder (strictly less than one chunk)
        if consumed < data.len() {
            self.buffer.extend_from_slice(&data[consumed..]);
        }
    }

    /// Samples currently held back waiting for a chunk to fill.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial chunk.
    pub fn flush(&mut self) {
        self.buffer.clear();
    }
}
