use bytes::Bytes;

use super::{ContentProvider, ContentSource};

/// Request content from a fixed set of in-memory chunks.
///
/// The total length is known up front. An empty chunk list declares a
/// request without content.
pub struct BufferContent {
    chunks: Vec<Bytes>,
}

impl BufferContent {
    /// Content made of `chunks`, sent in order.
    pub fn new<I>(chunks: I) -> BufferContent
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        BufferContent {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }

    /// Content made of a single chunk.
    pub fn single(chunk: impl Into<Bytes>) -> BufferContent {
        BufferContent {
            chunks: vec![chunk.into()],
        }
    }
}

impl ContentProvider for BufferContent {
    fn length(&self) -> Option<u64> {
        Some(self.chunks.iter().map(|c| c.len() as u64).sum())
    }

    fn open(&self) -> Box<dyn ContentSource> {
        Box::new(BufferSource {
            chunks: self.chunks.clone().into_iter(),
        })
    }
}

struct BufferSource {
    chunks: std::vec::IntoIter<Bytes>,
}

impl ContentSource for BufferSource {
    fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.next()
    }

    fn is_exhausted(&self) -> bool {
        self.chunks.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_the_chunk_sum() {
        let provider = BufferContent::new([Bytes::from("hello"), Bytes::from(",world")]);
        assert_eq!(provider.length(), Some(11));
    }

    #[test]
    fn source_drains_in_order() {
        let provider = BufferContent::new([Bytes::from("a"), Bytes::from("b")]);
        let mut source = provider.open();
        assert!(!source.is_exhausted());
        assert_eq!(source.next_chunk().unwrap(), "a");
        assert_eq!(source.next_chunk().unwrap(), "b");
        assert!(source.is_exhausted());
        assert!(source.next_chunk().is_none());
    }

    #[test]
    fn each_open_is_independent() {
        let provider = BufferContent::single("once");
        let mut first = provider.open();
        let mut second = provider.open();
        assert_eq!(first.next_chunk().unwrap(), "once");
        assert_eq!(second.next_chunk().unwrap(), "once");
    }
}
