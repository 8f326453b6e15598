//! Splits a concatenated MJPEG byte stream (`ffmpeg -f image2pipe -c:v mjpeg`) into
//! individual JPEG images.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Bytes buffered without finding a complete image before the buffer is reset.
const MAX_BUFFERED: usize = 32 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buffer: Vec<u8>,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_BUFFERED {
            log::warn!(
                "mjpeg: discarding {} bytes without a complete image",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    /// Next complete image, if one is buffered. Bytes before its start marker are dropped.
    pub fn next_image(&mut self) -> Option<Vec<u8>> {
        let (start, end) = find_jpeg_bounds(&self.buffer)?;
        let image = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        Some(image)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == SOI)?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == EOI)
        .map(|offset| start + 2 + offset + 2)?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_images_across_chunk_boundaries() {
        let first = [0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];
        let second = [0xFF, 0xD8, 9, 0xFF, 0xD9];
        let mut stream = vec![0u8, 7];
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);

        let mut splitter = MjpegSplitter::new();
        splitter.push(&stream[..5]);
        assert!(splitter.next_image().is_none());
        splitter.push(&stream[5..]);

        assert_eq!(splitter.next_image().unwrap(), first.to_vec());
        assert_eq!(splitter.next_image().unwrap(), second.to_vec());
        assert!(splitter.next_image().is_none());
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn end_marker_must_follow_start_marker() {
        let mut splitter = MjpegSplitter::new();
        splitter.push(&[0xFF, 0xD9, 0xFF, 0xD8, 5]);
        assert!(splitter.next_image().is_none());
        splitter.push(&[0xFF, 0xD9]);
        assert_eq!(splitter.next_image().unwrap(), vec![0xFF, 0xD8, 5, 0xFF, 0xD9]);
    }
}
