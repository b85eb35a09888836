use crate::capture::VideoFrame;

/// Visual transform applied to a frame when the session's effect is enabled
pub trait FrameEffect: Send + Sync {
    fn apply(&self, frame: &mut VideoFrame);
}

/// Green "digital rain" effect
///
/// Tints the frame green and overlays falling bright streaks whose position
/// advances with the frame sequence number.
#[derive(Debug, Clone)]
pub struct MatrixEffect {
    /// Horizontal distance between rain columns in pixels
    pub column_spacing: u32,
    /// Length of each streak in pixels
    pub trail_length: u32,
    /// Pixels a streak falls per frame
    pub speed: u32,
}

impl Default for MatrixEffect {
    fn default() -> Self {
        Self {
            column_spacing: 16,
            trail_length: 48,
            speed: 8,
        }
    }
}

impl MatrixEffect {
    /// Brightness of the streak at (x, y), 0.0 when outside any streak
    fn rain_intensity(&self, x: u32, y: u32, height: u32, sequence: u64) -> f32 {
        let spacing = self.column_spacing.max(1);
        if x % spacing != 0 || height == 0 {
            return 0.0;
        }

        // Each column gets its own phase so the streaks do not fall in lockstep
        let column = (x / spacing) as u64;
        let phase = column.wrapping_mul(2_654_435_761) % height as u64;
        let head = (sequence * self.speed as u64 + phase) % height as u64;
        let distance = (head + height as u64 - y as u64) % height as u64;

        if distance >= self.trail_length as u64 {
            0.0
        } else {
            1.0 - distance as f32 / self.trail_length.max(1) as f32
        }
    }
}

impl FrameEffect for MatrixEffect {
    fn apply(&self, frame: &mut VideoFrame) {
        let width = frame.width;
        let height = frame.height;
        let sequence = frame.sequence;

        for (i, px) in frame
            .data
            .chunks_exact_mut(VideoFrame::BYTES_PER_PIXEL)
            .enumerate()
        {
            let x = (i as u32) % width.max(1);
            let y = (i as u32) / width.max(1);

            let luma = 0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32;
            let rain = self.rain_intensity(x, y, height, sequence);
            let green = (luma * 0.8 + rain * 255.0).min(255.0);

            px[0] = (luma * 0.2) as u8;
            px[1] = green as u8;
            px[2] = (luma * 0.2) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tints_frame_green() {
        let mut frame = VideoFrame::blank(4, 4);
        frame.data.fill(200);

        MatrixEffect::default().apply(&mut frame);

        for px in frame.data.chunks_exact(3) {
            assert!(px[1] > px[0]);
            assert!(px[1] > px[2]);
        }
    }

    #[test]
    fn rain_moves_between_frames() {
        let effect = MatrixEffect::default();
        let height = 120;
        let head = |sequence| {
            (0..height)
                .find(|&y| effect.rain_intensity(0, y, height, sequence) == 1.0)
                .unwrap()
        };
        assert_ne!(head(0), head(1));
    }
}
