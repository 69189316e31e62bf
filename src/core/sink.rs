use std::io::{self, Write};

use crate::core::decoder::{AudioFrame, AudioSink, SinkStatus};

/// 디코딩된 샘플을 little-endian f32 PCM으로 기록하는 싱크.
/// `limit_ms`가 주어지면 해당 시점 이후로는 Done을 반환한다.
pub struct PcmSink<W: Write> {
    writer: W,
    limit_ms: Option<u64>,
    frames_written: u64,
    format: Option<(usize, u32)>,
}

impl<W: Write> PcmSink<W> {
    pub fn new(writer: W, limit_ms: Option<u64>) -> Self {
        Self {
            writer,
            limit_ms,
            frames_written: 0,
            format: None,
        }
    }

    /// 기록한 프레임(채널당 샘플) 수.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// 첫 프레임의 (채널 수, 샘플레이트).
    pub fn format(&self) -> Option<(usize, u32)> {
        self.format
    }

    /// 버퍼에 남은 샘플을 모두 기록한다.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AudioSink for PcmSink<W> {
    fn write(&mut self, frame: &AudioFrame<'_>) -> io::Result<SinkStatus> {
        if let Some(limit) = self.limit_ms {
            if frame.timestamp_ms >= limit {
                self.writer.flush()?;
                return Ok(SinkStatus::Done);
            }
        }

        self.format.get_or_insert((frame.channels, frame.sample_rate));

        for sample in frame.samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.frames_written += (frame.samples.len() / frame.channels.max(1)) as u64;

        Ok(SinkStatus::Continue)
    }
}
