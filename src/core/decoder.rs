use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::MkvReader;

use crate::core::stream::PersistentHttpStream;
use crate::error::{Result, SourceError};
use crate::models::TrackMetadata;

/// 디코딩된 인터리브 샘플 한 묶음.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub samples: &'a [f32],
    pub channels: usize,
    pub sample_rate: u32,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Continue,
    /// 싱크가 더 이상 오디오를 받지 않는다.
    Done,
}

/// 디코딩된 오디오를 받는 쪽.
pub trait AudioSink {
    fn write(&mut self, frame: &AudioFrame<'_>) -> io::Result<SinkStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

/// 호스트가 재생을 중단시킬 때 세우는 공유 플래그.
/// 디코더는 패킷 사이마다 이 값을 확인한다.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 한 컨테이너 형식의 바이트 스트림을 오디오 프레임으로 디코딩한다.
///
/// 스트림의 소유권을 가져가며, 반환하기 전에 스트림을 해제한다.
pub trait ContainerDecoder: Send + Sync {
    fn decode(
        &self,
        stream: PersistentHttpStream,
        track: &TrackMetadata,
        sink: &mut dyn AudioSink,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Matroska,
}

pub fn decoder_for(container: Container) -> Arc<dyn ContainerDecoder> {
    match container {
        Container::Matroska => Arc::new(MatroskaDecoder),
    }
}

/// Matroska/WebM 디먹서. 코덱은 Symphonia 기본 레지스트리에서 고른다.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatroskaDecoder;

impl ContainerDecoder for MatroskaDecoder {
    fn decode(
        &self,
        stream: PersistentHttpStream,
        track: &TrackMetadata,
        sink: &mut dyn AudioSink,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        // MkvReader는 읽기 전에 전체 길이를 묻는다.
        stream
            .open()
            .map_err(|e| SourceError::Stream(format!("{}: {}", track.direct_url, e)))?;

        let media_source_stream = MediaSourceStream::new(Box::new(stream), Default::default());
        let mut reader = MkvReader::try_new(media_source_stream, &FormatOptions::default())?;

        let (track_id, codec_params) = {
            let audio_track = reader
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
                .ok_or_else(|| {
                    SourceError::Stream(format!("no audio track in {}", track.direct_url))
                })?;
            (audio_track.id, audio_track.codec_params.clone())
        };

        let mut decoder =
            symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;
        let time_base = codec_params.time_base;

        log::debug!(
            "Decoding '{}' (track {}, codec {:?})",
            track.title,
            track_id,
            codec_params.codec
        );

        loop {
            if cancel.is_cancelled() {
                log::debug!("Playback of '{}' cancelled", track.title);
                return Ok(PlaybackOutcome::Cancelled);
            }

            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(PlaybackOutcome::Completed);
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let timestamp_ms = time_base
                .map(|tb| {
                    let time = tb.calc_time(packet.ts());
                    time.seconds * 1000 + (time.frac * 1000.0) as u64
                })
                .unwrap_or(0);

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::warn!("Skipping undecodable packet in '{}': {}", track.title, msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            let frame = AudioFrame {
                samples: samples.samples(),
                channels: spec.channels.count(),
                sample_rate: spec.rate,
                timestamp_ms,
            };

            if sink.write(&frame).map_err(SourceError::Sink)? == SinkStatus::Done {
                return Ok(PlaybackOutcome::Completed);
            }
        }
    }
}
