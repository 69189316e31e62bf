use std::fmt;

use parking_lot::Mutex;

use super::McdnSource;
use crate::core::decoder::{AudioSink, CancellationToken, PlaybackOutcome};
use crate::error::{Result, SourceError};
use crate::models::{PlaybackState, TrackMetadata};

/// 재생 가능한 MCDN 트랙.
/// 메타데이터와 이를 만든 리졸버에 대한 참조를 가진다. 리졸버의 수명은 관리하지 않는다.
pub struct McdnTrack<'a> {
    info: TrackMetadata,
    source: &'a McdnSource,
    state: Mutex<PlaybackState>,
}

impl<'a> McdnTrack<'a> {
    pub fn new(info: TrackMetadata, source: &'a McdnSource) -> Self {
        Self {
            info,
            source,
            state: Mutex::new(PlaybackState::Idle),
        }
    }

    pub fn info(&self) -> &TrackMetadata {
        &self.info
    }

    /// 이 트랙을 만든 리졸버. 호스트는 재인코딩이나 비교를 이 리졸버로 돌려보낸다.
    pub fn source(&self) -> &'a McdnSource {
        self.source
    }

    pub fn source_name(&self) -> &str {
        &self.info.source_name
    }

    /// 마지막 재생 호출의 상태.
    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    /// 트랙을 재생해 디코딩된 오디오를 `sink`로 보낸다.
    ///
    /// 호출마다 새 연결과 스트림을 열고, 어떤 경로로 끝나든
    /// 스트림 → 연결 순서로 해제한다.
    pub fn play(
        &self,
        sink: &mut dyn AudioSink,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        self.begin()?;

        let interface = match self.source.http_interface() {
            Ok(interface) => interface,
            Err(e) => {
                self.transition(PlaybackState::Failed);
                return Err(e);
            }
        };

        // 재생 시간(ms)은 바이트 길이가 아니므로 길이는 응답에서 얻는다.
        let stream = self
            .source
            .open_stream(&interface, &self.info.direct_url, None);

        if cancel.is_cancelled() {
            drop(stream);
            self.transition(PlaybackState::Cancelled);
            return Ok(PlaybackOutcome::Cancelled);
        }

        self.transition(PlaybackState::Decoding);
        let result = self
            .source
            .decoder()
            .decode(stream, &self.info, sink, cancel);

        self.transition(match result {
            Ok(PlaybackOutcome::Completed) => PlaybackState::Completed,
            Ok(PlaybackOutcome::Cancelled) => PlaybackState::Cancelled,
            Err(_) => PlaybackState::Failed,
        });

        drop(interface);
        result
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(PlaybackState::Idle) {
            return Err(SourceError::Stream(format!(
                "'{}' is already playing",
                self.info.title
            )));
        }
        *state = PlaybackState::StreamOpening;
        log::debug!("Opening stream for '{}': {}", self.info.title, self.info.direct_url);
        Ok(())
    }

    fn transition(&self, next: PlaybackState) {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            log::debug!("'{}': {:?} -> {:?}", self.info.title, *state, next);
            *state = next;
        } else {
            log::warn!(
                "Ignoring invalid playback transition for '{}': {:?} -> {:?}",
                self.info.title,
                *state,
                next
            );
        }
    }
}

impl Clone for McdnTrack<'_> {
    fn clone(&self) -> Self {
        Self::new(self.info.clone(), self.source)
    }
}

impl PartialEq for McdnTrack<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && std::ptr::eq(self.source, other.source)
    }
}

impl fmt::Debug for McdnTrack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McdnTrack")
            .field("info", &self.info)
            .field("state", &self.state())
            .finish()
    }
}
