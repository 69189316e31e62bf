use serde::{Deserialize, Serialize};

pub const SEARCH_PREFIX: &str = "mcdnsearch:";
pub const ISRC_PREFIX: &str = "mcdnisrc:";

/// MCDN에서 가져온 트랙 메타데이터. 생성 후에는 변경하지 않는다.
/// 식별자(`id`)는 원격 서비스가 부여한 값을 그대로 쓴다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
    pub direct_url: String,
    pub artwork_url: Option<String>,
    pub isrc: Option<String>,
    pub source_name: String,
}

impl TrackMetadata {
    pub fn display_duration(&self) -> String {
        let total_secs = self.duration_ms / 1000;
        format!("{}:{:02}", total_secs / 60, total_secs % 60)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} - {} [{}]",
            self.artist,
            self.title,
            self.display_duration()
        )
    }
}

/// 식별자 접두사로 구분되는 조회 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    Search(String),
    Isrc(String),
}

impl LookupRequest {
    /// 식별자에서 알려진 접두사를 떼어 요청을 만든다.
    /// 어느 접두사에도 해당하지 않으면 None을 반환한다.
    pub fn parse(identifier: &str) -> Option<Self> {
        if let Some(query) = identifier.strip_prefix(SEARCH_PREFIX) {
            return Some(LookupRequest::Search(query.to_string()));
        }
        if let Some(code) = identifier.strip_prefix(ISRC_PREFIX) {
            return Some(LookupRequest::Isrc(code.to_string()));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist<T> {
    pub name: String,
    pub tracks: Vec<T>,
    pub selected: Option<usize>,
    pub is_search_result: bool,
}

/// 식별자 조회 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioItem<T> {
    Track(T),
    Playlist(Playlist<T>),
    /// 응답은 정상이지만 일치하는 트랙이 없음.
    NoTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchType {
    Track,
    Album,
    Artist,
    Playlist,
    Text,
}

/// 검색 결과. 순서는 API 응답 순서를 따른다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub tracks: Vec<TrackMetadata>,
}

/// 재생 한 번의 상태. 종료 상태에서는 Idle로만 되돌아갈 수 있다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    StreamOpening,
    Decoding,
    Completed,
    Failed,
    Cancelled,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlaybackState::Completed | PlaybackState::Failed | PlaybackState::Cancelled
        )
    }

    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, next) {
            (Idle, StreamOpening) => true,
            (StreamOpening, Decoding) | (StreamOpening, Failed) | (StreamOpening, Cancelled) => {
                true
            }
            (Decoding, Completed) | (Decoding, Failed) | (Decoding, Cancelled) => true,
            (current, Idle) => current.is_terminal() || current == Idle,
            _ => false,
        }
    }
}
