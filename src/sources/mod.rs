pub mod mcdn;

use std::io::Write;

use crate::error::{Result, SourceError};
use crate::models::{SearchResult, SearchType, TrackMetadata};

/// 음악 카탈로그 소스 트레이트.
/// 호스트는 이 트레이트로 검색, ISRC 조회, 트랙 직렬화 여부를 묻는다.
pub trait MusicSource {
    /// 호스트 내부에서 소스를 구분하는 이름.
    fn name(&self) -> &str;

    /// 쿼리 문자열로 트랙을 검색한다. 결과가 없으면 빈 목록.
    fn search(&self, query: &str) -> Result<Vec<TrackMetadata>>;

    /// ISRC로 트랙 하나를 조회한다. 일치하는 트랙이 없으면 None.
    fn lookup_isrc(&self, isrc: &str) -> Result<Option<TrackMetadata>>;

    /// 결과 종류를 지정한 검색. 트랙 이외의 종류가 섞여 있으면
    /// 요청을 보내기 전에 거부한다. 빈 목록은 트랙 검색으로 취급한다.
    fn load_search(&self, query: &str, types: &[SearchType]) -> Result<SearchResult> {
        if types.iter().any(|t| *t != SearchType::Track) {
            return Err(SourceError::UnsupportedSearchType(types.to_vec()));
        }
        Ok(SearchResult {
            tracks: self.search(query)?,
        })
    }

    /// 표준 메타데이터 필드만으로 트랙을 복원할 수 있는지 여부.
    fn is_track_encodable(&self, _track: &TrackMetadata) -> bool {
        true
    }

    /// 표준 필드 이외에 기록할 상태. 기본 구현은 아무것도 쓰지 않는다.
    fn encode_track(&self, _track: &TrackMetadata, _output: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }
}
