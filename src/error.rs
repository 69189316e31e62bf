use thiserror::Error;

use crate::models::SearchType;

/// MCDN 소스에서 발생하는 에러.
///
/// "결과 없음"(`AudioItem::NoTrack`)과 "처리하지 않는 식별자"(`None`)는 에러가 아니다.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("MCDN 요청에 실패했습니다 ({url}): {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("MCDN 서버가 오류로 응답했습니다 ({url}): HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("MCDN 응답 형식이 올바르지 않습니다: {0}")]
    MalformedResponse(String),

    #[error("MCDN 응답 JSON 파싱에 실패했습니다: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mcdn은 트랙만 검색할 수 있습니다 (요청: {0:?})")]
    UnsupportedSearchType(Vec<SearchType>),

    #[error("오디오 디코딩에 실패했습니다: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("스트림 오류: {0}")]
    Stream(String),

    #[error("오디오 출력에 실패했습니다: {0}")]
    Sink(#[source] std::io::Error),

    #[error("HTTP 클라이언트 생성에 실패했습니다: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP 클라이언트가 이미 종료되었습니다")]
    Closed,
}

impl SourceError {
    pub(crate) fn request(url: &str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SourceError::RequestFailed {
            url: url.to_string(),
            source: source.into(),
        }
    }

    /// API 계약 위반(필드 누락, 잘못된 JSON)인지 확인한다.
    pub fn is_malformed(&self) -> bool {
        matches!(self, SourceError::MalformedResponse(_) | SourceError::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
