mod track;

pub use track::McdnTrack;

use std::sync::Arc;

use reqwest::blocking::ClientBuilder;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{HttpConfig, McdnConfig};
use crate::core::decoder::{decoder_for, Container, ContainerDecoder};
use crate::core::http::{
    fetch_json, HttpInterface, HttpInterfaceManager, HttpRequest, ReqwestInterfaceManager,
    RequestConfig,
};
use crate::core::stream::PersistentHttpStream;
use crate::error::{Result, SourceError};
use crate::models::{AudioItem, LookupRequest, Playlist, TrackMetadata};
use crate::sources::MusicSource;

pub const SOURCE_NAME: &str = "mcdn";

#[derive(Deserialize)]
struct McdnTrackJson {
    id: Option<Value>,
    title: String,
    artist: String,
    #[serde(default)]
    duration: u64,
    versions: Vec<McdnVersion>,
    picture: Option<String>,
    isrc: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct McdnVersion {
    url: String,
}

/// MCDN 카탈로그 리졸버.
/// 접속 정보와 공유 HTTP 클라이언트를 소유하고, 식별자를 트랙으로 바꾼다.
/// 여러 스레드에서 동시에 조회해도 안전하다.
pub struct McdnSource {
    config: McdnConfig,
    base_url: String,
    http: Arc<dyn HttpInterfaceManager>,
    reqwest: Option<Arc<ReqwestInterfaceManager>>,
    decoder: Arc<dyn ContainerDecoder>,
}

impl McdnSource {
    /// reqwest 클라이언트를 만들어 새 리졸버를 생성한다.
    pub fn new(config: McdnConfig, http: HttpConfig) -> Result<Self> {
        let manager = Arc::new(ReqwestInterfaceManager::new(http)?);
        let mut source = Self::with_manager(config, manager.clone());
        source.reqwest = Some(manager);
        Ok(source)
    }

    /// 외부에서 만든 HTTP 매니저를 주입한다.
    pub fn with_manager(config: McdnConfig, http: Arc<dyn HttpInterfaceManager>) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            base_url,
            http,
            reqwest: None,
            decoder: decoder_for(Container::Matroska),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ContainerDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn search_url(&self, query: &str) -> String {
        format!("{}/search?q={}", self.base_url, urlencoding::encode(query))
    }

    pub fn isrc_url(&self, isrc: &str) -> String {
        format!("{}/isrc/{}", self.base_url, urlencoding::encode(isrc))
    }

    /// 식별자를 조회한다.
    ///
    /// - `mcdnsearch:` → 검색 결과 플레이리스트, 결과가 없으면 `NoTrack`
    /// - `mcdnisrc:` → 단일 트랙 또는 `NoTrack`
    /// - 그 밖의 식별자는 이 소스가 처리하지 않으므로 요청 없이 None
    pub fn load_item(&self, identifier: &str) -> Result<Option<AudioItem<McdnTrack<'_>>>> {
        let request = match LookupRequest::parse(identifier) {
            Some(request) => request,
            None => return Ok(None),
        };

        let item = match request {
            LookupRequest::Search(query) => {
                let tracks = self.search(&query)?;
                if tracks.is_empty() {
                    AudioItem::NoTrack
                } else {
                    AudioItem::Playlist(Playlist {
                        name: format!("MCDN Search: {}", query),
                        tracks: tracks
                            .into_iter()
                            .map(|info| McdnTrack::new(info, self))
                            .collect(),
                        selected: None,
                        is_search_result: true,
                    })
                }
            }
            LookupRequest::Isrc(code) => match self.lookup_isrc(&code)? {
                Some(info) => AudioItem::Track(McdnTrack::new(info, self)),
                None => AudioItem::NoTrack,
            },
        };

        Ok(Some(item))
    }

    /// 저장된 표준 필드로 트랙을 복원한다. 추가 상태는 없다.
    pub fn decode_track(&self, info: TrackMetadata) -> McdnTrack<'_> {
        McdnTrack::new(info, self)
    }

    /// 요청 하나에 쓸 연결 핸들을 얻는다. 핸들은 호출자가 버릴 때 해제된다.
    pub fn http_interface(&self) -> Result<Arc<dyn HttpInterface>> {
        self.http.interface()
    }

    /// `url`을 탐색 가능한 바이트 스트림으로 연다.
    /// 실제 연결은 첫 읽기 때 이루어진다.
    pub fn open_stream(
        &self,
        interface: &Arc<dyn HttpInterface>,
        url: &str,
        expected_length: Option<u64>,
    ) -> PersistentHttpStream {
        let request = HttpRequest::stream(url).header("User-Agent", self.config.user_agent());
        PersistentHttpStream::new(interface.clone(), request, expected_length)
    }

    pub(crate) fn decoder(&self) -> &dyn ContainerDecoder {
        self.decoder.as_ref()
    }

    /// 클라이언트 빌더 설정(프록시, TLS 등)을 추가한다.
    pub fn configure_builder<F>(&self, hook: F) -> Result<()>
    where
        F: Fn(ClientBuilder) -> ClientBuilder + Send + Sync + 'static,
    {
        match self.reqwest {
            Some(ref manager) => manager.configure_builder(hook),
            None => {
                log::warn!("Ignoring builder configuration: injected HTTP manager");
                Ok(())
            }
        }
    }

    /// 요청 단위 설정(타임아웃)을 바꾼다.
    pub fn configure_requests<F>(&self, f: F)
    where
        F: FnOnce(RequestConfig) -> RequestConfig,
    {
        match self.reqwest {
            Some(ref manager) => manager.configure_requests(f),
            None => log::warn!("Ignoring request configuration: injected HTTP manager"),
        }
    }

    /// 공유 HTTP 클라이언트를 해제한다. 실패해도 로그만 남긴다.
    pub fn shutdown(&self) {
        if let Err(e) = self.http.close() {
            log::error!("Failed to close HTTP interface manager: {}", e);
        }
    }

    fn get_json(&self, url: &str) -> Result<Option<Value>> {
        let request = HttpRequest::get(url)
            .header("Accept", "application/json")
            .header("User-Agent", self.config.user_agent())
            .header("Authorization", format!("Bearer {}", self.config.api_key));

        let interface = self.http.interface()?;
        fetch_json(interface.as_ref(), &request)
    }

    fn json_items(json: Option<Value>) -> Result<Vec<Value>> {
        match json {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(SourceError::MalformedResponse(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn parse_track(value: &Value) -> Result<TrackMetadata> {
        let track = McdnTrackJson::deserialize(value)?;

        let id = track
            .id
            .as_ref()
            .and_then(json_text)
            .ok_or_else(|| SourceError::MalformedResponse("track without id".to_string()))?;

        let direct_url = track
            .versions
            .into_iter()
            .next()
            .map(|version| version.url)
            .ok_or_else(|| {
                SourceError::MalformedResponse(format!("track {} has no versions", id))
            })?;

        Ok(TrackMetadata {
            id,
            title: track.title,
            artist: track.artist,
            duration_ms: track.duration,
            direct_url,
            artwork_url: track.picture.filter(|p| !p.is_empty()),
            isrc: track.isrc.and_then(|codes| codes.into_iter().next()),
            source_name: SOURCE_NAME.to_string(),
        })
    }
}

impl MusicSource for McdnSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn search(&self, query: &str) -> Result<Vec<TrackMetadata>> {
        let json = self.get_json(&self.search_url(query))?;
        Self::json_items(json)?
            .iter()
            .map(Self::parse_track)
            .collect()
    }

    /// 응답 배열의 첫 항목만 사용한다. 여러 건이 와도 트랙은 하나다.
    fn lookup_isrc(&self, isrc: &str) -> Result<Option<TrackMetadata>> {
        let json = self.get_json(&self.isrc_url(isrc))?;
        let first = match Self::json_items(json)?.into_iter().next() {
            Some(first) => first,
            None => return Ok(None),
        };

        if first.get("id").map_or(true, Value::is_null) {
            return Ok(None);
        }

        Self::parse_track(&first).map(Some)
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::testing::FakeManager;
    use crate::models::SearchType;

    const BASE: &str = "https://api.mcdn.example";

    fn source(manager: &Arc<FakeManager>) -> McdnSource {
        McdnSource::with_manager(McdnConfig::new(BASE, "test-key"), manager.clone())
    }

    fn track_json(id: &str, title: &str) -> String {
        format!(
            r#"{{"id":"{id}","title":"{title}","artist":"Rick Astley","duration":213000,
                "versions":[{{"url":"https://cdn.example/{id}.mka"}},{{"url":"https://cdn.example/{id}-alt.mka"}}],
                "picture":"https://img.example/{id}.jpg","isrc":["GBARL9300135"]}}"#
        )
    }

    #[test]
    fn test_search_sends_encoded_query_and_headers() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=a%20b", BASE),
            &format!("[{}]", track_json("1", "One")),
        );

        let results = source(&manager).search("a b").unwrap();
        assert_eq!(results.len(), 1);

        let request = manager.state.last_request().unwrap();
        assert_eq!(request.url, "https://api.mcdn.example/search?q=a%20b");
        assert_eq!(request.header_value("Accept"), Some("application/json"));
        assert_eq!(request.header_value("User-Agent"), Some("Lavasrc"));
        assert_eq!(request.header_value("Authorization"), Some("Bearer test-key"));
    }

    #[test]
    fn test_custom_user_agent_and_trailing_slash() {
        let manager = FakeManager::new();
        let config = McdnConfig {
            base_url: format!("{}/", BASE),
            api_key: "k".to_string(),
            user_agent: Some("MyBot/2.0".to_string()),
        };
        let source = McdnSource::with_manager(config, manager.clone());

        assert_eq!(source.isrc_url("US RC1"), "https://api.mcdn.example/isrc/US%20RC1");
        source.search("x").unwrap();
        let request = manager.state.last_request().unwrap();
        assert_eq!(request.url, "https://api.mcdn.example/search?q=x");
        assert_eq!(request.header_value("User-Agent"), Some("MyBot/2.0"));
    }

    #[test]
    fn test_track_mapping() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=rick", BASE),
            &format!("[{}]", track_json("abc", "Never Gonna Give You Up")),
        );

        let track = source(&manager).search("rick").unwrap().remove(0);
        assert_eq!(track.id, "abc");
        assert_eq!(track.title, "Never Gonna Give You Up");
        assert_eq!(track.artist, "Rick Astley");
        assert_eq!(track.duration_ms, 213_000);
        assert_eq!(track.direct_url, "https://cdn.example/abc.mka");
        assert_eq!(track.artwork_url.as_deref(), Some("https://img.example/abc.jpg"));
        assert_eq!(track.isrc.as_deref(), Some("GBARL9300135"));
        assert_eq!(track.source_name, "mcdn");
    }

    #[test]
    fn test_track_mapping_optional_fields() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=min", BASE),
            r#"[{"id":42,"title":"T","artist":"A","versions":[{"url":"https://cdn.example/42"}]}]"#,
        );

        let track = source(&manager).search("min").unwrap().remove(0);
        assert_eq!(track.id, "42");
        assert_eq!(track.duration_ms, 0);
        assert_eq!(track.artwork_url, None);
        assert_eq!(track.isrc, None);
    }

    #[test]
    fn test_search_preserves_order() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=q", BASE),
            &format!("[{},{},{}]", track_json("3", "C"), track_json("1", "A"), track_json("2", "B")),
        );

        let ids: Vec<String> = source(&manager)
            .search("q")
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_search_empty_or_missing_body() {
        let manager = FakeManager::new();
        manager.route(&format!("{}/search?q=empty", BASE), 200, b"");
        manager.route_json(&format!("{}/search?q=none", BASE), "[]");

        let source = source(&manager);
        assert!(source.search("empty").unwrap().is_empty());
        assert!(source.search("none").unwrap().is_empty());
        assert!(source.search("not-routed").unwrap().is_empty());
    }

    #[test]
    fn test_empty_versions_is_malformed() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=bad", BASE),
            r#"[{"id":"1","title":"T","artist":"A","duration":1,"versions":[]}]"#,
        );

        let err = source(&manager).search("bad").unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_versions_is_malformed() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=bad", BASE),
            r#"[{"id":"1","title":"T","artist":"A","duration":1}]"#,
        );

        let err = source(&manager).search("bad").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_non_array_body_is_malformed() {
        let manager = FakeManager::new();
        manager.route_json(&format!("{}/search?q=obj", BASE), r#"{"error":"nope"}"#);

        let err = source(&manager).search("obj").unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[test]
    fn test_request_failure_surfaces() {
        let manager = FakeManager::new();
        manager.route_failure(&format!("{}/search?q=down", BASE));

        let err = source(&manager).search("down").unwrap_err();
        assert!(matches!(err, SourceError::RequestFailed { .. }));
        assert_eq!(manager.state.request_count(), 1);
    }

    #[test]
    fn test_unknown_identifier_makes_no_request() {
        let manager = FakeManager::new();
        let source = source(&manager);

        assert!(source.load_item("ytsearch:rick").unwrap().is_none());
        assert!(source.load_item("https://cdn.example/a.mka").unwrap().is_none());
        assert!(source.load_item("").unwrap().is_none());
        assert_eq!(manager.state.request_count(), 0);
    }

    #[test]
    fn test_search_identifier_returns_playlist() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=never%20gonna", BASE),
            &format!("[{},{}]", track_json("1", "A"), track_json("2", "B")),
        );
        let source = source(&manager);

        let item = source.load_item("mcdnsearch:never gonna").unwrap().unwrap();
        assert_eq!(manager.state.request_count(), 1);
        match item {
            AudioItem::Playlist(playlist) => {
                assert_eq!(playlist.name, "MCDN Search: never gonna");
                assert!(playlist.is_search_result);
                assert_eq!(playlist.selected, None);
                assert_eq!(playlist.tracks.len(), 2);
                assert_eq!(playlist.tracks[0].info().id, "1");
                assert!(std::ptr::eq(playlist.tracks[1].source(), &source));
            }
            other => panic!("expected playlist, got {:?}", other),
        }
    }

    #[test]
    fn test_search_identifier_without_results_is_no_track() {
        let manager = FakeManager::new();
        manager.route_json(&format!("{}/search?q=zzz", BASE), "[]");

        let source = source(&manager);
        let item = source.load_item("mcdnsearch:zzz").unwrap();
        assert_eq!(item, Some(AudioItem::NoTrack));
    }

    #[test]
    fn test_isrc_identifier_empty_array_is_no_track() {
        let manager = FakeManager::new();
        manager.route_json(&format!("{}/isrc/GBARL9300135", BASE), "[]");

        let source = source(&manager);
        let item = source.load_item("mcdnisrc:GBARL9300135").unwrap();
        assert_eq!(item, Some(AudioItem::NoTrack));
        assert_eq!(manager.state.request_count(), 1);
    }

    #[test]
    fn test_isrc_identifier_null_id_is_no_track() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/isrc/GBARL9300135", BASE),
            r#"[{"id":null,"title":"T","artist":"A","versions":[]}]"#,
        );

        let source = source(&manager);
        let item = source.load_item("mcdnisrc:GBARL9300135").unwrap();
        assert_eq!(item, Some(AudioItem::NoTrack));
    }

    #[test]
    fn test_isrc_identifier_uses_first_match_only() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/isrc/GBARL9300135", BASE),
            &format!("[{},{}]", track_json("X", "First"), track_json("Y", "Second")),
        );

        let source = source(&manager);
        let item = source.load_item("mcdnisrc:GBARL9300135").unwrap().unwrap();
        match item {
            AudioItem::Track(track) => assert_eq!(track.info().id, "X"),
            other => panic!("expected single track, got {:?}", other),
        }
    }

    #[test]
    fn test_isrc_code_is_url_encoded() {
        let manager = FakeManager::new();
        let source = source(&manager);

        let item = source.load_item("mcdnisrc:US/RC 17").unwrap();
        assert_eq!(item, Some(AudioItem::NoTrack));
        assert_eq!(
            manager.state.last_request().unwrap().url,
            "https://api.mcdn.example/isrc/US%2FRC%2017"
        );
    }

    #[test]
    fn test_load_search_rejects_non_track_types_before_request() {
        let manager = FakeManager::new();
        let source = source(&manager);

        let err = source
            .load_search("rick", &[SearchType::Track, SearchType::Album])
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedSearchType(_)));
        assert_eq!(manager.state.request_count(), 0);
    }

    #[test]
    fn test_load_search_tracks() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/search?q=rick", BASE),
            &format!("[{}]", track_json("1", "A")),
        );
        let source = source(&manager);

        assert_eq!(source.load_search("rick", &[]).unwrap().tracks.len(), 1);
        assert_eq!(
            source.load_search("rick", &[SearchType::Track]).unwrap().tracks.len(),
            1
        );
    }

    #[test]
    fn test_tracks_are_encodable_without_payload() {
        let manager = FakeManager::new();
        manager.route_json(
            &format!("{}/isrc/GBARL9300135", BASE),
            &format!("[{}]", track_json("X", "First")),
        );
        let source = source(&manager);

        let info = source.lookup_isrc("GBARL9300135").unwrap().unwrap();
        assert!(source.is_track_encodable(&info));

        let mut payload = Vec::new();
        source.encode_track(&info, &mut payload).unwrap();
        assert!(payload.is_empty());

        let restored = source.decode_track(info.clone());
        assert_eq!(restored.info(), &info);
        assert_eq!(restored.source_name(), "mcdn");
    }

    #[test]
    fn test_shutdown_swallows_failures() {
        let manager = FakeManager::new();
        let source = source(&manager);

        source.shutdown();
        assert!(manager.is_closed());
        assert!(matches!(source.http_interface(), Err(SourceError::Closed)));
        assert!(matches!(source.search("x"), Err(SourceError::Closed)));

        // 두 번째 close는 매니저 안에서 실패하고 로그만 남는다
        source.shutdown();

        let failing = FakeManager::new();
        failing.fail_on_close();
        McdnSource::with_manager(McdnConfig::new(BASE, "k"), failing.clone()).shutdown();
    }

    #[test]
    fn test_concurrent_lookups() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<McdnSource>();

        let manager = FakeManager::new();
        for i in 0..4 {
            manager.route_json(
                &format!("{}/search?q=q{}", BASE, i),
                &format!("[{}]", track_json(&i.to_string(), "T")),
            );
        }
        let source = source(&manager);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let source = &source;
                    scope.spawn(move || source.search(&format!("q{}", i)).unwrap())
                })
                .collect();
            for (i, handle) in handles.into_iter().enumerate() {
                let results = handle.join().unwrap();
                assert_eq!(results[0].id, i.to_string());
            }
        });

        assert_eq!(manager.state.request_count(), 4);
        assert_eq!(manager.state.interfaces_opened(), manager.state.interfaces_released());
    }

    #[test]
    #[ignore]
    fn test_live_search() {
        let cfg = crate::config::load_config();
        let source = McdnSource::new(cfg.mcdn, cfg.http).expect("리졸버 생성 실패");
        let results = source.search("never gonna give you up").expect("검색 실패");
        assert!(!results.is_empty(), "검색 결과가 없음");
        source.shutdown();
    }
}
