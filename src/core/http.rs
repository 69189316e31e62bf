use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use serde_json::Value;

use crate::config::HttpConfig;
use crate::error::{Result, SourceError};

/// GET 요청 하나.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// 본문을 길게 읽는 요청(오디오 스트림). 요청 타임아웃을 적용하지 않는다.
    pub streaming: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            streaming: false,
        }
    }

    pub fn stream(url: impl Into<String>) -> Self {
        Self {
            streaming: true,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|s| s.parse().ok())
    }
}

/// 요청을 실행하는 연결 단위 핸들. 호출자마다 하나씩 얻어 쓰고 버린다.
pub trait HttpInterface: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// 공유 HTTP 클라이언트(커넥션 풀)를 소유하고 [`HttpInterface`]를 나눠준다.
pub trait HttpInterfaceManager: Send + Sync {
    fn interface(&self) -> Result<Arc<dyn HttpInterface>>;

    /// 클라이언트를 해제한다. 이후 `interface()`는 실패한다.
    fn close(&self) -> Result<()>;
}

/// 요청 단위 설정.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestConfig {
    pub timeout: Option<Duration>,
}

type BuilderHook = Box<dyn Fn(ClientBuilder) -> ClientBuilder + Send + Sync>;

/// reqwest blocking 클라이언트 기반 매니저. 쿠키를 저장하지 않는다.
pub struct ReqwestInterfaceManager {
    settings: HttpConfig,
    builder_hooks: Mutex<Vec<BuilderHook>>,
    request_config: RwLock<RequestConfig>,
    client: RwLock<Option<Client>>,
}

impl ReqwestInterfaceManager {
    pub fn new(settings: HttpConfig) -> Result<Self> {
        let client = build_client(&settings, &[])?;
        let request_config = RequestConfig {
            timeout: Some(Duration::from_secs(settings.timeout_secs)),
        };

        Ok(Self {
            settings,
            builder_hooks: Mutex::new(Vec::new()),
            request_config: RwLock::new(request_config),
            client: RwLock::new(Some(client)),
        })
    }

    /// 클라이언트 빌더 설정을 추가하고 클라이언트를 다시 만든다.
    /// 추가된 설정은 이후 재생성에도 계속 적용된다.
    pub fn configure_builder<F>(&self, hook: F) -> Result<()>
    where
        F: Fn(ClientBuilder) -> ClientBuilder + Send + Sync + 'static,
    {
        let mut client = self.client.write();
        if client.is_none() {
            return Err(SourceError::Closed);
        }

        let mut hooks = self.builder_hooks.lock();
        hooks.push(Box::new(hook));
        *client = Some(build_client(&self.settings, &hooks)?);
        Ok(())
    }

    /// 이후 얻는 인터페이스의 요청 설정을 바꾼다.
    pub fn configure_requests<F>(&self, f: F)
    where
        F: FnOnce(RequestConfig) -> RequestConfig,
    {
        let mut config = self.request_config.write();
        *config = f(config.clone());
    }

    pub fn request_config(&self) -> RequestConfig {
        self.request_config.read().clone()
    }

    #[cfg(test)]
    fn hook_count(&self) -> usize {
        self.builder_hooks.lock().len()
    }
}

impl HttpInterfaceManager for ReqwestInterfaceManager {
    fn interface(&self) -> Result<Arc<dyn HttpInterface>> {
        let client = self.client.read().clone().ok_or(SourceError::Closed)?;
        Ok(Arc::new(ReqwestInterface {
            client,
            config: self.request_config(),
        }))
    }

    fn close(&self) -> Result<()> {
        match self.client.write().take() {
            Some(_) => Ok(()),
            None => Err(SourceError::Closed),
        }
    }
}

fn build_client(settings: &HttpConfig, hooks: &[BuilderHook]) -> Result<Client> {
    // 스트림 요청은 본문을 오래 읽으므로 클라이언트 전체 타임아웃은 두지 않는다.
    let mut builder = ClientBuilder::new()
        .timeout(None::<Duration>)
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));

    if let Some(ref proxy_url) = settings.proxy {
        let proxy = Proxy::all(proxy_url).map_err(SourceError::Client)?;
        builder = builder.proxy(proxy);
    }

    for hook in hooks {
        builder = hook(builder);
    }

    builder.build().map_err(SourceError::Client)
}

struct ReqwestInterface {
    client: Client,
    config: RequestConfig,
}

impl HttpInterface for ReqwestInterface {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        log::debug!("GET {}", request.url);

        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.streaming {
            if let Some(timeout) = self.config.timeout {
                builder = builder.timeout(timeout);
            }
        }

        let response = builder
            .send()
            .map_err(|e| SourceError::request(&request.url, e))?;

        Ok(HttpResponse {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            body: Box::new(response),
        })
    }
}

/// 요청을 실행하고 본문을 JSON으로 파싱한다.
/// 404 또는 빈 본문이면 None, 그 밖의 비정상 상태 코드는 에러.
pub fn fetch_json(interface: &dyn HttpInterface, request: &HttpRequest) -> Result<Option<Value>> {
    let mut response = interface.execute(request)?;

    if response.status == 404 {
        return Ok(None);
    }
    if !response.is_success() {
        return Err(SourceError::Status {
            url: request.url.clone(),
            status: response.status,
        });
    }

    let mut body = String::new();
    response
        .body
        .read_to_string(&mut body)
        .map_err(|e| SourceError::request(&request.url, e))?;

    if body.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&body)?))
}
