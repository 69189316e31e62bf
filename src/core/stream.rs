use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;
use symphonia::core::io::MediaSource;

use crate::core::http::{HttpInterface, HttpRequest};

// 필드 선언 순서대로 해제된다: 응답 본문이 연결 핸들보다 먼저.
struct StreamState {
    current: Option<Box<dyn Read + Send>>,
    position: u64,
    content_length: Option<u64>,
    request: HttpRequest,
    interface: Arc<dyn HttpInterface>,
}

impl StreamState {
    /// 현재 위치부터 시작하는 응답을 연다.
    fn connect(&mut self) -> io::Result<()> {
        let request = self
            .request
            .clone()
            .header("Range", format!("bytes={}-", self.position));

        let response = self
            .interface
            .execute(&request)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        match response.status {
            206 => {}
            200 if self.position == 0 => {}
            200 => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("server ignored range request at offset {}", self.position),
                ))
            }
            status => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("HTTP {} while opening {}", status, self.request.url),
                ))
            }
        }

        if self.content_length.is_none() {
            self.content_length = response
                .header("Content-Range")
                .and_then(parse_total_from_content_range)
                .or_else(|| response.content_length().map(|len| len + self.position));
        }

        log::debug!(
            "Connected to {} at offset {} (length {:?})",
            self.request.url,
            self.position,
            self.content_length
        );

        self.current = Some(response.body);
        Ok(())
    }

    fn remaining(&self) -> Option<u64> {
        self.content_length
            .map(|len| len.saturating_sub(self.position))
    }

    fn read_current(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.current.as_mut() {
            Some(body) => body.read(buf),
            None => Ok(0),
        }
    }

    fn disconnect(&mut self) {
        if self.current.take().is_some() {
            log::debug!("Released connection to {}", self.request.url);
        }
    }
}

fn parse_total_from_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

/// Range 요청으로 읽는 탐색 가능한 HTTP 스트림.
///
/// 탐색하면 새 위치에서 다시 연결하고, 서버가 범위를 잘라 보내면
/// 끊긴 위치부터 이어서 요청한다. 기대 길이가 주어지면 그 이상 읽지 않고,
/// 없으면 첫 응답의 `Content-Range`/`Content-Length`로 길이를 정한다.
pub struct PersistentHttpStream {
    state: Mutex<StreamState>,
}

impl PersistentHttpStream {
    pub fn new(
        interface: Arc<dyn HttpInterface>,
        request: HttpRequest,
        expected_length: Option<u64>,
    ) -> Self {
        Self {
            state: Mutex::new(StreamState {
                current: None,
                position: 0,
                content_length: expected_length,
                request,
                interface,
            }),
        }
    }

    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    /// 아직 연결되지 않았으면 현재 위치에서 연결해 전체 길이를 알아낸다.
    pub fn open(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.current.is_none() {
            state.connect()?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// 현재 응답을 해제한다. 다음 읽기에서 다시 연결한다.
    pub fn close(&self) {
        self.state.lock().disconnect();
    }
}

impl Read for PersistentHttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();

        if state.remaining() == Some(0) || buf.is_empty() {
            return Ok(0);
        }

        if state.current.is_none() {
            state.connect()?;
        }

        let limit = match state.remaining() {
            Some(0) => return Ok(0),
            Some(remaining) => buf.len().min(remaining.min(usize::MAX as u64) as usize),
            None => buf.len(),
        };

        let mut bytes_read = state.read_current(&mut buf[..limit])?;

        // 길이가 남았는데 본문이 끝났으면 서버가 범위를 잘라 보낸 것이다.
        if bytes_read == 0 && matches!(state.remaining(), Some(left) if left > 0) {
            log::debug!(
                "Range response for {} ended at offset {}, continuing",
                state.request.url,
                state.position
            );
            state.disconnect();
            state.connect()?;
            bytes_read = state.read_current(&mut buf[..limit])?;

            if bytes_read == 0 {
                state.disconnect();
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!(
                        "{} ended at offset {} of {:?} bytes",
                        state.request.url, state.position, state.content_length
                    ),
                ));
            }
        }

        state.position += bytes_read as u64;
        Ok(bytes_read)
    }
}

impl Seek for PersistentHttpStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut state = self.state.lock();

        let new_pos = match pos {
            SeekFrom::Start(pos) => pos,
            SeekFrom::Current(offset) => {
                if offset >= 0 {
                    state.position + offset as u64
                } else {
                    state.position.saturating_sub(offset.unsigned_abs())
                }
            }
            SeekFrom::End(offset) => {
                if state.content_length.is_none() {
                    state.connect()?;
                }
                let total = state.content_length.ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::Other,
                        "cannot seek from end: total size unknown",
                    )
                })?;
                if offset >= 0 {
                    total + offset as u64
                } else {
                    total.saturating_sub(offset.unsigned_abs())
                }
            }
        };

        if new_pos != state.position {
            state.disconnect();
            state.position = new_pos;
        }

        Ok(new_pos)
    }
}

impl MediaSource for PersistentHttpStream {
    fn is_seekable(&self) -> bool {
        self.state.lock().content_length.is_some()
    }

    fn byte_len(&self) -> Option<u64> {
        self.state.lock().content_length
    }
}
