//! 라인 수집기 -- 비동기 스트림에서 로그 줄을 읽어 버퍼에 넣습니다.
//!
//! [`LineCollector`]는 임의의 [`AsyncBufRead`] (데몬에서는 stdin)에서 줄 단위로 읽고,
//! [`ParserRouter`]로 파싱한 뒤 설정된 포화 정책에 따라 [`IngestBuffer`]에 넣습니다.
//!
//! - [`BackpressurePolicy::Drop`]: `submit` 사용, 가득 차면 레코드를 버리고 계수
//! - [`BackpressurePolicy::Block`]: `put` 사용, 공간이 생길 때까지 대기
//!
//! EOF 또는 종료 신호에서 멈춥니다. 파싱 실패한 줄은 경고 로그만 남기고 건너뜁니다.
//!
//! 줄은 바이트 단위로 읽습니다. UTF-8이 아닌 바이트는 U+FFFD로 바꿔 받아들이고,
//! `max_line_length`를 넘는 줄은 메모리에 쌓지 않고 버린 뒤 파싱 에러로 셉니다.

use std::borrow::Cow;
use std::io;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use logharbor_core::metrics as m;

use crate::buffer::IngestBuffer;
use crate::config::BackpressurePolicy;
use crate::error::LogPipelineError;
use crate::parser::ParserRouter;

/// 기본 한 줄 최대 길이 (바이트)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024; // 64KB

/// 수집 결과 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// 읽은 줄 수 (빈 줄 포함)
    pub lines_read: u64,
    /// 버퍼가 수락한 레코드 수
    pub accepted: u64,
    /// 버퍼 포화로 버려진 레코드 수
    pub dropped: u64,
    /// 파싱 실패 줄 수 (길이 초과 포함)
    pub parse_errors: u64,
    /// 잘못된 UTF-8을 대체 문자로 바꿔 받아들인 줄 수
    pub invalid_utf8: u64,
}

/// 라인 수집기
pub struct LineCollector {
    /// 레코드의 소스 식별자
    source: String,
    /// 파서 형식 힌트
    format_hint: Option<String>,
    router: Arc<ParserRouter>,
    buffer: Arc<IngestBuffer>,
    policy: BackpressurePolicy,
    max_line_length: usize,
    shutdown: CancellationToken,
}

impl LineCollector {
    pub fn new(
        source: impl Into<String>,
        router: Arc<ParserRouter>,
        buffer: Arc<IngestBuffer>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source: source.into(),
            format_hint: None,
            router,
            buffer,
            policy: BackpressurePolicy::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            shutdown,
        }
    }

    /// 파서 형식 힌트를 지정합니다.
    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        self.format_hint = Some(hint.into());
        self
    }

    /// 포화 정책을 지정합니다.
    pub fn with_policy(mut self, policy: BackpressurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 한 줄 최대 길이(바이트)를 지정합니다. 0은 1로 올립니다.
    pub fn with_max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes.max(1);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// EOF 또는 종료 신호까지 스트림을 수집합니다.
    ///
    /// # Errors
    /// 스트림 읽기 I/O 에러 (그때까지의 레코드는 이미 버퍼에 들어가 있습니다)
    pub async fn run<R>(&self, mut reader: R) -> Result<CollectorStats, LogPipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut stats = CollectorStats::default();

        tracing::info!(
            source = self.source.as_str(),
            policy = %self.policy,
            max_line_length = self.max_line_length,
            "collector started"
        );

        loop {
            let next = tokio::select! {
                next = read_bounded_line(&mut reader, &mut buf, self.max_line_length) => next,
                () = self.shutdown.cancelled() => break,
            };

            let read = match next {
                Ok(read) => read,
                Err(e) => {
                    return Err(LogPipelineError::Collector {
                        source_type: self.source.clone(),
                        reason: format!("read failed: {e}"),
                    });
                }
            };

            match read {
                LineRead::Eof => {
                    tracing::debug!(source = self.source.as_str(), "collector reached EOF");
                    break;
                }
                LineRead::Oversized(len) => {
                    stats.lines_read += 1;
                    stats.parse_errors += 1;
                    metrics::counter!(m::COLLECTOR_LINES_READ_TOTAL).increment(1);
                    metrics::counter!(m::COLLECTOR_PARSE_ERRORS_TOTAL).increment(1);
                    tracing::warn!(
                        source = self.source.as_str(),
                        length = len,
                        max_line_length = self.max_line_length,
                        "line exceeds max length, skipping"
                    );
                    continue;
                }
                LineRead::Line => {}
            }

            stats.lines_read += 1;
            metrics::counter!(m::COLLECTOR_LINES_READ_TOTAL).increment(1);

            let line = String::from_utf8_lossy(&buf);
            if matches!(line, Cow::Owned(_)) {
                stats.invalid_utf8 += 1;
                tracing::debug!(
                    source = self.source.as_str(),
                    "line is not valid UTF-8, replaced invalid bytes"
                );
            }

            if line.trim().is_empty() {
                continue;
            }

            let record = match self
                .router
                .parse(&self.source, &line, self.format_hint.as_deref())
            {
                Ok(record) => record,
                Err(e) => {
                    stats.parse_errors += 1;
                    metrics::counter!(m::COLLECTOR_PARSE_ERRORS_TOTAL).increment(1);
                    tracing::warn!(
                        source = self.source.as_str(),
                        error = %e,
                        "failed to parse line, skipping"
                    );
                    continue;
                }
            };

            let accepted = match self.policy {
                BackpressurePolicy::Drop => self.buffer.submit(record),
                BackpressurePolicy::Block => {
                    if !self.buffer.put(record).await {
                        // put은 종료 신호에서만 실패
                        break;
                    }
                    true
                }
            };

            if accepted {
                stats.accepted += 1;
            } else {
                stats.dropped += 1;
            }
        }

        tracing::info!(
            source = self.source.as_str(),
            lines = stats.lines_read,
            accepted = stats.accepted,
            dropped = stats.dropped,
            parse_errors = stats.parse_errors,
            invalid_utf8 = stats.invalid_utf8,
            "collector stopped"
        );

        Ok(stats)
    }
}

/// [`read_bounded_line`]의 결과
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// 한 줄을 버퍼에 채움 (개행 제외)
    Line,
    /// 한도를 넘은 줄을 끝까지 버림 (줄 길이)
    Oversized(usize),
    Eof,
}

/// 개행까지 읽어 `line`에 채웁니다.
///
/// `max_len`을 넘는 순간부터는 바이트를 쌓지 않고 개행까지 소비만 합니다.
/// 끝의 `\r\n`/`\n`은 제거합니다. 개행 없이 끝난 마지막 줄도 한 줄로 취급합니다.
async fn read_bounded_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max_len: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut len = 0usize;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match len {
                0 => LineRead::Eof,
                n if n > max_len => LineRead::Oversized(n),
                _ => {
                    strip_cr(line);
                    LineRead::Line
                }
            });
        }

        let (chunk, newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (&available[..pos], true),
            None => (available, false),
        };
        let used = chunk.len();
        len += used;
        if len <= max_len {
            line.extend_from_slice(chunk);
        } else {
            line.clear();
        }

        reader.consume(if newline { used + 1 } else { used });

        if newline {
            return Ok(if len > max_len {
                LineRead::Oversized(len)
            } else {
                strip_cr(line);
                LineRead::Line
            });
        }
    }
}

fn strip_cr(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
}
