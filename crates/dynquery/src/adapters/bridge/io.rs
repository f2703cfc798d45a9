use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines},
    sync::mpsc,
};

use super::protocol::BridgeResponse;
use crate::error::{AppResult, ErrorKind};

pub struct NdjsonReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> NdjsonReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: BufReader::new(input).lines(),
        }
    }

    /// Next line without its terminator; `None` at end of input.
    pub async fn read_line(&mut self) -> AppResult<Option<String>> {
        let Some(line) = self.lines.next_line().await? else {
            return Ok(None);
        };
        Ok(Some(line.trim_end_matches('\r').to_string()))
    }
}

pub struct NdjsonWriter<W> {
    out: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> NdjsonWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            out: BufWriter::new(output),
        }
    }

    pub async fn write_json_line<T: Serialize>(&mut self, v: &T) -> AppResult<()> {
        let mut buf = serde_json::to_vec(v)?;
        buf.push(b'\n');
        self.out.write_all(&buf).await?;
        self.out.flush().await?;
        Ok(())
    }

    /// Writes responses in arrival order until every sender is gone.
    pub async fn drain(
        mut self,
        mut rx: mpsc::UnboundedReceiver<BridgeResponse<serde_json::Value>>,
    ) -> AppResult<W> {
        while let Some(resp) = rx.recv().await {
            self.write_json_line(&resp).await?;
        }
        Ok(self.out.into_inner())
    }
}

pub fn protocol_error(msg: String) -> BridgeResponse<serde_json::Value> {
    // The request could not be parsed, so its id is unknown.
    BridgeResponse::err(1, String::new(), ErrorKind::Validation.code(), msg)
}
