//! Sandbox line protocol: length-delimited framing between [`super::SandboxSession`]
//! and its interpreter process.
//!
//! Wire shapes follow the documented request/response frames exactly
//! (`[u32 correlator][u32 length][bytes]` / `[u32 correlator][u8 status]
//! [u32 stdout_len][stdout][u32 stderr_len][stderr]`, little-endian), with one
//! addition: every frame is prefixed by a one-byte message-type tag so helper
//! traffic (`llm_query`/`llm_query_batched` calls originating inside a running
//! `execute`) can be multiplexed on the same stream without being confused
//! with the `execute`/`evaluate` response it is nested inside. This also
//! carries the final-variable evaluation as its own opcode rather than a
//! compiled code string, enforcing at the wire level that `FINAL_VAR` can
//! only ever perform an identifier lookup (see the open-question decision in
//! `DESIGN.md`).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::rlm::error::RlmError;

/// Tag byte identifying what a frame carries, sent host → child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostMessage {
    /// Execute a code string as a module body.
    Execute = 0,
    /// Evaluate a bare identifier already bound in the namespace.
    EvalIdentifier = 1,
    /// Release interpreter resources and exit.
    Terminate = 2,
    /// The answer to a helper request the child issued mid-`execute`.
    HelperResponse = 3,
}

/// Tag byte identifying what a frame carries, sent child → host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChildMessage {
    /// Interpreter is initialized and ready for the first request.
    Ready = 0,
    /// Final response to an `Execute`/`EvalIdentifier` request.
    Response = 1,
    /// A nested `llm_query`/`llm_query_batched` call issued during `execute`.
    HelperRequest = 2,
}

impl ChildMessage {
    fn from_tag(tag: u8) -> Result<Self, RlmError> {
        match tag {
            0 => Ok(Self::Ready),
            1 => Ok(Self::Response),
            2 => Ok(Self::HelperRequest),
            other => Err(RlmError::SandboxUnavailable {
                message: format!("unrecognized child message tag {other}"),
            }),
        }
    }
}

/// Outcome of one `execute`/`evaluate` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub completed_cleanly: bool,
}

/// Write `[opcode][correlator][len][body]` to `writer`.
pub async fn write_request<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    correlator: u32,
    opcode: HostMessage,
    body: &[u8],
) -> Result<(), RlmError> {
    let io_err = |e: std::io::Error| RlmError::SandboxUnavailable {
        message: format!("write failed: {e}"),
    };
    writer.write_u8(opcode as u8).await.map_err(io_err)?;
    writer.write_u32_le(correlator).await.map_err(io_err)?;
    writer.write_u32_le(body.len() as u32).await.map_err(io_err)?;
    writer.write_all(body).await.map_err(io_err)?;
    writer.flush().await.map_err(io_err)?;
    Ok(())
}

/// One frame read from the child: its message kind, correlator, and payload.
pub enum ChildFrame {
    Ready,
    Response {
        correlator: u32,
        result: ExecutionResult,
    },
    HelperRequest {
        correlator: u32,
        body: Vec<u8>,
    },
}

/// Read one frame sent by the child interpreter.
pub async fn read_child_frame<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ChildFrame, RlmError> {
    let io_err = |e: std::io::Error| RlmError::SandboxUnavailable {
        message: format!("read failed: {e}"),
    };
    let tag = ChildMessage::from_tag(reader.read_u8().await.map_err(io_err)?)?;

    // Every child frame, regardless of tag, carries the same envelope after
    // the tag byte: a correlator and a length-prefixed body (the Ready frame
    // sends an empty body but still includes both fields, matching
    // `bootstrap.py`'s single `_write_frame` helper used for every message).
    let correlator = reader.read_u32_le().await.map_err(io_err)?;
    let len = reader.read_u32_le().await.map_err(io_err)? as usize;
    let mut body = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut body).await.map_err(io_err)?;
    }

    match tag {
        ChildMessage::Ready => Ok(ChildFrame::Ready),
        ChildMessage::HelperRequest => Ok(ChildFrame::HelperRequest { correlator, body }),
        ChildMessage::Response => {
            let mut cursor = std::io::Cursor::new(body);
            let status = cursor.read_u8().await.map_err(io_err)?;
            let stdout_len = cursor.read_u32_le().await.map_err(io_err)? as usize;
            let mut stdout = vec![0u8; stdout_len];
            cursor.read_exact(&mut stdout).await.map_err(io_err)?;
            let stderr_len = cursor.read_u32_le().await.map_err(io_err)? as usize;
            let mut stderr = vec![0u8; stderr_len];
            cursor.read_exact(&mut stderr).await.map_err(io_err)?;

            Ok(ChildFrame::Response {
                correlator,
                result: ExecutionResult {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    completed_cleanly: status == 0,
                },
            })
        }
    }
}
