use thiserror::Error;

/// Error codes surfaced by the pipelining engine.
///
/// Codes follow Chromium's `net_error_list.h` where an equivalent exists.
/// Engine-specific codes live at -10000 and below.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic / internal
    #[error("Operation failed")]
    Failed,
    #[error("Operation aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Unexpected internal state")]
    Unexpected,
    #[error("Upload body ended before its declared size")]
    UploadFileChanged,
    #[error("Upload body cannot be rewound")]
    UploadStreamRewindNotSupported,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,

    // Engine-specific
    #[error("Socket closed by remote")]
    SocketRemoteClosed,
    #[error("Data received unexpectedly")]
    DataReceivedUnexpectedly,
    #[error("Response rejected by header callback")]
    ResponseRejected,
    #[error("Unsupported transfer encoding")]
    UnsupportedTransferEncoding,
    #[error("Invalid Content-Length")]
    InvalidContentLength,
    #[error("Server sent more data than expected")]
    ExcessResponseData,
    #[error("Upload body source returned more data than requested")]
    UploadBodyOverrun,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::Unexpected => -9,
            NetError::UploadFileChanged => -14,
            NetError::UploadStreamRewindNotSupported => -25,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::InvalidResponse => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::InvalidHttpResponse => -370,

            NetError::SocketRemoteClosed => -10000,
            NetError::DataReceivedUnexpectedly => -10001,
            NetError::ResponseRejected => -10002,
            NetError::UnsupportedTransferEncoding => -10003,
            NetError::InvalidContentLength => -10004,
            NetError::ExcessResponseData => -10005,
            NetError::UploadBodyOverrun => -10006,
            NetError::Unknown(code) => *code,
        }
    }

    /// The transport went away, or the peer closed it before the declared
    /// end of the response. Reported to callers as "disconnected".
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionRefused
                | NetError::ConnectionAborted
                | NetError::ConnectionFailed
                | NetError::SocketNotConnected
                | NetError::ConnectionTimedOut
                | NetError::EmptyResponse
                | NetError::ContentLengthMismatch
                | NetError::IncompleteChunkedEncoding
                | NetError::SocketRemoteClosed
        )
    }

    /// The peer sent bytes that violate HTTP/1.1 framing.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            NetError::InvalidResponse
                | NetError::InvalidHttpResponse
                | NetError::InvalidChunkedEncoding
                | NetError::ResponseHeadersTooBig
                | NetError::UnsupportedTransferEncoding
                | NetError::InvalidContentLength
                | NetError::ExcessResponseData
                | NetError::DataReceivedUnexpectedly
        )
    }

    /// An engine defect rather than a peer defect.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            NetError::Unexpected | NetError::UploadBodyOverrun | NetError::InvalidArgument
        )
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -9 => NetError::Unexpected,
            -14 => NetError::UploadFileChanged,
            -25 => NetError::UploadStreamRewindNotSupported,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -320 => NetError::InvalidResponse,
            -321 => NetError::InvalidChunkedEncoding,
            -324 => NetError::EmptyResponse,
            -325 => NetError::ResponseHeadersTooBig,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -370 => NetError::InvalidHttpResponse,

            -10000 => NetError::SocketRemoteClosed,
            -10001 => NetError::DataReceivedUnexpectedly,
            -10002 => NetError::ResponseRejected,
            -10003 => NetError::UnsupportedTransferEncoding,
            -10004 => NetError::InvalidContentLength,
            -10005 => NetError::ExcessResponseData,
            -10006 => NetError::UploadBodyOverrun,
            _ => NetError::Unknown(code),
        }
    }
}
