//! In-memory transport for tests.
//!
//! Reads are served from a script of events; writes, connects, resets and
//! no-delay toggles are recorded for inspection.

use crate::base::neterror::NetError;
use crate::socket::transport::{reuse_decision, ConnectStatus, ConnectTarget, Transport};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::io::{self, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Data(Bytes),
    WouldBlock,
    Eof,
    Error(ErrorKind),
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    reads: VecDeque<ReadEvent>,
    written: BytesMut,
    connects: Vec<(ConnectTarget, bool)>,
    nodelay: Vec<bool>,
    resets: usize,
    connected: Option<ConnectTarget>,
    max_write: Option<usize>,
    blocked_writes: usize,
    delayed_connects: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_data(&mut self, data: impl AsRef<[u8]>) {
        self.reads
            .push_back(ReadEvent::Data(Bytes::copy_from_slice(data.as_ref())));
    }

    /// Queue `data` to be returned one byte per read.
    pub fn push_bytewise(&mut self, data: impl AsRef<[u8]>) {
        for byte in data.as_ref() {
            self.reads
                .push_back(ReadEvent::Data(Bytes::copy_from_slice(&[*byte])));
        }
    }

    pub fn push_would_block(&mut self) {
        self.reads.push_back(ReadEvent::WouldBlock);
    }

    pub fn push_eof(&mut self) {
        self.reads.push_back(ReadEvent::Eof);
    }

    pub fn push_error(&mut self, kind: ErrorKind) {
        self.reads.push_back(ReadEvent::Error(kind));
    }

    /// Accept at most `n` bytes per write.
    pub fn limit_writes(&mut self, n: usize) {
        self.max_write = Some(n.max(1));
    }

    /// Fail the next `n` writes with `WouldBlock`.
    pub fn block_writes(&mut self, n: usize) {
        self.blocked_writes = n;
    }

    /// Answer the next `n` fresh connects with `Pending`.
    pub fn delay_connects(&mut self, n: usize) {
        self.delayed_connects = n;
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    pub fn take_written(&mut self) -> Bytes {
        self.written.split().freeze()
    }

    /// Every connect call as `(target, first_on_connection)`.
    pub fn connects(&self) -> &[(ConnectTarget, bool)] {
        &self.connects
    }

    pub fn nodelay_calls(&self) -> &[bool] {
        &self.nodelay
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.connected.is_none() {
            return Err(ErrorKind::NotConnected.into());
        }
        match self.reads.pop_front() {
            Some(ReadEvent::Data(mut data)) => {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.reads.push_front(ReadEvent::Data(rest));
                }
                Ok(n)
            }
            Some(ReadEvent::Eof) => Ok(0),
            Some(ReadEvent::Error(kind)) => Err(kind.into()),
            Some(ReadEvent::WouldBlock) | None => Err(ErrorKind::WouldBlock.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.connected.is_none() {
            return Err(ErrorKind::NotConnected.into());
        }
        if self.blocked_writes > 0 {
            self.blocked_writes -= 1;
            return Err(ErrorKind::WouldBlock.into());
        }
        let n = self.max_write.map_or(buf.len(), |max| buf.len().min(max));
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        use_tls: bool,
        first_on_connection: bool,
    ) -> Result<ConnectStatus, NetError> {
        let wanted = ConnectTarget {
            host: host.to_string(),
            port,
            use_tls,
        };
        self.connects.push((wanted.clone(), first_on_connection));

        if let Some(status) = reuse_decision(self.connected.as_ref(), &wanted, first_on_connection)
        {
            return Ok(status);
        }
        self.connected = None;
        if self.delayed_connects > 0 {
            self.delayed_connects -= 1;
            return Ok(ConnectStatus::Pending);
        }
        self.connected = Some(wanted);
        Ok(ConnectStatus::Connected)
    }

    fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    fn set_nodelay(&mut self, enabled: bool) {
        self.nodelay.push(enabled);
    }

    fn reset(&mut self) {
        if self.connected.take().is_some() {
            self.resets += 1;
        }
    }
}
