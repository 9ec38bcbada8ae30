//! Script transfer over an SSH session.
//!
//! Implements the sending side of the classic single-file SCP sink
//! convention: a `C<mode> <length> <name>` header line, the raw file
//! bytes, and a single NUL terminator, written into a remote process
//! started as `scp -t <directory>`. Carrying the protocol inline keeps
//! the transfer inside the already-authenticated session instead of
//! depending on a local scp binary.

use log::debug;
use russh::ChannelMsg;
use tokio::fs;

use crate::error::TransferError;
use crate::script::RemoteScript;
use crate::transport::SshTransport;

/// File mode the sink applies to the uploaded script.
const SINK_MODE: &str = "0664";

/// Render the sink header line for a file of `len` bytes named `name`.
pub fn sink_header(len: u64, name: &str) -> String {
    format!("C{} {} {}\n", SINK_MODE, len, name)
}

/// Total number of bytes a transfer of `len` payload bytes puts on the
/// wire: header, body, NUL terminator.
pub fn wire_size(len: u64, name: &str) -> u64 {
    sink_header(len, name).len() as u64 + len + 1
}

/// Push a staged script into its remote path over `transport`.
///
/// The script must have been written locally via [`RemoteScript::stage`];
/// the bytes on the wire are read back from that staging file. Two
/// futures run concurrently on the same channel: one streams header,
/// body and terminator and closes the input, the other drains channel
/// messages until the remote sink exits. Both are checked — a streaming
/// error takes precedence over a sink failure, but either one fails the
/// transfer.
pub async fn push_script(
    transport: &SshTransport,
    script: &RemoteScript,
) -> Result<(), TransferError> {
    let payload = fs::read(&script.local_path)
        .await
        .map_err(|source| TransferError::Stage {
            path: script.local_path.clone(),
            source,
        })?;

    let remote_dir = script
        .remote_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .filter(|dir| !dir.is_empty())
        .unwrap_or("/tmp");

    let channel = transport
        .open_session()
        .await
        .map_err(TransferError::Stream)?;
    channel
        .exec(true, format!("/usr/bin/scp -t {}", remote_dir))
        .await
        .map_err(TransferError::Stream)?;

    let header = sink_header(payload.len() as u64, script.base_name());
    debug!("sink header: {}", header.trim_end());

    let (mut read_half, write_half) = channel.split();

    let stream = async {
        write_half.data(header.as_bytes()).await?;
        write_half.data(&payload[..]).await?;
        write_half.data(&b"\x00"[..]).await?;
        write_half.eof().await?;
        Ok::<(), russh::Error>(())
    };

    let sink = async {
        let mut exit_status = None;
        while let Some(msg) = read_half.wait().await {
            match msg {
                // the sink acknowledges each step with a status byte;
                // nothing to do with it beyond draining
                ChannelMsg::Data { .. } | ChannelMsg::ExtendedData { .. } => {}
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                _ => {}
            }
        }
        exit_status
    };

    let (stream_result, sink_status) = tokio::join!(stream, sink);

    stream_result.map_err(TransferError::Stream)?;
    match sink_status {
        Some(0) => Ok(()),
        Some(code) => Err(TransferError::SinkFailed(code)),
        None => Err(TransferError::SinkNoStatus),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encodes_length_and_name() {
        let header = sink_header(421, "ssh-script.17");
        assert_eq!(header, "C0664 421 ssh-script.17\n");
    }

    #[test]
    fn test_header_for_empty_file() {
        assert_eq!(sink_header(0, "f"), "C0664 0 f\n");
    }

    #[test]
    fn test_wire_size_is_header_plus_body_plus_terminator() {
        let name = "ssh-script.42";
        let len = 1337;
        let expected = sink_header(len, name).len() as u64 + len + 1;
        assert_eq!(wire_size(len, name), expected);
    }
}
